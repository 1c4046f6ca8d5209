use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::{
    errors::{AppError, Result},
    models::BlobLocation,
    storage::BlobStore,
    utils::file::{generate_blob_name, owner_container_name},
};

/// Filesystem blob store laid out as `<root>/user-<owner>/<uuid>.<ext>`.
pub struct LocalBlobStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new<P: AsRef<Path>>(base_path: P, public_base_url: &str) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        std::fs::create_dir_all(&base_path)
            .map_err(|e| AppError::Storage(format!("Failed to create storage directory: {}", e)))?;

        Ok(Self {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get_full_path(&self, location_key: &str) -> Result<PathBuf> {
        let key = Path::new(location_key);
        if key
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(AppError::Storage(format!("Invalid location key: {}", location_key)));
        }
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, owner_id: Uuid, filename: &str, data: &[u8]) -> Result<BlobLocation> {
        let location_key = format!(
            "{}/{}",
            owner_container_name(owner_id),
            generate_blob_name(filename)
        );
        let full_path = self.get_full_path(&location_key)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {}", e)))?;
        }

        fs::write(&full_path, data)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write file: {}", e)))?;

        tracing::debug!(%owner_id, %location_key, size = data.len(), "Stored blob");

        Ok(BlobLocation {
            url: format!("{}/{}", self.public_base_url, location_key),
            location_key,
        })
    }

    async fn delete(&self, location_key: &str) -> Result<()> {
        let full_path = self.get_full_path(location_key)?;

        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("Failed to delete file: {}", e))),
        }
    }

    async fn exists(&self, location_key: &str) -> Result<bool> {
        let full_path = self.get_full_path(location_key)?;
        fs::try_exists(&full_path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to stat file: {}", e)))
    }
}
