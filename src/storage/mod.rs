use async_trait::async_trait;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::Result;
use crate::models::BlobLocation;

pub mod local;

pub use local::LocalBlobStore;

/// Object store holding the media bytes. The ledger never interprets the
/// returned location; it only persists it.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, owner_id: Uuid, filename: &str, data: &[u8]) -> Result<BlobLocation>;

    async fn delete(&self, location_key: &str) -> Result<()>;

    async fn exists(&self, location_key: &str) -> Result<bool>;
}

pub fn create_blob_store(config: &Config) -> Result<Box<dyn BlobStore>> {
    let store = LocalBlobStore::new(&config.blob_root, &config.blob_public_base_url)?;
    Ok(Box::new(store))
}
