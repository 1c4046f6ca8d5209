use std::sync::Arc;
use uuid::Uuid;

use crate::{
    errors::{AppError, Result},
    models::*,
    services::quota_ledger::QuotaLedger,
    storage::BlobStore,
    utils::file::{guess_content_type, kind_for_content_type, sanitize_filename},
};

pub struct UploadRequest {
    pub filename: String,
    pub title: Option<String>,
    pub data: Vec<u8>,
}

/// Drives an upload through admission, blob write and commit, and a purge
/// through ledger delete and blob removal.
pub struct UploadService {
    ledger: QuotaLedger,
    blobs: Arc<dyn BlobStore>,
    max_upload_bytes: i64,
}

impl UploadService {
    pub fn new(ledger: QuotaLedger, blobs: Arc<dyn BlobStore>, max_upload_bytes: i64) -> Self {
        Self {
            ledger,
            blobs,
            max_upload_bytes,
        }
    }

    pub fn ledger(&self) -> &QuotaLedger {
        &self.ledger
    }

    pub async fn upload(&self, user_id: Uuid, request: UploadRequest) -> Result<CommittedMedia> {
        let size_bytes = i64::try_from(request.data.len())
            .map_err(|_| AppError::Validation("file too large".to_string()))?;
        if size_bytes == 0 {
            return Err(AppError::InvalidSize(0));
        }
        if size_bytes > self.max_upload_bytes {
            return Err(AppError::Validation(format!(
                "file too large: maximum size is {} bytes",
                self.max_upload_bytes
            )));
        }

        let account = self
            .ledger
            .check_upload_quota(user_id, size_bytes)
            .await?
            .into_admission()?;

        let filename = sanitize_filename(&request.filename);
        let content_type = guess_content_type(&filename);
        let title = request
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| filename.clone());

        let blob = self.blobs.put(user_id, &filename, &request.data).await?;

        let draft = MediaDraft {
            kind: kind_for_content_type(&content_type),
            title,
            original_filename: filename,
            content_type,
            blob: blob.clone(),
        };

        match self.ledger.commit_upload(&account, draft, size_bytes).await {
            Ok(committed) => Ok(committed),
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&blob.location_key).await {
                    tracing::warn!(
                        %user_id,
                        location_key = %blob.location_key,
                        error = %cleanup,
                        "Orphaned blob after failed commit"
                    );
                }
                Err(e)
            }
        }
    }

    pub async fn purge(&self, media_id: Uuid, user_id: Uuid) -> Result<MediaRecord> {
        let outcome = self.ledger.delete_permanently(media_id, user_id).await?;

        if let Err(e) = self.blobs.delete(&outcome.record.blob_key).await {
            tracing::warn!(
                %user_id,
                %media_id,
                location_key = %outcome.record.blob_key,
                error = %e,
                "Blob removal failed after permanent delete"
            );
        }

        Ok(outcome.record)
    }
}
