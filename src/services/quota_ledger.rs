use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    database::{AccountStore, MediaStore},
    errors::{AppError, Result},
    models::*,
    services::metrics::LedgerMetrics,
    utils::format_bytes,
};

/// Outcome of an admission check. A rejection is a normal result, not an error.
#[derive(Debug, Clone)]
pub struct QuotaCheck {
    pub allowed: bool,
    pub account: UserAccount,
    pub reason: Option<String>,
}

impl QuotaCheck {
    /// Turns a rejection into `AppError::QuotaExceeded` for `?` call sites.
    pub fn into_admission(self) -> Result<UserAccount> {
        if self.allowed {
            Ok(self.account)
        } else {
            Err(AppError::QuotaExceeded(
                self.reason.unwrap_or_else(|| "quota exceeded".to_string()),
            ))
        }
    }
}

/// Owns every operation that moves a user's `used_bytes` counter.
///
/// The ledger keeps no locks of its own. Counter updates are issued to the
/// account store as atomic deltas, and anything that slips through a partial
/// failure is left for reconciliation to repair.
#[derive(Clone)]
pub struct QuotaLedger {
    accounts: Arc<dyn AccountStore>,
    media: Arc<dyn MediaStore>,
    metrics: Arc<LedgerMetrics>,
    default_quota_bytes: i64,
}

impl QuotaLedger {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        media: Arc<dyn MediaStore>,
        metrics: Arc<LedgerMetrics>,
        default_quota_bytes: i64,
    ) -> Self {
        Self {
            accounts,
            media,
            metrics,
            default_quota_bytes,
        }
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    pub fn media(&self) -> &Arc<dyn MediaStore> {
        &self.media
    }

    pub fn metrics(&self) -> &Arc<LedgerMetrics> {
        &self.metrics
    }

    pub async fn create_account(&self, quota_bytes: Option<i64>) -> Result<UserAccount> {
        let quota_bytes = quota_bytes.unwrap_or(self.default_quota_bytes);
        if quota_bytes < 0 {
            return Err(AppError::InvalidSize(quota_bytes));
        }

        let account = self.accounts.create(quota_bytes).await?;
        tracing::info!(user_id = %account.id, quota_bytes, "Created storage account");
        Ok(account)
    }

    pub async fn account(&self, user_id: Uuid) -> Result<UserAccount> {
        self.accounts
            .find(user_id)
            .await?
            .ok_or(AppError::AccountNotFound)
    }

    pub async fn check_upload_quota(&self, user_id: Uuid, candidate_bytes: i64) -> Result<QuotaCheck> {
        if candidate_bytes <= 0 {
            return Err(AppError::InvalidSize(candidate_bytes));
        }

        let account = self.account(user_id).await?;

        if account.has_room_for(candidate_bytes) {
            return Ok(QuotaCheck {
                allowed: true,
                account,
                reason: None,
            });
        }

        let reason = format!(
            "quota exceeded: using {} of {}",
            format_bytes(account.used_bytes),
            format_bytes(account.quota_bytes)
        );
        tracing::debug!(%user_id, candidate_bytes, used_bytes = account.used_bytes, "Upload rejected by quota");

        Ok(QuotaCheck {
            allowed: false,
            account,
            reason: Some(reason),
        })
    }

    /// Persists the draft as an active record and credits its size to the owner.
    pub async fn commit_upload(
        &self,
        account: &UserAccount,
        draft: MediaDraft,
        size_bytes: i64,
    ) -> Result<CommittedMedia> {
        if size_bytes <= 0 {
            return Err(AppError::InvalidSize(size_bytes));
        }

        let record = NewMediaRecord {
            owner_id: account.id,
            draft,
            size_bytes,
            created_at: Utc::now(),
        };

        let committed = CommitSaga {
            accounts: self.accounts.as_ref(),
            media: self.media.as_ref(),
            metrics: self.metrics.as_ref(),
        }
        .run(record)
        .await?;

        self.metrics.record_commit(size_bytes);
        tracing::info!(
            user_id = %committed.account.id,
            media_id = %committed.media.id,
            size_bytes,
            used_bytes = committed.account.used_bytes,
            "Committed upload"
        );
        Ok(committed)
    }

    pub async fn get_media(&self, media_id: Uuid, user_id: Uuid) -> Result<MediaRecord> {
        self.media
            .find_owned(media_id, user_id)
            .await?
            .ok_or(AppError::MediaNotFound)
    }

    /// Trashed media keeps counting toward the quota, so usage is untouched.
    pub async fn move_to_trash(&self, media_id: Uuid, user_id: Uuid) -> Result<TransitionOutcome> {
        let current = self.get_media(media_id, user_id).await?;
        if current.status == MediaStatus::Trashed {
            return Ok(TransitionOutcome {
                record: current,
                changed: false,
            });
        }

        let Some(record) = self.media.mark_trashed(media_id, user_id, Utc::now()).await? else {
            // A concurrent call got there first.
            return Ok(TransitionOutcome {
                record: self.get_media(media_id, user_id).await?,
                changed: false,
            });
        };

        tracing::info!(%user_id, %media_id, "Moved media to trash");
        Ok(TransitionOutcome {
            record,
            changed: true,
        })
    }

    pub async fn restore_from_trash(&self, media_id: Uuid, user_id: Uuid) -> Result<TransitionOutcome> {
        let current = self.get_media(media_id, user_id).await?;
        if current.status != MediaStatus::Trashed {
            return Ok(TransitionOutcome {
                record: current,
                changed: false,
            });
        }

        let Some(record) = self.media.mark_active(media_id, user_id, Utc::now()).await? else {
            // A concurrent call got there first.
            return Ok(TransitionOutcome {
                record: self.get_media(media_id, user_id).await?,
                changed: false,
            });
        };

        tracing::info!(%user_id, %media_id, "Restored media from trash");
        Ok(TransitionOutcome {
            record,
            changed: true,
        })
    }

    /// Removes the record, then debits its size. The only operation that
    /// lowers usage.
    pub async fn delete_permanently(&self, media_id: Uuid, user_id: Uuid) -> Result<TransitionOutcome> {
        // Removal returns the row as deleted, so the size comes from the same
        // statement that makes the record disappear. A racing second caller
        // gets None here and never reaches the decrement.
        let record = self
            .media
            .remove_owned(media_id, user_id)
            .await?
            .ok_or(AppError::MediaNotFound)?;

        self.metrics.record_permanent_delete();

        let delta = if record.status.counts_toward_quota() {
            -record.size_bytes
        } else {
            0
        };

        if delta != 0 {
            match self.accounts.increment_usage(user_id, delta, Utc::now()).await {
                Ok(Some(account)) => {
                    tracing::info!(
                        %user_id,
                        %media_id,
                        size_bytes = record.size_bytes,
                        used_bytes = account.used_bytes,
                        "Permanently deleted media"
                    );
                }
                Ok(None) => {
                    tracing::warn!(%user_id, %media_id, "Deleted media for an account that no longer exists");
                }
                Err(e) => {
                    tracing::error!(
                        %user_id,
                        %media_id,
                        size_bytes = record.size_bytes,
                        error = %e,
                        "Media removed but usage debit failed; counter overstated until reconciliation"
                    );
                    return Err(AppError::Store(format!("usage debit failed: {}", e)));
                }
            }
        }

        Ok(TransitionOutcome {
            record,
            changed: true,
        })
    }

    pub async fn rename(&self, media_id: Uuid, user_id: Uuid, title: &str) -> Result<MediaRecord> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("title must not be empty".to_string()));
        }

        self.media
            .rename(media_id, user_id, title.to_string(), Utc::now())
            .await?
            .ok_or(AppError::MediaNotFound)
    }

    pub async fn set_favorite(&self, media_id: Uuid, user_id: Uuid, is_favorite: bool) -> Result<MediaRecord> {
        self.media
            .set_favorite(media_id, user_id, is_favorite, Utc::now())
            .await?
            .ok_or(AppError::MediaNotFound)
    }

    pub async fn list_media(&self, user_id: Uuid, filter: MediaFilter) -> Result<Vec<MediaRecord>> {
        self.media.list_by_owner(user_id, filter).await
    }

    pub async fn count_media(&self, user_id: Uuid, filter: MediaFilter) -> Result<i64> {
        self.media.count_by_owner(user_id, filter).await
    }

    pub async fn storage_summary(&self, user_id: Uuid) -> Result<StorageSummary> {
        Ok(self.account(user_id).await?.storage_summary())
    }

    pub async fn storage_stats(&self) -> Result<StorageStats> {
        self.accounts.stats().await
    }
}

/// Insert-then-credit commit with a compensating delete.
///
/// Step one persists the record. Step two applies the atomic increment. If
/// step two fails the record is removed again. That removal is best-effort:
/// when it also fails, the record stays without a matching credit and the
/// next reconciliation picks the size up from the media store.
struct CommitSaga<'a> {
    accounts: &'a dyn AccountStore,
    media: &'a dyn MediaStore,
    metrics: &'a LedgerMetrics,
}

impl<'a> CommitSaga<'a> {
    async fn run(self, record: NewMediaRecord) -> Result<CommittedMedia> {
        let owner_id = record.owner_id;
        let size_bytes = record.size_bytes;

        let media = self.media.insert(record).await.map_err(|e| {
            tracing::warn!(%owner_id, error = %e, "Media insert failed, nothing committed");
            AppError::CommitFailed(format!("metadata insert failed: {}", e))
        })?;

        let cause = match self.accounts.increment_usage(owner_id, size_bytes, Utc::now()).await {
            Ok(Some(account)) => return Ok(CommittedMedia { media, account }),
            Ok(None) => "account disappeared before usage increment".to_string(),
            Err(e) => format!("usage increment failed: {}", e),
        };

        self.compensate(&media, &cause).await;
        Err(AppError::CommitFailed(cause))
    }

    async fn compensate(&self, media: &MediaRecord, cause: &str) {
        match self.media.remove(media.id).await {
            Ok(removed) => {
                self.metrics.record_compensation(true);
                tracing::warn!(
                    owner_id = %media.owner_id,
                    media_id = %media.id,
                    removed,
                    cause,
                    "Rolled back media record after failed usage increment"
                );
            }
            Err(e) => {
                self.metrics.record_compensation(false);
                tracing::error!(
                    owner_id = %media.owner_id,
                    media_id = %media.id,
                    size_bytes = media.size_bytes,
                    cause,
                    error = %e,
                    "Compensating delete failed; record has no usage credit until reconciliation"
                );
            }
        }
    }
}
