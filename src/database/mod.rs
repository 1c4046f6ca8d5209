use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::{MediaFilter, MediaRecord, NewMediaRecord, StorageStats, UserAccount};

pub mod memory;
pub mod queries;

pub use memory::{MemoryAccountStore, MemoryMediaStore};
pub use queries::{PgAccountStore, PgMediaStore};

/// Persistent per-user quota and usage counters.
///
/// `increment_usage` and `overwrite_usage` are the only writers of
/// `used_bytes`. Implementations must apply the delta as one indivisible
/// operation on the stored row and clamp the result at zero.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create(&self, quota_bytes: i64) -> Result<UserAccount>;

    async fn find(&self, id: Uuid) -> Result<Option<UserAccount>>;

    async fn list_ids(&self) -> Result<Vec<Uuid>>;

    /// Returns `None` when the account does not exist.
    async fn increment_usage(
        &self,
        id: Uuid,
        delta: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<UserAccount>>;

    /// Returns `None` when the account does not exist.
    async fn overwrite_usage(
        &self,
        id: Uuid,
        used_bytes: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<UserAccount>>;

    async fn stats(&self) -> Result<StorageStats>;
}

/// Persistent media metadata.
///
/// Every owner scoped method matches on `(id, owner_id)` in one lookup, so a
/// record belonging to someone else behaves exactly like a missing one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn insert(&self, record: NewMediaRecord) -> Result<MediaRecord>;

    async fn find_owned(&self, id: Uuid, owner_id: Uuid) -> Result<Option<MediaRecord>>;

    /// Applies only to an active record. `None` when the record is missing,
    /// foreign or already trashed.
    async fn mark_trashed(
        &self,
        id: Uuid,
        owner_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<MediaRecord>>;

    /// Applies only to a trashed record.
    async fn mark_active(
        &self,
        id: Uuid,
        owner_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<MediaRecord>>;

    async fn rename(
        &self,
        id: Uuid,
        owner_id: Uuid,
        title: String,
        at: DateTime<Utc>,
    ) -> Result<Option<MediaRecord>>;

    async fn set_favorite(
        &self,
        id: Uuid,
        owner_id: Uuid,
        is_favorite: bool,
        at: DateTime<Utc>,
    ) -> Result<Option<MediaRecord>>;

    /// Deletes the row and returns it as it was at removal. Only one of several
    /// concurrent callers can get `Some`.
    async fn remove_owned(&self, id: Uuid, owner_id: Uuid) -> Result<Option<MediaRecord>>;

    /// Unscoped delete used to compensate a failed commit.
    async fn remove(&self, id: Uuid) -> Result<bool>;

    /// Sum of `size_bytes` over the owner's active and trashed records.
    async fn sum_counted_bytes(&self, owner_id: Uuid) -> Result<i64>;

    async fn list_by_owner(&self, owner_id: Uuid, filter: MediaFilter) -> Result<Vec<MediaRecord>>;

    async fn count_by_owner(&self, owner_id: Uuid, filter: MediaFilter) -> Result<i64>;
}

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Store(format!("migration failed: {}", e)))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn account_store(&self) -> PgAccountStore {
        PgAccountStore::new(self.pool.clone())
    }

    pub fn media_store(&self) -> PgMediaStore {
        PgMediaStore::new(self.pool.clone())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}
