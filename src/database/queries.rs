use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::{AccountStore, MediaStore};
use crate::errors::Result;
use crate::models::*;

const ACCOUNT_COLUMNS: &str = "id, quota_bytes, used_bytes, usage_updated_at, created_at";

const MEDIA_COLUMNS: &str = "id, owner_id, kind, title, original_filename, content_type, \
     blob_key, blob_url, size_bytes, status, is_favorite, trashed_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    #[tracing::instrument(skip(self), fields(db.table = "user_accounts"))]
    async fn create(&self, quota_bytes: i64) -> Result<UserAccount> {
        let account = sqlx::query_as::<_, UserAccount>(&format!(
            "INSERT INTO user_accounts (quota_bytes, used_bytes) VALUES ($1, 0) RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(quota_bytes)
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    async fn find(&self, id: Uuid) -> Result<Option<UserAccount>> {
        let account = sqlx::query_as::<_, UserAccount>(&format!(
            "SELECT {} FROM user_accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM user_accounts ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    // Single-statement delta so concurrent writers never lose an update.
    #[tracing::instrument(skip(self), fields(db.table = "user_accounts"))]
    async fn increment_usage(
        &self,
        id: Uuid,
        delta: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<UserAccount>> {
        let account = sqlx::query_as::<_, UserAccount>(&format!(
            r#"
            UPDATE user_accounts
            SET used_bytes = GREATEST(used_bytes + $2, 0), usage_updated_at = $3
            WHERE id = $1
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .bind(delta)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    #[tracing::instrument(skip(self), fields(db.table = "user_accounts"))]
    async fn overwrite_usage(
        &self,
        id: Uuid,
        used_bytes: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<UserAccount>> {
        let account = sqlx::query_as::<_, UserAccount>(&format!(
            r#"
            UPDATE user_accounts
            SET used_bytes = GREATEST($2, 0), usage_updated_at = $3
            WHERE id = $1
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .bind(used_bytes)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn stats(&self) -> Result<StorageStats> {
        let (total_users, total_used_bytes, total_quota_bytes, avg_used_bytes) =
            sqlx::query_as::<_, (i64, i64, i64, f64)>(
                r#"
                SELECT COUNT(*)::BIGINT,
                       COALESCE(SUM(used_bytes), 0)::BIGINT,
                       COALESCE(SUM(quota_bytes), 0)::BIGINT,
                       COALESCE(AVG(used_bytes), 0)::FLOAT8
                FROM user_accounts
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(StorageStats {
            total_users,
            total_used_bytes,
            total_quota_bytes,
            avg_used_bytes,
        })
    }
}

#[derive(Clone)]
pub struct PgMediaStore {
    pool: PgPool,
}

impl PgMediaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaStore for PgMediaStore {
    #[tracing::instrument(skip(self, record), fields(db.table = "media_records", owner_id = %record.owner_id))]
    async fn insert(&self, record: NewMediaRecord) -> Result<MediaRecord> {
        let media = sqlx::query_as::<_, MediaRecord>(&format!(
            r#"
            INSERT INTO media_records
                (owner_id, kind, title, original_filename, content_type, blob_key, blob_url,
                 size_bytes, status, is_favorite, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, $10, $10)
            RETURNING {}
            "#,
            MEDIA_COLUMNS
        ))
        .bind(record.owner_id)
        .bind(record.draft.kind)
        .bind(&record.draft.title)
        .bind(&record.draft.original_filename)
        .bind(&record.draft.content_type)
        .bind(&record.draft.blob.location_key)
        .bind(&record.draft.blob.url)
        .bind(record.size_bytes)
        .bind(MediaStatus::Active)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(media)
    }

    async fn find_owned(&self, id: Uuid, owner_id: Uuid) -> Result<Option<MediaRecord>> {
        let media = sqlx::query_as::<_, MediaRecord>(&format!(
            "SELECT {} FROM media_records WHERE id = $1 AND owner_id = $2",
            MEDIA_COLUMNS
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(media)
    }

    async fn mark_trashed(
        &self,
        id: Uuid,
        owner_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<MediaRecord>> {
        let media = sqlx::query_as::<_, MediaRecord>(&format!(
            r#"
            UPDATE media_records
            SET status = $3, trashed_at = $4, updated_at = $4
            WHERE id = $1 AND owner_id = $2 AND status = $5
            RETURNING {}
            "#,
            MEDIA_COLUMNS
        ))
        .bind(id)
        .bind(owner_id)
        .bind(MediaStatus::Trashed)
        .bind(at)
        .bind(MediaStatus::Active)
        .fetch_optional(&self.pool)
        .await?;

        Ok(media)
    }

    async fn mark_active(
        &self,
        id: Uuid,
        owner_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<MediaRecord>> {
        let media = sqlx::query_as::<_, MediaRecord>(&format!(
            r#"
            UPDATE media_records
            SET status = $3, trashed_at = NULL, updated_at = $4
            WHERE id = $1 AND owner_id = $2 AND status = $5
            RETURNING {}
            "#,
            MEDIA_COLUMNS
        ))
        .bind(id)
        .bind(owner_id)
        .bind(MediaStatus::Active)
        .bind(at)
        .bind(MediaStatus::Trashed)
        .fetch_optional(&self.pool)
        .await?;

        Ok(media)
    }

    async fn rename(
        &self,
        id: Uuid,
        owner_id: Uuid,
        title: String,
        at: DateTime<Utc>,
    ) -> Result<Option<MediaRecord>> {
        let media = sqlx::query_as::<_, MediaRecord>(&format!(
            r#"
            UPDATE media_records
            SET title = $3, updated_at = $4
            WHERE id = $1 AND owner_id = $2
            RETURNING {}
            "#,
            MEDIA_COLUMNS
        ))
        .bind(id)
        .bind(owner_id)
        .bind(title)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(media)
    }

    async fn set_favorite(
        &self,
        id: Uuid,
        owner_id: Uuid,
        is_favorite: bool,
        at: DateTime<Utc>,
    ) -> Result<Option<MediaRecord>> {
        let media = sqlx::query_as::<_, MediaRecord>(&format!(
            r#"
            UPDATE media_records
            SET is_favorite = $3, updated_at = $4
            WHERE id = $1 AND owner_id = $2
            RETURNING {}
            "#,
            MEDIA_COLUMNS
        ))
        .bind(id)
        .bind(owner_id)
        .bind(is_favorite)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(media)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_records"))]
    async fn remove_owned(&self, id: Uuid, owner_id: Uuid) -> Result<Option<MediaRecord>> {
        let media = sqlx::query_as::<_, MediaRecord>(&format!(
            "DELETE FROM media_records WHERE id = $1 AND owner_id = $2 RETURNING {}",
            MEDIA_COLUMNS
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(media)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_records"))]
    async fn remove(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM media_records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn sum_counted_bytes(&self, owner_id: Uuid) -> Result<i64> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(size_bytes), 0)::BIGINT
            FROM media_records
            WHERE owner_id = $1 AND status IN ('active', 'trashed')
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn list_by_owner(&self, owner_id: Uuid, filter: MediaFilter) -> Result<Vec<MediaRecord>> {
        let media = sqlx::query_as::<_, MediaRecord>(&format!(
            r#"
            SELECT {}
            FROM media_records
            WHERE owner_id = $1
              AND status = $2
              AND ($3 = FALSE OR is_favorite)
              AND ($4::media_kind IS NULL OR kind = $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
            MEDIA_COLUMNS
        ))
        .bind(owner_id)
        .bind(filter.status())
        .bind(filter.favorites_only)
        .bind(filter.kind)
        .bind(filter.limit)
        .bind(filter.offset.unwrap_or(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(media)
    }

    async fn count_by_owner(&self, owner_id: Uuid, filter: MediaFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)::BIGINT
            FROM media_records
            WHERE owner_id = $1
              AND status = $2
              AND ($3 = FALSE OR is_favorite)
              AND ($4::media_kind IS NULL OR kind = $4)
            "#,
        )
        .bind(owner_id)
        .bind(filter.status())
        .bind(filter.favorites_only)
        .bind(filter.kind)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
