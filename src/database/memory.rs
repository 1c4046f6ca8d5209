//! In-process stores for tests and embedded use.
//!
//! Each store keeps its rows behind one lock, which gives every method the
//! same single-row atomicity the Postgres statements have.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::{AccountStore, MediaStore};
use crate::errors::Result;
use crate::models::*;

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<Uuid, UserAccount>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create(&self, quota_bytes: i64) -> Result<UserAccount> {
        let now = Utc::now();
        let account = UserAccount {
            id: Uuid::new_v4(),
            quota_bytes,
            used_bytes: 0,
            usage_updated_at: now,
            created_at: now,
        };
        self.accounts
            .write()
            .await
            .insert(account.id, account.clone());
        Ok(account)
    }

    async fn find(&self, id: Uuid) -> Result<Option<UserAccount>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.accounts.read().await.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn increment_usage(
        &self,
        id: Uuid,
        delta: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<UserAccount>> {
        let mut accounts = self.accounts.write().await;
        Ok(accounts.get_mut(&id).map(|account| {
            account.used_bytes = account.used_bytes.saturating_add(delta).max(0);
            account.usage_updated_at = at;
            account.clone()
        }))
    }

    async fn overwrite_usage(
        &self,
        id: Uuid,
        used_bytes: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<UserAccount>> {
        let mut accounts = self.accounts.write().await;
        Ok(accounts.get_mut(&id).map(|account| {
            account.used_bytes = used_bytes.max(0);
            account.usage_updated_at = at;
            account.clone()
        }))
    }

    async fn stats(&self) -> Result<StorageStats> {
        let accounts = self.accounts.read().await;
        let total_users = accounts.len() as i64;
        let total_used_bytes: i64 = accounts.values().map(|a| a.used_bytes).sum();
        let total_quota_bytes: i64 = accounts.values().map(|a| a.quota_bytes).sum();
        let avg_used_bytes = if total_users > 0 {
            total_used_bytes as f64 / total_users as f64
        } else {
            0.0
        };

        Ok(StorageStats {
            total_users,
            total_used_bytes,
            total_quota_bytes,
            avg_used_bytes,
        })
    }
}

#[derive(Default)]
pub struct MemoryMediaStore {
    records: RwLock<HashMap<Uuid, MediaRecord>>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update_owned<F>(&self, id: Uuid, owner_id: Uuid, apply: F) -> Option<MediaRecord>
    where
        F: FnOnce(&mut MediaRecord) + Send,
    {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) if record.owner_id == owner_id => {
                apply(record);
                Some(record.clone())
            }
            _ => None,
        }
    }

    async fn transition_owned<F>(
        &self,
        id: Uuid,
        owner_id: Uuid,
        from: MediaStatus,
        apply: F,
    ) -> Option<MediaRecord>
    where
        F: FnOnce(&mut MediaRecord) + Send,
    {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) if record.owner_id == owner_id && record.status == from => {
                apply(record);
                Some(record.clone())
            }
            _ => None,
        }
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn insert(&self, record: NewMediaRecord) -> Result<MediaRecord> {
        let media = record.into_record(Uuid::new_v4());
        self.records.write().await.insert(media.id, media.clone());
        Ok(media)
    }

    async fn find_owned(&self, id: Uuid, owner_id: Uuid) -> Result<Option<MediaRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(&id)
            .filter(|record| record.owner_id == owner_id)
            .cloned())
    }

    async fn mark_trashed(
        &self,
        id: Uuid,
        owner_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<MediaRecord>> {
        Ok(self
            .transition_owned(id, owner_id, MediaStatus::Active, |record| {
                record.status = MediaStatus::Trashed;
                record.trashed_at = Some(at);
                record.updated_at = at;
            })
            .await)
    }

    async fn mark_active(
        &self,
        id: Uuid,
        owner_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<MediaRecord>> {
        Ok(self
            .transition_owned(id, owner_id, MediaStatus::Trashed, |record| {
                record.status = MediaStatus::Active;
                record.trashed_at = None;
                record.updated_at = at;
            })
            .await)
    }

    async fn rename(
        &self,
        id: Uuid,
        owner_id: Uuid,
        title: String,
        at: DateTime<Utc>,
    ) -> Result<Option<MediaRecord>> {
        Ok(self
            .update_owned(id, owner_id, |record| {
                record.title = title;
                record.updated_at = at;
            })
            .await)
    }

    async fn set_favorite(
        &self,
        id: Uuid,
        owner_id: Uuid,
        is_favorite: bool,
        at: DateTime<Utc>,
    ) -> Result<Option<MediaRecord>> {
        Ok(self
            .update_owned(id, owner_id, |record| {
                record.is_favorite = is_favorite;
                record.updated_at = at;
            })
            .await)
    }

    async fn remove_owned(&self, id: Uuid, owner_id: Uuid) -> Result<Option<MediaRecord>> {
        let mut records = self.records.write().await;
        match records.get(&id) {
            Some(record) if record.owner_id == owner_id => Ok(records.remove(&id)),
            _ => Ok(None),
        }
    }

    async fn remove(&self, id: Uuid) -> Result<bool> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    async fn sum_counted_bytes(&self, owner_id: Uuid) -> Result<i64> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.owner_id == owner_id && record.status.counts_toward_quota())
            .map(|record| record.size_bytes)
            .sum())
    }

    async fn list_by_owner(&self, owner_id: Uuid, filter: MediaFilter) -> Result<Vec<MediaRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<MediaRecord> = records
            .values()
            .filter(|record| record.owner_id == owner_id && filter.matches(record))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_by_owner(&self, owner_id: Uuid, filter: MediaFilter) -> Result<i64> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.owner_id == owner_id && filter.matches(record))
            .count() as i64)
    }
}
