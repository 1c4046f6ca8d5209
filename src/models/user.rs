use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::{format_bytes, plan_display_name};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct UserAccount {
    pub id: Uuid,
    pub quota_bytes: i64,
    pub used_bytes: i64,
    pub usage_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn available_bytes(&self) -> i64 {
        (self.quota_bytes - self.used_bytes).max(0)
    }

    /// Whether `additional_bytes` more would still fit. Overflow counts as not fitting.
    pub fn has_room_for(&self, additional_bytes: i64) -> bool {
        self.used_bytes
            .checked_add(additional_bytes)
            .map_or(false, |total| total <= self.quota_bytes)
    }

    pub fn storage_summary(&self) -> StorageSummary {
        let usage_percentage = if self.quota_bytes > 0 {
            self.used_bytes as f64 / self.quota_bytes as f64 * 100.0
        } else {
            0.0
        };

        StorageSummary {
            used_bytes: self.used_bytes,
            quota_bytes: self.quota_bytes,
            available_bytes: self.available_bytes(),
            usage_percentage,
            updated_at: self.usage_updated_at,
            used_display: format_bytes(self.used_bytes),
            quota_display: format_bytes(self.quota_bytes),
            plan_name: plan_display_name(self.quota_bytes).to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSummary {
    pub used_bytes: i64,
    pub quota_bytes: i64,
    pub available_bytes: i64,
    pub usage_percentage: f64,
    pub updated_at: DateTime<Utc>,
    pub used_display: String,
    pub quota_display: String,
    pub plan_name: String,
}

/// Totals across every account.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_users: i64,
    pub total_used_bytes: i64,
    pub total_quota_bytes: i64,
    pub avg_used_bytes: f64,
}
