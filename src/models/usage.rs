use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Counter values before and after one reconciliation.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageCorrection {
    pub previous_bytes: i64,
    pub actual_bytes: i64,
}

impl UsageCorrection {
    /// Positive when the counter was too low.
    pub fn drift(&self) -> i64 {
        self.actual_bytes - self.previous_bytes
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReconcileResult {
    pub user_id: Uuid,
    pub success: bool,
    pub actual_bytes: Option<i64>,
    pub drift_bytes: Option<i64>,
    pub error: Option<String>,
}

impl UserReconcileResult {
    pub fn succeeded(user_id: Uuid, correction: UsageCorrection) -> Self {
        UserReconcileResult {
            user_id,
            success: true,
            actual_bytes: Some(correction.actual_bytes),
            drift_bytes: Some(correction.drift()),
            error: None,
        }
    }

    pub fn failed(user_id: Uuid, error: String) -> Self {
        UserReconcileResult {
            user_id,
            success: false,
            actual_bytes: None,
            drift_bytes: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub results: Vec<UserReconcileResult>,
    pub succeeded: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReconcileReport {
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded
    }

    pub fn message(&self) -> String {
        format!("Reconciled {} of {} users", self.succeeded, self.results.len())
    }
}
