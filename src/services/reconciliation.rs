use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    database::{AccountStore, MediaStore},
    errors::{AppError, Result},
    models::*,
    services::metrics::LedgerMetrics,
};

/// Rebuilds usage counters from the media store.
///
/// This is the repair path for every drift window the ledger leaves open. It
/// overwrites counters instead of adjusting them, so running it twice in a
/// row yields the same values.
#[derive(Clone)]
pub struct ReconciliationJob {
    accounts: Arc<dyn AccountStore>,
    media: Arc<dyn MediaStore>,
    metrics: Arc<LedgerMetrics>,
    concurrency: usize,
}

impl ReconciliationJob {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        media: Arc<dyn MediaStore>,
        metrics: Arc<LedgerMetrics>,
        concurrency: usize,
    ) -> Self {
        Self {
            accounts,
            media,
            metrics,
            concurrency: concurrency.max(1),
        }
    }

    /// Recomputes and stores the user's usage, returning the ground truth.
    pub async fn reconcile(&self, user_id: Uuid) -> Result<i64> {
        Ok(self.reconcile_user(user_id).await?.actual_bytes)
    }

    pub async fn reconcile_user(&self, user_id: Uuid) -> Result<UsageCorrection> {
        let previous = self
            .accounts
            .find(user_id)
            .await
            .map_err(|e| reconcile_failed(user_id, "account read", e))?
            .ok_or(AppError::AccountNotFound)?;

        let actual_bytes = self
            .media
            .sum_counted_bytes(user_id)
            .await
            .map_err(|e| reconcile_failed(user_id, "usage aggregation", e))?;

        self.accounts
            .overwrite_usage(user_id, actual_bytes, Utc::now())
            .await
            .map_err(|e| reconcile_failed(user_id, "usage write", e))?
            .ok_or(AppError::AccountNotFound)?;

        let correction = UsageCorrection {
            previous_bytes: previous.used_bytes,
            actual_bytes,
        };

        if correction.drift() != 0 {
            tracing::warn!(
                %user_id,
                previous_bytes = correction.previous_bytes,
                actual_bytes,
                drift = correction.drift(),
                "Corrected usage drift"
            );
        } else {
            tracing::debug!(%user_id, actual_bytes, "Usage already consistent");
        }
        self.metrics.record_reconcile(Some(correction.drift()));

        Ok(correction)
    }

    /// Reconciles every account. A failing user is recorded and skipped.
    pub async fn reconcile_all(&self) -> Result<ReconcileReport> {
        let started_at = Utc::now();
        let user_ids = self.accounts.list_ids().await?;

        let mut results: Vec<UserReconcileResult> = stream::iter(user_ids)
            .map(|user_id| async move {
                match self.reconcile_user(user_id).await {
                    Ok(correction) => UserReconcileResult::succeeded(user_id, correction),
                    Err(e) => {
                        self.metrics.record_reconcile(None);
                        tracing::error!(%user_id, error = %e, "Reconciliation failed");
                        UserReconcileResult::failed(user_id, e.to_string())
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results.sort_by_key(|r| r.user_id);
        let succeeded = results.iter().filter(|r| r.success).count();

        let report = ReconcileReport {
            results,
            succeeded,
            started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed(),
            "{}",
            report.message()
        );
        Ok(report)
    }

    /// Runs `reconcile_all` every `interval` until `shutdown` is cancelled.
    /// The first run happens immediately.
    pub async fn run_periodic(&self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Reconciliation loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_all().await {
                        tracing::error!(error = %e, "Could not list accounts for reconciliation");
                    }
                }
            }
        }
    }
}

fn reconcile_failed(user_id: Uuid, step: &str, e: AppError) -> AppError {
    AppError::ReconcileFailed {
        user_id,
        reason: format!("{} failed: {}", step, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryAccountStore, MemoryMediaStore, MockMediaStore};

    fn job(accounts: Arc<dyn AccountStore>, media: Arc<dyn MediaStore>) -> ReconciliationJob {
        ReconciliationJob::new(accounts, media, Arc::new(LedgerMetrics::new().unwrap()), 2)
    }

    #[tokio::test]
    async fn test_aggregation_failure_isolated_per_user() {
        let accounts = Arc::new(MemoryAccountStore::new());
        let healthy = accounts.create(1000).await.unwrap();
        let broken = accounts.create(1000).await.unwrap();
        accounts
            .increment_usage(healthy.id, 300, Utc::now())
            .await
            .unwrap();

        let broken_id = broken.id;
        let mut media = MockMediaStore::new();
        media.expect_sum_counted_bytes().returning(move |owner| {
            if owner == broken_id {
                Err(AppError::Store("statement timeout".to_string()))
            } else {
                Ok(120)
            }
        });

        let job = job(accounts.clone(), Arc::new(media));
        let report = job.reconcile_all().await.unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed(), 1);

        let failed = report.results.iter().find(|r| r.user_id == broken_id).unwrap();
        assert!(!failed.success);
        assert!(failed.error.as_deref().unwrap().contains("usage aggregation"));

        let ok = report.results.iter().find(|r| r.user_id == healthy.id).unwrap();
        assert_eq!(ok.actual_bytes, Some(120));
        assert_eq!(ok.drift_bytes, Some(-180));
        assert_eq!(accounts.find(healthy.id).await.unwrap().unwrap().used_bytes, 120);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let job = job(
            Arc::new(MemoryAccountStore::new()),
            Arc::new(MemoryMediaStore::new()),
        );
        assert!(matches!(
            job.reconcile(Uuid::new_v4()).await,
            Err(AppError::AccountNotFound)
        ));
    }

    #[tokio::test]
    async fn test_periodic_loop_stops_on_cancel() {
        let accounts = Arc::new(MemoryAccountStore::new());
        let acct = accounts.create(1000).await.unwrap();
        accounts.increment_usage(acct.id, 77, Utc::now()).await.unwrap();

        let job = job(accounts.clone(), Arc::new(MemoryMediaStore::new()));
        let shutdown = CancellationToken::new();

        let handle = {
            let job = job.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { job.run_periodic(Duration::from_secs(3600), shutdown).await })
        };

        // first tick fires immediately
        for _ in 0..50 {
            if accounts.find(acct.id).await.unwrap().unwrap().used_bytes == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(accounts.find(acct.id).await.unwrap().unwrap().used_bytes, 0);
    }
}
