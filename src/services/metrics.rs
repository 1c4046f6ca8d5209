use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::errors::{AppError, Result};

/// Counters for ledger events, kept in a registry owned by this struct so
/// several ledgers (and tests) don't collide in the global default registry.
pub struct LedgerMetrics {
    registry: Registry,
    commits: IntCounter,
    committed_bytes: IntCounter,
    compensations: IntCounterVec,
    permanent_deletes: IntCounter,
    reconciliations: IntCounterVec,
    drift_bytes: IntCounter,
}

impl LedgerMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let commits = IntCounter::new("ledger_commits_total", "Committed uploads")
            .map_err(metrics_error)?;
        let committed_bytes = IntCounter::new(
            "ledger_committed_bytes_total",
            "Bytes credited to usage counters by commits",
        )
        .map_err(metrics_error)?;
        let compensations = IntCounterVec::new(
            Opts::new(
                "ledger_compensations_total",
                "Compensating deletes after a failed usage increment",
            ),
            &["outcome"],
        )
        .map_err(metrics_error)?;
        let permanent_deletes = IntCounter::new(
            "ledger_permanent_deletes_total",
            "Media records permanently removed",
        )
        .map_err(metrics_error)?;
        let reconciliations = IntCounterVec::new(
            Opts::new("ledger_reconciliations_total", "Per-user reconciliations"),
            &["outcome"],
        )
        .map_err(metrics_error)?;
        let drift_bytes = IntCounter::new(
            "ledger_drift_bytes_total",
            "Absolute drift corrected by reconciliation",
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(commits.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(committed_bytes.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(compensations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(permanent_deletes.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(reconciliations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(drift_bytes.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            commits,
            committed_bytes,
            compensations,
            permanent_deletes,
            reconciliations,
            drift_bytes,
        })
    }

    pub fn record_commit(&self, size_bytes: i64) {
        self.commits.inc();
        self.committed_bytes.inc_by(size_bytes.max(0) as u64);
    }

    pub fn record_compensation(&self, succeeded: bool) {
        let outcome = if succeeded { "success" } else { "failure" };
        self.compensations.with_label_values(&[outcome]).inc();
    }

    pub fn record_permanent_delete(&self) {
        self.permanent_deletes.inc();
    }

    pub fn record_reconcile(&self, drift: Option<i64>) {
        match drift {
            Some(drift) => {
                self.reconciliations.with_label_values(&["success"]).inc();
                self.drift_bytes.inc_by(drift.unsigned_abs());
            }
            None => self.reconciliations.with_label_values(&["failure"]).inc(),
        }
    }

    pub fn commits(&self) -> u64 {
        self.commits.get()
    }

    pub fn compensations(&self, succeeded: bool) -> u64 {
        let outcome = if succeeded { "success" } else { "failure" };
        self.compensations.with_label_values(&[outcome]).get()
    }

    pub fn drift_bytes(&self) -> u64 {
        self.drift_bytes.get()
    }

    /// Prometheus text exposition of every ledger metric.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| AppError::Internal(e.into()))
    }
}

fn metrics_error(e: prometheus::Error) -> AppError {
    AppError::Internal(anyhow::anyhow!("metrics: {}", e))
}
