pub mod config;
pub mod database;
pub mod errors;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

use std::sync::Arc;

use crate::{
    config::Config,
    database::{AccountStore, Database, MediaStore},
    errors::Result,
    services::{LedgerMetrics, QuotaLedger, ReconciliationJob, UploadService},
};

pub use errors::{AppError, ErrorClass};

/// Everything a caller needs, wired against one pair of stores.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub ledger: QuotaLedger,
    pub reconciler: ReconciliationJob,
    pub metrics: Arc<LedgerMetrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        accounts: Arc<dyn AccountStore>,
        media: Arc<dyn MediaStore>,
    ) -> Result<Self> {
        let metrics = Arc::new(LedgerMetrics::new()?);
        let ledger = QuotaLedger::new(
            accounts.clone(),
            media.clone(),
            metrics.clone(),
            config.default_quota_bytes,
        );
        let reconciler = ReconciliationJob::new(
            accounts,
            media,
            metrics.clone(),
            config.reconcile_concurrency,
        );

        Ok(Self {
            config,
            ledger,
            reconciler,
            metrics,
        })
    }

    pub fn from_database(config: Config, database: &Database) -> Result<Self> {
        Self::new(
            config,
            Arc::new(database.account_store()),
            Arc::new(database.media_store()),
        )
    }

    pub fn upload_service(&self) -> Result<UploadService> {
        let blobs = storage::create_blob_store(&self.config)?;
        Ok(UploadService::new(
            self.ledger.clone(),
            Arc::from(blobs),
            self.config.max_upload_bytes,
        ))
    }
}
