use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{AppError, Result};

pub const DEFAULT_QUOTA_BYTES: i64 = 5 * 1024 * 1024 * 1024; // 5GB free plan
pub const DEFAULT_MAX_UPLOAD_BYTES: i64 = 100 * 1024 * 1024; // 100MB

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub default_quota_bytes: i64,
    pub max_upload_bytes: i64,
    pub blob_root: String,
    pub blob_public_base_url: String,
    pub reconcile_interval_secs: u64,
    pub reconcile_concurrency: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "postgresql://localhost/media_storage".to_string(),
            database_max_connections: 20,
            default_quota_bytes: DEFAULT_QUOTA_BYTES,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            blob_root: "./blobs".to_string(),
            blob_public_base_url: "http://localhost:3000/blobs".to_string(),
            reconcile_interval_secs: 3600,
            reconcile_concurrency: 4,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let config = Config {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: parse_var(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            default_quota_bytes: parse_var("DEFAULT_QUOTA_BYTES", defaults.default_quota_bytes)?,
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            blob_root: env::var("BLOB_ROOT").unwrap_or(defaults.blob_root),
            blob_public_base_url: env::var("BLOB_PUBLIC_BASE_URL")
                .unwrap_or(defaults.blob_public_base_url),
            reconcile_interval_secs: parse_var(
                "RECONCILE_INTERVAL_SECS",
                defaults.reconcile_interval_secs,
            )?,
            reconcile_concurrency: parse_var(
                "RECONCILE_CONCURRENCY",
                defaults.reconcile_concurrency,
            )?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_quota_bytes < 0 {
            return Err(AppError::Config(
                "DEFAULT_QUOTA_BYTES must not be negative".to_string(),
            ));
        }
        if self.max_upload_bytes <= 0 {
            return Err(AppError::Config(
                "MAX_UPLOAD_BYTES must be positive".to_string(),
            ));
        }
        if self.reconcile_interval_secs == 0 {
            return Err(AppError::Config(
                "RECONCILE_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }
        if self.reconcile_concurrency == 0 {
            return Err(AppError::Config(
                "RECONCILE_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{}: {}", name, e))),
        Err(_) => Ok(default),
    }
}
