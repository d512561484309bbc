use std::path::PathBuf;
use std::time::Duration;

use crate::error::ApplicationError;

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POOL_SIZE: u32 = 5;

/// Target names branch descriptors use for the configured backends.
pub const POSTGRES_TARGET: &str = "postgres";
pub const MYSQL_TARGET: &str = "mysql";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    bind: String,
    pg_url: Option<String>,
    mysql_url: Option<String>,
    timeout: Duration,
    cleanup_timeout: Duration,
    decision_log: Option<PathBuf>,
    pool_size: u32,
}

impl AppConfig {
    pub fn load() -> Result<Self, ApplicationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApplicationError> {
        let pg_url = lookup("ATOMIC_COMMIT_PG_URL");
        if let Some(url) = &pg_url {
            check_scheme("ATOMIC_COMMIT_PG_URL", url, &["postgres://", "postgresql://"])?;
        }
        let mysql_url = lookup("ATOMIC_COMMIT_MYSQL_URL");
        if let Some(url) = &mysql_url {
            check_scheme("ATOMIC_COMMIT_MYSQL_URL", url, &["mysql://", "mariadb://"])?;
        }

        Ok(Self {
            bind: lookup("ATOMIC_COMMIT_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            pg_url,
            mysql_url,
            timeout: millis(&lookup, "ATOMIC_COMMIT_TIMEOUT_MS")?.unwrap_or(DEFAULT_TIMEOUT),
            cleanup_timeout: millis(&lookup, "ATOMIC_COMMIT_CLEANUP_TIMEOUT_MS")?
                .unwrap_or(DEFAULT_CLEANUP_TIMEOUT),
            decision_log: lookup("ATOMIC_COMMIT_DECISION_LOG").map(PathBuf::from),
            pool_size: match lookup("ATOMIC_COMMIT_POOL_SIZE") {
                Some(raw) => raw.parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(|| {
                    ApplicationError::ConfigurationError {
                        key: "ATOMIC_COMMIT_POOL_SIZE",
                        reason: format!("expected a positive integer, got {raw:?}"),
                    }
                })?,
                None => DEFAULT_POOL_SIZE,
            },
        })
    }

    pub fn bind(&self) -> &str {
        &self.bind
    }

    pub fn pg_url(&self) -> Option<&str> {
        self.pg_url.as_deref()
    }

    pub fn mysql_url(&self) -> Option<&str> {
        self.mysql_url.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cleanup_timeout(&self) -> Duration {
        self.cleanup_timeout
    }

    pub fn decision_log(&self) -> Option<&PathBuf> {
        self.decision_log.as_ref()
    }

    pub fn pool_size(&self) -> u32 {
        self.pool_size
    }
}

fn check_scheme(key: &'static str, url: &str, schemes: &[&str]) -> Result<(), ApplicationError> {
    if schemes.iter().any(|scheme| url.starts_with(scheme)) {
        Ok(())
    } else {
        Err(ApplicationError::ConfigurationError {
            key,
            reason: format!("expected a URL starting with one of {schemes:?}"),
        })
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<Duration>, ApplicationError> {
    lookup(key)
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ApplicationError::ConfigurationError {
                    key,
                    reason: format!("expected milliseconds, got {raw:?}"),
                })
        })
        .transpose()
}
