use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// XA limits the global transaction id (gtrid) to 64 bytes; Postgres allows
/// longer gids, so the XA limit governs.
pub const MAX_GLOBAL_ID_LEN: usize = 64;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GlobalIdError {
    #[error("Global transaction id must not be empty")]
    Empty,
    #[error("Global transaction id is {0} bytes, the limit is {MAX_GLOBAL_ID_LEN}")]
    TooLong(usize),
    #[error("Global transaction id contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Identifier presented verbatim to every resource manager's prepare, commit
/// and rollback commands.
///
/// The value is spliced into command text (`PREPARE TRANSACTION '<id>'`,
/// `XA BEGIN '<id>'`), so only a conservative character set is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GlobalId(String);

impl GlobalId {
    pub fn parse(value: impl Into<String>) -> Result<Self, GlobalIdError> {
        let value = value.into();
        if value.is_empty() {
            return Err(GlobalIdError::Empty);
        }
        if value.len() > MAX_GLOBAL_ID_LEN {
            return Err(GlobalIdError::TooLong(value.len()));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')))
        {
            return Err(GlobalIdError::InvalidCharacter(c));
        }
        Ok(Self(value))
    }

    /// Fresh id for one orchestration attempt.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("gtx-{millis}-{sequence}"))
    }

    /// Deterministic branch id, reconstructible by recovery from the global
    /// id and the branch position alone.
    pub fn branch_id(&self, index: usize) -> String {
        format!("{}/{}", self.0, index)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GlobalId {
    type Error = GlobalIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<GlobalId> for String {
    fn from(value: GlobalId) -> Self {
        value.0
    }
}
