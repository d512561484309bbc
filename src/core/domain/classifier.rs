use crate::core::domain::branch::ResourceManagerKind;
use crate::core::domain::transaction::{Operation, TransactionError};

/// Backend-native code attached to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCode {
    SqlState(&'static str),
    Number(u32),
}

/// A failure as reported by a driver, reduced to the fields classification
/// needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendError {
    pub sqlstate: Option<String>,
    pub number: Option<u32>,
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    pub fn with_number(mut self, number: u32) -> Self {
        self.number = Some(number);
        self
    }

    fn matches(&self, code: BackendCode) -> bool {
        match code {
            BackendCode::SqlState(state) => self.sqlstate.as_deref() == Some(state),
            BackendCode::Number(number) => self.number == Some(number),
        }
    }
}

pub struct UnknownTransactionRule {
    pub kind: ResourceManagerKind,
    pub code: BackendCode,
    pub meaning: &'static str,
}

/// Codes meaning "the backend does not know this transaction id". Supporting
/// another backend means adding a row here.
pub const UNKNOWN_TRANSACTION_CODES: &[UnknownTransactionRule] = &[
    UnknownTransactionRule {
        kind: ResourceManagerKind::StandardSql2pc,
        code: BackendCode::SqlState("42704"),
        meaning: "prepared transaction with identifier does not exist",
    },
    UnknownTransactionRule {
        kind: ResourceManagerKind::Xa,
        code: BackendCode::Number(1397),
        meaning: "XAER_NOTA: Unknown XID",
    },
];

#[derive(Debug, Clone, Copy)]
pub struct ErrorClassifier {
    kind: ResourceManagerKind,
}

impl ErrorClassifier {
    pub fn new(kind: ResourceManagerKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> ResourceManagerKind {
        self.kind
    }

    /// Whether `error` is this backend's "unknown transaction id" response.
    pub fn is_unknown_transaction(&self, error: &BackendError) -> bool {
        UNKNOWN_TRANSACTION_CODES
            .iter()
            .any(|rule| rule.kind == self.kind && error.matches(rule.code))
    }

    /// Maps a failure of `operation` onto the taxonomy. Only resolution
    /// steps (commit, rollback) can yield `BranchNotFound`; everything else
    /// is fatal for its phase.
    pub fn classify(&self, operation: Operation, error: BackendError) -> TransactionError {
        if matches!(operation, Operation::Commit | Operation::Rollback)
            && self.is_unknown_transaction(&error)
        {
            return TransactionError::BranchNotFound(error.message);
        }
        TransactionError::for_operation(operation, describe(&error))
    }
}

fn describe(error: &BackendError) -> String {
    match (&error.sqlstate, error.number) {
        (Some(state), Some(number)) => format!("{} (error {number}, sqlstate {state})", error.message),
        (Some(state), None) => format!("{} (sqlstate {state})", error.message),
        (None, Some(number)) => format!("{} (error {number})", error.message),
        (None, None) => error.message.clone(),
    }
}
