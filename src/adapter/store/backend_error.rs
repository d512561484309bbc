use sqlx::mysql::MySqlDatabaseError;

use crate::core::domain::classifier::BackendError;

/// Reduces a driver error to the fields the classifier inspects: the
/// SQLSTATE every backend reports, plus MySQL's numeric error code.
pub fn backend_error(error: &sqlx::Error) -> BackendError {
    match error {
        sqlx::Error::Database(db) => {
            let mut backend = BackendError::new(db.message());
            if let Some(code) = db.code() {
                backend = backend.with_sqlstate(code.into_owned());
            }
            if let Some(mysql) = db.try_downcast_ref::<MySqlDatabaseError>() {
                backend = backend.with_number(u32::from(mysql.number()));
            }
            backend
        }
        other => BackendError::new(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_carry_no_codes() {
        let error = backend_error(&sqlx::Error::PoolTimedOut);
        assert_eq!(error.sqlstate, None);
        assert_eq!(error.number, None);
        assert!(!error.message.is_empty());
    }
}
