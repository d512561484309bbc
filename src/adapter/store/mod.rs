pub mod backend_error;
pub mod file_decision_log;
pub mod mysql;
pub mod pg;
