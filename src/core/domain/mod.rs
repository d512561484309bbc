pub mod branch;
pub mod classifier;
pub mod coordinator;
pub mod decision_log;
pub mod global_id;
pub mod global_transaction;
pub mod recovery;
pub mod registry;
pub mod statement;
pub mod transaction;
pub mod tx_context;
