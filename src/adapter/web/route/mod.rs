pub mod targets;
pub mod transactions;
