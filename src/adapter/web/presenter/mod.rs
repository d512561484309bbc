pub mod coordinate_transaction;
pub mod recover_transaction;
