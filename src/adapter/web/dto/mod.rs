pub mod coordinate_transaction_web_input;
pub mod recover_transaction_web_input;
