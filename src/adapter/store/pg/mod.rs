pub mod branch_handle;
pub mod resource_manager;
