pub mod flow_manager;
pub mod types;
