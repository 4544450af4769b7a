pub mod topology_registry;
pub mod types;
