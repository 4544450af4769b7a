//! External IDS alerts (Suricata EVE JSON).

pub mod eve_monitor;
pub mod types;
