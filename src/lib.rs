//! SDN intrusion detection and prevention control loop.
//!
//! Packet-ins punted by programmable switches are reduced to flow features, run through
//! stateful detection (port scan, SYN flood, suspicious destination port, optional
//! classifier) and answered either with drop rules on every switch or with ordinary
//! learning-switch forwarding.

pub mod alert_ingestion;
pub mod classifier;
pub mod configuration;
pub mod controller;
pub mod detection;
pub mod error_handling;
pub mod flow_extraction;
pub mod flow_management;
pub mod policy_enforcement;
pub mod southbound;
pub mod storage;
pub mod topology;
pub mod web_interface;
