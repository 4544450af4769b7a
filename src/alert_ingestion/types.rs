use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Alert raised by an external IDS (Suricata).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalAlert {
    /// 1 (critical) .. 4 (low)
    pub severity: u8,
    pub source_ip: Option<IpAddr>,
    pub dest_ip: Option<IpAddr>,
    pub source_port: Option<u16>,
    pub dest_port: Option<u16>,
    pub protocol: String,
    pub signature: String,
    pub category: String,
}

/// The subset of an EVE JSON record the monitor reads.
#[derive(Debug, Deserialize)]
pub(crate) struct EveEvent {
    pub event_type: String,
    pub src_ip: Option<String>,
    pub dest_ip: Option<String>,
    pub src_port: Option<u16>,
    pub dest_port: Option<u16>,
    pub proto: Option<String>,
    pub alert: Option<EveAlert>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EveAlert {
    pub signature: Option<String>,
    pub category: Option<String>,
    pub severity: Option<u8>,
}

/// Suricata's default when an alert carries no severity.
pub const DEFAULT_ALERT_SEVERITY: u8 = 3;
