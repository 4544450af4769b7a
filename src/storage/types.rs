use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use crate::alert_ingestion::types::ExternalAlert;
use crate::detection::types::Verdict;
use crate::flow_extraction::types::FlowFeatures;

/// Which part of the system raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertOrigin {
    Detector,
    Suricata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub origin: AlertOrigin,
    /// 1 (critical) .. 4 (low)
    pub severity: u8,
    pub alert_type: String,
    pub source_ip: Option<IpAddr>,
    pub destination_ip: Option<IpAddr>,
    pub source_port: Option<u16>,
    pub destination_port: Option<u16>,
    pub protocol: String,
    pub signature: String,
    pub description: String,
    pub blocked: bool,
}

impl AlertRecord {
    pub fn from_verdict(verdict: &Verdict, features: &FlowFeatures, blocked: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: features.observed_at,
            origin: AlertOrigin::Detector,
            severity: verdict.severity,
            alert_type: verdict.threat_type(),
            source_ip: Some(features.src_ip),
            destination_ip: Some(features.dst_ip),
            source_port: Some(features.src_port),
            destination_port: Some(features.dst_port),
            protocol: features.protocol_name().to_string(),
            signature: String::new(),
            description: verdict.description.clone(),
            blocked,
        }
    }

    pub fn from_external(alert: &ExternalAlert, blocked: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            origin: AlertOrigin::Suricata,
            severity: alert.severity,
            alert_type: alert.category.clone(),
            source_ip: alert.source_ip,
            destination_ip: alert.dest_ip,
            source_port: alert.source_port,
            destination_port: alert.dest_port,
            protocol: alert.protocol.clone(),
            signature: alert.signature.clone(),
            description: String::new(),
            blocked,
        }
    }
}

/// Query for stored alerts. Absent fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertFilter {
    /// Keep alerts at or above this severity (numerically at or below)
    pub max_severity: Option<u8>,
    pub source_ip: Option<IpAddr>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AlertFilter {
    pub fn matches(&self, record: &AlertRecord) -> bool {
        if let Some(max) = self.max_severity {
            if record.severity > max {
                return false;
            }
        }
        if let Some(ip) = self.source_ip {
            if record.source_ip != Some(ip) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.timestamp < since {
                return false;
            }
        }
        true
    }
}
