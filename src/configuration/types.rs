use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Ports commonly bound by backdoors, RATs and C2 tooling.
pub const DEFAULT_SUSPICIOUS_PORTS: [u16; 9] = [
    4444, 4445, // Metasploit default
    5555, 5556, // Common backdoors
    6666, 6667, // IRC / botnets
    31337, // Back Orifice
    12345, 12346, // NetBus
];

/// Control loop tuning.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Upper bound on packet-in events processed concurrently
    pub max_inflight_events: usize,
    /// Period of the window sweep and block table reconciliation, in seconds
    pub maintenance_interval_secs: u64,
    /// Period of flow statistics requests, in seconds. `0` disables polling
    pub stats_interval_secs: u64,
    /// Keep L2 forwarding for frames the extractor cannot parse (ARP, ...)
    pub forward_unparsed: bool,
    pub log_level: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_inflight_events: 256,
            maintenance_interval_secs: 30,
            stats_interval_secs: 10,
            forward_unparsed: true,
            log_level: String::from("info"),
        }
    }
}

/// Thresholds for the stateful detection signals.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Distinct destination ports per minute above which a source is scanning
    pub scan_threshold_per_min: f64,
    /// SYN packets per minute above which a source is flooding
    pub syn_threshold_per_min: f64,
    /// Age after which a source window is discarded
    pub window_retention_secs: u64,
    pub suspicious_ports: Vec<u16>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            scan_threshold_per_min: 10.0,
            syn_threshold_per_min: 100.0,
            window_retention_secs: 300,
            suspicious_ports: DEFAULT_SUSPICIOUS_PORTS.to_vec(),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub enabled: bool,
    /// JSON model file; no path means the classifier signal always abstains
    pub model_path: Option<PathBuf>,
    pub confidence_threshold: f64,
    /// Time a single prediction may take before it counts as an abstention
    pub budget_ms: u64,
    /// Predictions allowed to run at once, timed-out calls included
    pub max_concurrent: usize,
    /// Severity override per class label, labels missing here get `3`
    pub class_severity: HashMap<String, u8>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_path: None,
            confidence_threshold: 0.7,
            budget_ms: 25,
            max_concurrent: 4,
            class_severity: HashMap::new(),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcementConfig {
    pub block_priority: u16,
    pub flow_block_timeout_secs: u16,
    pub address_block_timeout_secs: u16,
    /// External alerts at or below this severity trigger an address block
    pub alert_block_max_severity: u8,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            block_priority: 100,
            flow_block_timeout_secs: 60,
            address_block_timeout_secs: 300,
            alert_block_max_severity: 2,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuricataConfig {
    pub enabled: bool,
    pub eve_log: PathBuf,
    pub poll_interval_ms: u64,
    /// Replay the whole log instead of starting at its current end
    pub from_start: bool,
}

impl Default for SuricataConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            eve_log: PathBuf::from("/var/log/suricata/eve.json"),
            poll_interval_ms: 100,
            from_start: false,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    pub alerts_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alerts_path: PathBuf::from("logs/alerts.jsonl"),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: String::from("0.0.0.0"),
            port: 8080,
        }
    }
}
