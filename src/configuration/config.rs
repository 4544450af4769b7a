use super::types::*;
use crate::error_handling::types::ConfigError;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::Path;

/// Application configuration structure that defines all runtime parameters.
///
/// The configuration is read from a TOML file. Every section and every field is optional
/// and falls back to its default, so an empty file yields a working controller with the
/// stock thresholds.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use nidps::configuration::config::Config;
///
/// let config = Config::from_file(Path::new("config/nidps.toml")).unwrap();
/// println!("Scan threshold: {}", config.detection.scan_threshold_per_min);
/// ```
///
/// # Sections Overview
///
/// - `controller`: worker pool size, queue depths and maintenance periods
/// - `detection`: scan / flood thresholds, window retention and the suspicious port list
/// - `classifier`: model file, confidence threshold and prediction budget
/// - `enforcement`: drop rule priority and hard timeouts
/// - `suricata`: EVE log ingestion
/// - `storage`: where alert records are appended
/// - `api`: read-only inventory HTTP endpoint
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub detection: DetectionConfig,
    pub classifier: ClassifierConfig,
    pub enforcement: EnforcementConfig,
    pub suricata: SuricataConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
}

impl Config {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::IoError`] if the file cannot be read
    /// - [`ConfigError::TomlError`] if it is not valid TOML for this structure
    /// - [`ConfigError::NotInRange`] if a value fails [`Config::validate`]
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {}", path.display());
        let raw = fs::read_to_string(path).map_err(|e| {
            error!("Unable to read {}: {}", path.display(), e);
            ConfigError::IoError(e)
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        debug!("Configuration parsed: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let detection = &self.detection;
        if !(detection.scan_threshold_per_min > 0.0) {
            return Err(ConfigError::NotInRange(format!(
                "detection.scan_threshold_per_min must be positive, got {}",
                detection.scan_threshold_per_min
            )));
        }
        if !(detection.syn_threshold_per_min > 0.0) {
            return Err(ConfigError::NotInRange(format!(
                "detection.syn_threshold_per_min must be positive, got {}",
                detection.syn_threshold_per_min
            )));
        }
        if detection.window_retention_secs == 0 {
            return Err(ConfigError::NotInRange(
                "detection.window_retention_secs must be at least 1".to_string(),
            ));
        }

        let classifier = &self.classifier;
        if !(0.0..=1.0).contains(&classifier.confidence_threshold) {
            return Err(ConfigError::NotInRange(format!(
                "classifier.confidence_threshold must be within [0, 1], got {}",
                classifier.confidence_threshold
            )));
        }
        if classifier.budget_ms == 0 {
            return Err(ConfigError::NotInRange(
                "classifier.budget_ms must be at least 1".to_string(),
            ));
        }
        if classifier.max_concurrent == 0 {
            return Err(ConfigError::NotInRange(
                "classifier.max_concurrent must be at least 1".to_string(),
            ));
        }
        if let Some((label, severity)) = classifier
            .class_severity
            .iter()
            .find(|(_, s)| !(1..=4).contains(*s))
        {
            return Err(ConfigError::NotInRange(format!(
                "classifier.class_severity.{} must be within 1..=4, got {}",
                label, severity
            )));
        }

        let enforcement = &self.enforcement;
        if enforcement.block_priority == 0 {
            return Err(ConfigError::NotInRange(
                "enforcement.block_priority 0 is reserved for table-miss rules".to_string(),
            ));
        }
        if enforcement.flow_block_timeout_secs == 0 || enforcement.address_block_timeout_secs == 0
        {
            return Err(ConfigError::NotInRange(
                "block timeouts must be non-zero, a drop rule must expire".to_string(),
            ));
        }

        if self.controller.max_inflight_events == 0 {
            return Err(ConfigError::NotInRange(
                "controller.max_inflight_events must be at least 1".to_string(),
            ));
        }
        if self.controller.maintenance_interval_secs == 0 {
            return Err(ConfigError::NotInRange(
                "controller.maintenance_interval_secs must be at least 1".to_string(),
            ));
        }

        if self.api.enabled {
            if self.api.port == 0 {
                return Err(ConfigError::NotInRange("api.port must be non-zero".to_string()));
            }
            if self.api.bind_address.parse::<IpAddr>().is_err() {
                return Err(ConfigError::BadPath(format!(
                    "api.bind_address is not an IP address: {}",
                    self.api.bind_address
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.detection.scan_threshold_per_min, 10.0);
        assert_eq!(config.detection.syn_threshold_per_min, 100.0);
        assert_eq!(config.detection.window_retention_secs, 300);
        assert_eq!(config.classifier.confidence_threshold, 0.7);
        assert_eq!(config.enforcement.block_priority, 100);
        assert_eq!(config.enforcement.flow_block_timeout_secs, 60);
        assert_eq!(config.enforcement.address_block_timeout_secs, 300);
        assert!(config.detection.suspicious_ports.contains(&31337));
    }

    #[test]
    fn test_from_file_with_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[detection]
scan_threshold_per_min = 20.0

[classifier]
model_path = "/opt/models/flows.json"
budget_ms = 40

[classifier.class_severity]
DOS = 1

[api]
port = 9090
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.detection.scan_threshold_per_min, 20.0);
        assert_eq!(config.detection.syn_threshold_per_min, 100.0);
        assert_eq!(
            config.classifier.model_path.as_deref(),
            Some(Path::new("/opt/models/flows.json"))
        );
        assert_eq!(config.classifier.budget_ms, 40);
        assert_eq!(config.classifier.class_severity.get("DOS"), Some(&1));
        assert_eq!(config.api.port, 9090);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file(Path::new("/nonexistent/nidps.toml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml_str("[detection\nscan_threshold_per_min = ");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let cases = [
            "[detection]\nscan_threshold_per_min = 0.0",
            "[detection]\nsyn_threshold_per_min = -1.0",
            "[classifier]\nconfidence_threshold = 1.5",
            "[classifier]\nmax_concurrent = 0",
            "[classifier.class_severity]\nPROBE = 7",
            "[enforcement]\nblock_priority = 0",
            "[enforcement]\nflow_block_timeout_secs = 0",
            "[controller]\nmax_inflight_events = 0",
            "[api]\nbind_address = \"localhost:80\"",
        ];

        for raw in cases {
            let result = Config::from_toml_str(raw);
            assert!(result.is_err(), "expected rejection for {:?}", raw);
        }
    }
}
