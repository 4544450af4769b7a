//! # EVE Monitor
//!
//! Follows a Suricata EVE JSON log and turns its `alert` records into [`ExternalAlert`]s
//! for the controller.
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │ Suricata        │───▶│ EveMonitor       │───▶│ Controller      │
//! │ eve.json        │    │                  │    │ (via mpsc)      │
//! └─────────────────┘    │ - Line tailing   │    └─────────────────┘
//!                        │ - Rotation check │
//!                        │ - Alert parsing  │
//!                        └──────────────────┘
//! ```
//!
//! The file is polled. Each poll reads every complete line appended since the last one;
//! a trailing half-written line is kept until its newline arrives. When the file shrinks
//! below the read position it was rotated or truncated, and the monitor starts over from
//! its beginning.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//! use nidps::alert_ingestion::eve_monitor::EveMonitor;
//! use nidps::error_handling::types::IngestError;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), IngestError> {
//!     let (tx, mut rx) = mpsc::channel(64);
//!     let monitor = EveMonitor::new("/var/log/suricata/eve.json", Duration::from_millis(100), false);
//!     tokio::spawn(monitor.run(tx));
//!
//!     while let Some(alert) = rx.recv().await {
//!         println!("{} from {:?}", alert.signature, alert.source_ip);
//!     }
//!     Ok(())
//! }
//! ```

use log::{debug, info, trace, warn};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc::Sender;

use super::types::*;
use crate::configuration::types::SuricataConfig;
use crate::error_handling::types::IngestError;

pub struct EveMonitor {
    path: PathBuf,
    poll_interval: Duration,
    from_start: bool,
}

impl EveMonitor {
    pub fn new<P: AsRef<Path>>(path: P, poll_interval: Duration, from_start: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            poll_interval,
            from_start,
        }
    }

    pub fn from_config(config: &SuricataConfig) -> Self {
        Self::new(
            &config.eve_log,
            Duration::from_millis(config.poll_interval_ms),
            config.from_start,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self, seek_end: bool) -> Result<(BufReader<File>, u64), IngestError> {
        let mut file = File::open(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IngestError::LogNotFound(self.path.display().to_string())
            } else {
                IngestError::IoError(e)
            }
        })?;
        let position = if seek_end {
            file.seek(SeekFrom::End(0)).await?
        } else {
            0
        };
        Ok((BufReader::new(file), position))
    }

    /// Tails the log until the receiving side of `alerts` is dropped.
    pub async fn run(self, alerts: Sender<ExternalAlert>) -> Result<(), IngestError> {
        let (mut reader, mut position) = self.open(!self.from_start).await?;
        info!(
            "Monitoring Suricata alerts in {} from offset {}",
            self.path.display(),
            position
        );

        let mut pending = String::new();
        loop {
            let mut line = String::new();
            let read = reader.read_line(&mut line).await?;

            if read == 0 {
                if alerts.is_closed() {
                    debug!("Alert receiver dropped, stopping EVE monitor");
                    return Ok(());
                }
                match tokio::fs::metadata(&self.path).await {
                    Ok(meta) if meta.len() < position => {
                        info!("{} was rotated, reopening", self.path.display());
                        (reader, position) = self.open(false).await?;
                        pending.clear();
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => trace!("Cannot stat {}: {}", self.path.display(), e),
                }
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            position += read as u64;
            pending.push_str(&line);
            if !pending.ends_with('\n') {
                continue;
            }

            let complete = std::mem::take(&mut pending);
            if let Some(alert) = parse_line(complete.trim_end()) {
                debug!("Suricata alert: {} ({})", alert.signature, alert.category);
                if alerts.send(alert).await.is_err() {
                    debug!("Alert receiver dropped, stopping EVE monitor");
                    return Ok(());
                }
            }
        }
    }
}

/// Parses one EVE record. Anything that is not a well-formed `alert` event is `None`.
pub fn parse_line(line: &str) -> Option<ExternalAlert> {
    if line.is_empty() {
        return None;
    }
    let event: EveEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            warn!("Skipping malformed EVE record: {}", e);
            return None;
        }
    };
    if event.event_type != "alert" {
        return None;
    }
    let alert = event.alert?;

    Some(ExternalAlert {
        severity: alert.severity.unwrap_or(DEFAULT_ALERT_SEVERITY),
        source_ip: event.src_ip.and_then(|ip| ip.parse().ok()),
        dest_ip: event.dest_ip.and_then(|ip| ip.parse().ok()),
        source_port: event.src_port,
        dest_port: event.dest_port,
        protocol: event.proto.unwrap_or_default().to_uppercase(),
        signature: alert.signature.unwrap_or_default(),
        category: alert.category.unwrap_or_else(|| "Unknown".to_string()),
    })
}
