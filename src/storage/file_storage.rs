use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, error, info, warn};

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::AlertStore;
use crate::storage::types::{AlertFilter, AlertRecord};

const ALERTS_FILE: &str = "alerts.jsonl";

/// Alert store backed by a JSON-lines file, one record per line.
pub struct FileAlertStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAlertStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| { error!("Failed to create alerts dir {}: {}", parent.display(), e); StorageError::WriteFailed })?;
        }
        OpenOptions::new().create(true).append(true).open(&path).map_err(|e| { error!("Failed to open alerts file {}: {}", path.display(), e); StorageError::ConnectionFailed })?;
        info!("FileAlertStore initialized at {}", path.display());

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Construct a store under NIDPS_STORAGE_DIR if set, otherwise the current directory.
    pub fn new_default() -> Result<Self, StorageError> {
        if let Ok(dir) = std::env::var("NIDPS_STORAGE_DIR") {
            info!("Using FileAlertStore from NIDPS_STORAGE_DIR: {}", dir);
            return Self::new(PathBuf::from(dir).join(ALERTS_FILE));
        }
        let cwd = std::env::current_dir().map_err(|e| { error!("Failed to get current dir: {}", e); StorageError::ReadFailed })?;
        info!("Using FileAlertStore at current directory: {}", cwd.display());
        Self::new(cwd.join(ALERTS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AlertStore for FileAlertStore {
    fn insert_alert(&self, record: &AlertRecord) -> Result<(), StorageError> {
        let line = serde_json::to_string(record).map_err(|e| { error!("Failed to serialize alert {}: {}", record.id, e); StorageError::WriteFailed })?;

        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut f = OpenOptions::new().create(true).append(true).open(&self.path).map_err(|e| { error!("Open append failed {}: {}", self.path.display(), e); StorageError::WriteFailed })?;
        writeln!(f, "{}", line).map_err(|e| { error!("Write failed {}: {}", self.path.display(), e); StorageError::WriteFailed })?;
        debug!("Stored alert {} ({}) in {}", record.id, record.alert_type, self.path.display());
        Ok(())
    }

    fn recent_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>, StorageError> {
        let f = File::open(&self.path).map_err(|e| { error!("Failed to read alerts file {}: {}", self.path.display(), e); StorageError::ReadFailed })?;
        let mut records = Vec::new();
        for (n, line) in BufReader::new(f).lines().enumerate() {
            let line = line.map_err(|e| { error!("Read failed {}: {}", self.path.display(), e); StorageError::ReadFailed })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AlertRecord>(&line) {
                Ok(record) if filter.matches(&record) => records.push(record),
                Ok(_) => {}
                Err(e) => warn!("Skipping corrupt alert at {}:{}: {}", self.path.display(), n + 1, e),
            }
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        debug!("Loaded {} alert(s) from {}", records.len(), self.path.display());
        Ok(records)
    }
}
