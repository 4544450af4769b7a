//! Alert Store Trait
//!
//! Interface of the alert persistence backends. The control loop only ever inserts; the
//! inventory API reads recent alerts back.

use crate::error_handling::types::StorageError;
use crate::storage::types::{AlertFilter, AlertRecord};

pub trait AlertStore: Send + Sync {
    /// Persists one alert.
    fn insert_alert(&self, record: &AlertRecord) -> Result<(), StorageError>;

    /// Most recent alerts first, filtered.
    fn recent_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>, StorageError>;
}
