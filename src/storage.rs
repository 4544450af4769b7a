//! Alert storage
//!
//! Components:
//! - `storage_trait`: the AlertStore trait defining a uniform API.
//! - `types`: alert records and query filters.
//! - `file_storage`: JSON-lines file implementation.

pub mod file_storage;
pub mod storage_trait;
pub mod types;
