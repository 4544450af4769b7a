use std::fmt;

use crate::southbound::types::SwitchId;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    NotInRange(String),
    BadPath(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::BadPath(e) => write!(f, "Path error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PacketError {
    /// The payload does not carry at least an Ethernet and a network layer header.
    MalformedPacket(String),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::MalformedPacket(e) => write!(f, "Malformed packet: {}", e),
        }
    }
}

impl std::error::Error for PacketError {}

#[derive(Debug, Clone, PartialEq)]
pub enum SouthboundError {
    /// The transport to this switch is gone or saturated.
    SouthboundUnavailable(SwitchId),
    UnknownSwitch(SwitchId),
}

impl fmt::Display for SouthboundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SouthboundError::SouthboundUnavailable(id) => {
                write!(f, "Southbound transport unavailable for switch {}", id)
            }
            SouthboundError::UnknownSwitch(id) => write!(f, "Unknown switch {}", id),
        }
    }
}

impl std::error::Error for SouthboundError {}

#[derive(Debug)]
pub enum ClassifierError {
    ModelUnavailable,
    ModelLoadFailed(String),
    PredictionFailed(String),
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierError::ModelUnavailable => write!(f, "Classifier model unavailable"),
            ClassifierError::ModelLoadFailed(e) => write!(f, "Classifier model load failed: {}", e),
            ClassifierError::PredictionFailed(e) => write!(f, "Prediction failed: {}", e),
        }
    }
}

impl std::error::Error for ClassifierError {}

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed,
    WriteFailed,
    ReadFailed,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed => write!(f, "Storage connection failed"),
            StorageError::WriteFailed => write!(f, "Storage write failed"),
            StorageError::ReadFailed => write!(f, "Storage read failed"),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum IngestError {
    LogNotFound(String),
    IoError(std::io::Error),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::LogNotFound(e) => write!(f, "Alert log not found: {}", e),
            IngestError::IoError(e) => write!(f, "Alert log IO error: {}", e),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::IoError(err)
    }
}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Web server bind failed: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    ClassifierError(ClassifierError),
    StorageError(StorageError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::ClassifierError(e) => write!(f, "Classifier error: {}", e),
            ControllerError::StorageError(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<ClassifierError> for ControllerError {
    fn from(err: ClassifierError) -> Self {
        ControllerError::ClassifierError(err)
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::StorageError(err)
    }
}
