use serde::{Deserialize, Serialize};
use std::fmt;

pub const SEVERITY_CRITICAL: u8 = 1;
pub const SEVERITY_HIGH: u8 = 2;
pub const SEVERITY_MEDIUM: u8 = 3;
pub const SEVERITY_LOW: u8 = 4;

/// A detection signal that fired for a packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    PortScan,
    SynFlood,
    SuspiciousPort,
    /// Non-benign classifier verdict, carrying the class label
    Classifier(String),
}

impl Signal {
    pub fn name(&self) -> &str {
        match self {
            Signal::PortScan => "PORT_SCAN",
            Signal::SynFlood => "DOS_ATTACK",
            Signal::SuspiciousPort => "SUSPICIOUS_PORT",
            Signal::Classifier(label) => label.as_str(),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Outcome of one detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub threat: bool,
    /// Fired signals in evaluation order
    pub signals: Vec<Signal>,
    /// 1 (critical) .. 4 (low), the most severe fired signal
    pub severity: u8,
    pub description: String,
}

impl Verdict {
    pub fn benign() -> Self {
        Self {
            threat: false,
            signals: Vec::new(),
            severity: SEVERITY_LOW,
            description: String::new(),
        }
    }

    /// Comma separated signal names, e.g. `PORT_SCAN, DOS_ATTACK`.
    pub fn threat_type(&self) -> String {
        self.signals
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn has(&self, signal: &Signal) -> bool {
        self.signals.contains(signal)
    }
}
