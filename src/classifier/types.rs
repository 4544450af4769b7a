use serde::{Deserialize, Serialize};
use std::fmt;

pub const FEATURE_COUNT: usize = 9;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "packet_count",
    "byte_count",
    "duration",
    "packets_per_second",
    "bytes_per_packet",
    "protocol",
    "src_port",
    "dst_port",
    "tcp_flags",
];

pub const BENIGN_LABEL: &str = "BENIGN";

/// Fixed-order input of every classifier, see [`FEATURE_NAMES`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub is_malicious: bool,
    pub class_label: String,
    /// Probability of `class_label`, within `[0, 1]`
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbstainReason {
    NoModel,
    Timeout,
    /// Every prediction slot is taken by a call still running
    Busy,
    Failed(String),
}

impl fmt::Display for AbstainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstainReason::NoModel => write!(f, "no model configured"),
            AbstainReason::Timeout => write!(f, "prediction budget exceeded"),
            AbstainReason::Busy => write!(f, "all prediction slots busy"),
            AbstainReason::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// What the adapter hands back to the detection engine. Abstaining is a regular
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierOutcome {
    Predicted(Prediction),
    Abstain(AbstainReason),
}
