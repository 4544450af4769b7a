use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::southbound::types::{FlowAction, FlowMatch, SwitchId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleHandle {
    pub id: Uuid,
    pub switch: SwitchId,
}

/// Audit copy of a rule the controller asked a switch to install.
///
/// The switch is authoritative. The record only reflects what was sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRuleRecord {
    pub handle: RuleHandle,
    pub switch: SwitchId,
    pub flow_match: FlowMatch,
    pub actions: Vec<FlowAction>,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub installed_at: DateTime<Utc>,
}

impl FlowRuleRecord {
    pub fn is_drop(&self) -> bool {
        self.actions.is_empty()
    }

    /// `None` for rules without a hard timeout.
    pub fn hard_expiry(&self) -> Option<DateTime<Utc>> {
        if self.hard_timeout == 0 {
            None
        } else {
            Some(self.installed_at + Duration::seconds(i64::from(self.hard_timeout)))
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.hard_expiry().map(|expiry| now >= expiry).unwrap_or(false)
    }
}
