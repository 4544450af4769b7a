use serde::Serialize;

use crate::flow_management::types::FlowRuleRecord;
use crate::policy_enforcement::types::BlockEntry;
use crate::southbound::types::{FlowAction, OutputPort};
use crate::topology::types::Switch;

#[derive(Debug, Serialize, PartialEq)]
pub struct HealthResponse {
    pub status: &'static str,
    pub switches: usize,
    pub tracked_sources: usize,
    pub blocked: usize,
    pub active_rules: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SwitchResponse {
    pub id: String,
    pub dpid: u64,
    pub alive: bool,
    pub connected_at: String, // ISO8601
}

impl From<&Switch> for SwitchResponse {
    fn from(switch: &Switch) -> Self {
        Self {
            id: switch.id.to_string(),
            dpid: switch.id.0,
            alive: switch.alive,
            connected_at: switch.connected_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct BlockedResponse {
    pub identity: String,
    pub address: String,
    pub flow: bool,
    pub reason: String,
    pub severity: u8,
    pub created_at: String,
    pub expires_at: String,
    pub switches: Vec<String>,
}

impl From<&BlockEntry> for BlockedResponse {
    fn from(entry: &BlockEntry) -> Self {
        Self {
            identity: entry.identity.to_string(),
            address: entry.identity.address().to_string(),
            flow: entry.identity.is_flow(),
            reason: entry.reason.clone(),
            severity: entry.severity,
            created_at: entry.created_at.to_rfc3339(),
            expires_at: entry.expires_at.to_rfc3339(),
            switches: entry.switches.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct FlowRuleResponse {
    pub id: String,
    pub switch: String,
    pub priority: u16,
    #[serde(rename = "match")]
    pub flow_match: String,
    pub actions: Vec<String>,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub installed_at: String,
}

impl From<&FlowRuleRecord> for FlowRuleResponse {
    fn from(record: &FlowRuleRecord) -> Self {
        Self {
            id: record.handle.id.to_string(),
            switch: record.switch.to_string(),
            priority: record.priority,
            flow_match: record.flow_match.to_string(),
            actions: if record.is_drop() {
                vec!["drop".to_string()]
            } else {
                record.actions.iter().map(describe_action).collect()
            },
            idle_timeout: record.idle_timeout,
            hard_timeout: record.hard_timeout,
            installed_at: record.installed_at.to_rfc3339(),
        }
    }
}

fn describe_action(action: &FlowAction) -> String {
    match action {
        FlowAction::Output(OutputPort::Physical(port)) => format!("output:{}", port),
        FlowAction::Output(OutputPort::Flood) => "output:flood".to_string(),
        FlowAction::Output(OutputPort::Controller) => "output:controller".to_string(),
    }
}
