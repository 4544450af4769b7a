//! Command layer over the southbound transport.
//!
//! Shapes install/delete/stats/packet-out commands and sends them without waiting for
//! the switch. Installed rules are kept in an audit registry keyed by switch and match,
//! which is informational only: nothing here reads it back to make forwarding decisions.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::types::{FlowRuleRecord, RuleHandle};
use crate::error_handling::types::SouthboundError;
use crate::southbound::transport::SouthboundTransport;
use crate::southbound::types::{FlowAction, FlowMatch, SouthboundCommand, SwitchId};

type RuleKey = (SwitchId, FlowMatch);

pub struct FlowManager {
    transport: Arc<dyn SouthboundTransport>,
    rules: Mutex<HashMap<RuleKey, FlowRuleRecord>>,
}

impl FlowManager {
    pub fn new(transport: Arc<dyn SouthboundTransport>) -> Self {
        Self {
            transport,
            rules: Mutex::new(HashMap::new()),
        }
    }

    fn rules(&self) -> MutexGuard<'_, HashMap<RuleKey, FlowRuleRecord>> {
        self.rules.lock().unwrap_or_else(|poisoned| {
            warn!("Flow rule registry poisoned, continuing with last state");
            poisoned.into_inner()
        })
    }

    /// Sends an install-rule command. The rule is recorded once the command is queued;
    /// an install for an existing switch+match replaces the previous record.
    pub fn install(
        &self,
        switch: SwitchId,
        priority: u16,
        flow_match: FlowMatch,
        actions: Vec<FlowAction>,
        idle_timeout: u16,
        hard_timeout: u16,
    ) -> Result<RuleHandle, SouthboundError> {
        self.transport.send(
            switch,
            SouthboundCommand::InstallRule {
                priority,
                flow_match: flow_match.clone(),
                actions: actions.clone(),
                idle_timeout,
                hard_timeout,
            },
        )?;

        let handle = RuleHandle {
            id: Uuid::new_v4(),
            switch,
        };
        debug!(
            "Installed rule on {} prio={} match=[{}] actions={} hard={}s",
            switch,
            priority,
            flow_match,
            actions.len(),
            hard_timeout
        );

        let record = FlowRuleRecord {
            handle,
            switch,
            flow_match: flow_match.clone(),
            actions,
            priority,
            idle_timeout,
            hard_timeout,
            installed_at: Utc::now(),
        };
        self.rules().insert((switch, flow_match), record);

        Ok(handle)
    }

    pub fn delete(&self, switch: SwitchId, flow_match: &FlowMatch) -> Result<(), SouthboundError> {
        self.transport.send(
            switch,
            SouthboundCommand::DeleteRule {
                flow_match: flow_match.clone(),
            },
        )?;
        self.rules().remove(&(switch, flow_match.clone()));
        debug!("Deleted rule on {} match=[{}]", switch, flow_match);
        Ok(())
    }

    pub fn request_stats(&self, switch: SwitchId) -> Result<(), SouthboundError> {
        self.transport.send(switch, SouthboundCommand::StatsRequest)
    }

    /// Forwards a packet that reached the controller. With a buffer id the switch
    /// releases its buffered copy and `data` is not sent.
    pub fn packet_out(
        &self,
        switch: SwitchId,
        in_port: u32,
        buffer_id: Option<u32>,
        actions: Vec<FlowAction>,
        data: &[u8],
    ) -> Result<(), SouthboundError> {
        let data = if buffer_id.is_some() {
            Vec::new()
        } else {
            data.to_vec()
        };
        self.transport.send(
            switch,
            SouthboundCommand::PacketOut {
                in_port,
                buffer_id,
                actions,
                data,
            },
        )
    }

    /// Rules believed to be installed at `now`. Records whose hard timeout elapsed are
    /// dropped on the way.
    pub fn active_rules(&self, now: DateTime<Utc>) -> Vec<FlowRuleRecord> {
        let mut rules = self.rules();
        rules.retain(|_, record| !record.is_expired(now));
        let mut active: Vec<FlowRuleRecord> = rules.values().cloned().collect();
        active.sort_by(|a, b| {
            a.switch
                .cmp(&b.switch)
                .then(b.priority.cmp(&a.priority))
                .then(a.installed_at.cmp(&b.installed_at))
        });
        active
    }

    /// A switch reported that a rule timed out or was evicted.
    pub fn rule_removed(&self, switch: SwitchId, flow_match: &FlowMatch) -> Option<FlowRuleRecord> {
        let removed = self.rules().remove(&(switch, flow_match.clone()));
        if removed.is_some() {
            debug!("Rule removed by {} match=[{}]", switch, flow_match);
        }
        removed
    }

    /// Drops all records of a disconnected switch.
    pub fn forget_switch(&self, switch: SwitchId) -> usize {
        let mut rules = self.rules();
        let before = rules.len();
        rules.retain(|(s, _), _| *s != switch);
        let forgotten = before - rules.len();
        if forgotten > 0 {
            info!("Forgot {} rule(s) of switch {}", forgotten, switch);
        }
        forgotten
    }

    pub fn rule_count(&self) -> usize {
        self.rules().len()
    }
}
