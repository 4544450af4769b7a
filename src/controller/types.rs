use std::time::Duration;
use tokio::sync::mpsc::Sender;

use crate::alert_ingestion::types::ExternalAlert;
use crate::flow_extraction::types::PacketIn;
use crate::policy_enforcement::types::EnforcementOutcome;
use crate::southbound::types::{FlowMatch, OutputPort, SouthboundCommand, SwitchId};
use crate::topology::types::Link;

/// Learned-path forwarding rules sit just above the table-miss rule.
pub const FORWARD_PRIORITY: u16 = 1;
pub const FORWARD_IDLE_TIMEOUT: u16 = 60;
pub const FORWARD_HARD_TIMEOUT: u16 = 300;
pub const TABLE_MISS_PRIORITY: u16 = 0;

/// Longest a packet task waits for its alert to reach the store.
pub const ALERT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything the control loop reacts to.
#[derive(Debug)]
pub enum ControllerEvent {
    /// Handshake finished. `commands` is the queue the switch session drains.
    SwitchConnected {
        switch: SwitchId,
        commands: Sender<SouthboundCommand>,
    },
    SwitchDisconnected(SwitchId),
    PacketIn(PacketIn),
    /// The switch evicted or timed out a rule
    FlowRemoved {
        switch: SwitchId,
        flow_match: FlowMatch,
    },
    LinkDiscovered(Link),
    ExternalAlert(ExternalAlert),
}

impl ControllerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ControllerEvent::SwitchConnected { .. } => "switch-connected",
            ControllerEvent::SwitchDisconnected(_) => "switch-disconnected",
            ControllerEvent::PacketIn(_) => "packet-in",
            ControllerEvent::FlowRemoved { .. } => "flow-removed",
            ControllerEvent::LinkDiscovered(_) => "link-discovered",
            ControllerEvent::ExternalAlert(_) => "external-alert",
        }
    }
}

/// What happened to one packet-in.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketDisposition {
    /// Threat: the packet is not forwarded
    Blocked(EnforcementOutcome),
    Forwarded(OutputPort),
    /// Unknown switch, or a frame that could not be parsed at all
    Ignored,
}
