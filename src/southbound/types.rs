//! Protocol-neutral shapes of the commands the controller sends to switches.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

pub const ETH_TYPE_IPV4: u16 = 0x0800;
pub const ETH_TYPE_IPV6: u16 = 0x86dd;

/// Datapath identifier of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SwitchId(pub u64);

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Rule match. Every field is optional, an absent field is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowMatch {
    pub in_port: Option<u32>,
    pub eth_src: Option<MacAddr>,
    pub eth_dst: Option<MacAddr>,
    pub eth_type: Option<u16>,
    pub ip_src: Option<IpAddr>,
    pub ip_dst: Option<IpAddr>,
    pub ip_proto: Option<u8>,
    /// Transport source port, interpreted per `ip_proto` (tcp_src / udp_src)
    pub l4_src: Option<u16>,
    pub l4_dst: Option<u16>,
    pub tcp_flags: Option<u8>,
}

impl FlowMatch {
    /// The wildcard match, used for the table-miss rule.
    pub fn any() -> Self {
        Self::default()
    }

    /// Match on a source address only. The ethertype follows the address family.
    pub fn from_source(addr: IpAddr) -> Self {
        Self {
            eth_type: Some(eth_type_for(&addr)),
            ip_src: Some(addr),
            ..Self::default()
        }
    }

    pub fn with_protocol(mut self, protocol: u8) -> Self {
        self.ip_proto = Some(protocol);
        self
    }

    pub fn with_l4_src(mut self, port: u16) -> Self {
        self.l4_src = Some(port);
        self
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            return write!(f, "*");
        }
        let mut parts: Vec<String> = Vec::new();
        if let Some(p) = self.in_port {
            parts.push(format!("in_port={}", p));
        }
        if let Some(m) = self.eth_src {
            parts.push(format!("eth_src={}", m));
        }
        if let Some(m) = self.eth_dst {
            parts.push(format!("eth_dst={}", m));
        }
        if let Some(t) = self.eth_type {
            parts.push(format!("eth_type={:#06x}", t));
        }
        if let Some(a) = self.ip_src {
            parts.push(format!("ip_src={}", a));
        }
        if let Some(a) = self.ip_dst {
            parts.push(format!("ip_dst={}", a));
        }
        if let Some(p) = self.ip_proto {
            parts.push(format!("ip_proto={}", p));
        }
        if let Some(p) = self.l4_src {
            parts.push(format!("l4_src={}", p));
        }
        if let Some(p) = self.l4_dst {
            parts.push(format!("l4_dst={}", p));
        }
        if let Some(t) = self.tcp_flags {
            parts.push(format!("tcp_flags={:#04x}", t));
        }
        write!(f, "{}", parts.join(","))
    }
}

pub fn eth_type_for(addr: &IpAddr) -> u16 {
    match addr {
        IpAddr::V4(_) => ETH_TYPE_IPV4,
        IpAddr::V6(_) => ETH_TYPE_IPV6,
    }
}

/// Port targets of an output action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputPort {
    Physical(u32),
    Flood,
    Controller,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowAction {
    Output(OutputPort),
}

/// A command for one switch. Drop rules carry an empty action list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SouthboundCommand {
    InstallRule {
        priority: u16,
        flow_match: FlowMatch,
        actions: Vec<FlowAction>,
        idle_timeout: u16,
        hard_timeout: u16,
    },
    DeleteRule {
        flow_match: FlowMatch,
    },
    StatsRequest,
    PacketOut {
        in_port: u32,
        buffer_id: Option<u32>,
        actions: Vec<FlowAction>,
        data: Vec<u8>,
    },
}

impl SouthboundCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            SouthboundCommand::InstallRule { .. } => "install-rule",
            SouthboundCommand::DeleteRule { .. } => "delete-rule",
            SouthboundCommand::StatsRequest => "stats-request",
            SouthboundCommand::PacketOut { .. } => "packet-out",
        }
    }
}
