//! Types produced and consumed by the flow feature extractor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::southbound::types::{MacAddr, SwitchId};

pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;
pub const PROTO_ICMPV6: u8 = 58;

pub const TCP_FIN: u8 = 0x01;
pub const TCP_SYN: u8 = 0x02;
pub const TCP_RST: u8 = 0x04;
pub const TCP_PSH: u8 = 0x08;
pub const TCP_ACK: u8 = 0x10;
pub const TCP_URG: u8 = 0x20;
pub const TCP_ECE: u8 = 0x40;
pub const TCP_CWR: u8 = 0x80;

/// A packet punted to the controller by a switch.
#[derive(Debug, Clone)]
pub struct PacketIn {
    pub switch: SwitchId,
    pub in_port: u32,
    /// Switch-side buffer holding the packet, `None` when the full frame was sent
    pub buffer_id: Option<u32>,
    pub data: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

/// Normalized view of one observed packet.
///
/// Built once per packet-in event and never mutated afterwards. Fields that do not apply
/// to the packet's protocol stay at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowFeatures {
    pub switch: SwitchId,
    pub in_port: u32,
    pub eth_src: MacAddr,
    pub eth_dst: MacAddr,
    pub eth_type: u16,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    /// TCP flag bits (FIN = 0x01 .. CWR = 0x80), zero for other protocols
    pub tcp_flags: u8,
    /// Network layer length in bytes, headers included
    pub total_length: u32,
    pub ttl: u8,
    pub observed_at: DateTime<Utc>,
}

impl FlowFeatures {
    pub fn is_tcp(&self) -> bool {
        self.protocol == PROTO_TCP
    }

    pub fn is_syn(&self) -> bool {
        self.is_tcp() && self.tcp_flags & TCP_SYN != 0
    }

    /// Source port if the transport carries ports and one was present.
    pub fn source_port(&self) -> Option<u16> {
        match self.protocol {
            PROTO_TCP | PROTO_UDP if self.src_port != 0 => Some(self.src_port),
            _ => None,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        protocol_name(self.protocol)
    }
}

pub fn protocol_name(protocol: u8) -> &'static str {
    match protocol {
        PROTO_ICMP => "ICMP",
        PROTO_TCP => "TCP",
        PROTO_UDP => "UDP",
        PROTO_ICMPV6 => "ICMPv6",
        _ => "OTHER",
    }
}
