use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use crate::detection::types::{Signal, Verdict};
use crate::flow_extraction::types::{protocol_name, FlowFeatures};
use crate::southbound::types::{FlowMatch, SwitchId};

/// What a drop rule keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "lowercase")]
pub enum BlockIdentity {
    Address(IpAddr),
    /// Every source port of one protocol
    Protocol { addr: IpAddr, protocol: u8 },
    Flow {
        addr: IpAddr,
        src_port: u16,
        protocol: u8,
    },
}

impl BlockIdentity {
    /// Scan and flood verdicts describe the source rather than one connection, so they key
    /// on `(source, protocol)` with the source port left wildcarded. Any other verdict uses
    /// [`BlockIdentity::for_features`].
    pub fn for_verdict(verdict: &Verdict, features: &FlowFeatures) -> Self {
        if verdict.has(&Signal::PortScan) || verdict.has(&Signal::SynFlood) {
            return BlockIdentity::Protocol {
                addr: features.src_ip,
                protocol: features.protocol,
            };
        }
        Self::for_features(features)
    }

    /// Flow identity when the packet has a usable source port, address identity otherwise.
    pub fn for_features(features: &FlowFeatures) -> Self {
        match features.source_port() {
            Some(src_port) => BlockIdentity::Flow {
                addr: features.src_ip,
                src_port,
                protocol: features.protocol,
            },
            None => BlockIdentity::Address(features.src_ip),
        }
    }

    pub fn address(&self) -> IpAddr {
        match self {
            BlockIdentity::Address(addr) => *addr,
            BlockIdentity::Protocol { addr, .. } => *addr,
            BlockIdentity::Flow { addr, .. } => *addr,
        }
    }

    /// Flow-level identities get the short block timeout.
    pub fn is_flow(&self) -> bool {
        !matches!(self, BlockIdentity::Address(_))
    }

    pub fn flow_match(&self) -> FlowMatch {
        match self {
            BlockIdentity::Address(addr) => FlowMatch::from_source(*addr),
            BlockIdentity::Protocol { addr, protocol } => {
                FlowMatch::from_source(*addr).with_protocol(*protocol)
            }
            BlockIdentity::Flow {
                addr,
                src_port,
                protocol,
            } => FlowMatch::from_source(*addr)
                .with_protocol(*protocol)
                .with_l4_src(*src_port),
        }
    }
}

impl fmt::Display for BlockIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockIdentity::Address(addr) => write!(f, "{}", addr),
            BlockIdentity::Protocol { addr, protocol } => {
                write!(f, "{}/{}", addr, protocol_name(*protocol))
            }
            BlockIdentity::Flow {
                addr,
                src_port,
                protocol,
            } => write!(f, "{}:{}/{}", addr, src_port, protocol_name(*protocol)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub identity: BlockIdentity,
    pub reason: String,
    pub severity: u8,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Switches that accepted the drop rule
    pub switches: BTreeSet<SwitchId>,
}

impl BlockEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnforcementOutcome {
    /// The verdict was benign
    Allowed,
    /// A live entry already covers this identity
    AlreadyBlocked,
    Blocked {
        identity: BlockIdentity,
        installed: usize,
        failed: usize,
    },
    /// No switch accepted the rule, nothing was recorded
    NotInstalled(BlockIdentity),
}

impl EnforcementOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            EnforcementOutcome::Blocked { .. } | EnforcementOutcome::AlreadyBlocked
        )
    }
}
