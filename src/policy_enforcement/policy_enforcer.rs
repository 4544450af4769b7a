//! # Policy Enforcer
//!
//! Turns threat verdicts into drop rules on every known switch and remembers what it
//! blocked, so a repeated verdict for the same identity does not install the rule again.
//!
//! The block table sits behind a single mutex that is held for the whole
//! check → fan-out → record sequence. Southbound sends never wait on a switch, so the
//! critical section stays short, and two verdicts for one identity can never both
//! install.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use super::types::*;
use crate::configuration::config::Config;
use crate::detection::types::Verdict;
use crate::flow_extraction::types::FlowFeatures;
use crate::flow_management::flow_manager::FlowManager;
use crate::topology::topology_registry::TopologyRegistry;

#[derive(Debug, Clone, PartialEq)]
pub struct EnforcementSettings {
    pub block_priority: u16,
    pub flow_block_timeout_secs: u16,
    pub address_block_timeout_secs: u16,
}

impl EnforcementSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            block_priority: config.enforcement.block_priority,
            flow_block_timeout_secs: config.enforcement.flow_block_timeout_secs,
            address_block_timeout_secs: config.enforcement.address_block_timeout_secs,
        }
    }

    fn timeout_for(&self, identity: &BlockIdentity) -> u16 {
        if identity.is_flow() {
            self.flow_block_timeout_secs
        } else {
            self.address_block_timeout_secs
        }
    }
}

impl Default for EnforcementSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct PolicyEnforcer {
    settings: EnforcementSettings,
    flows: Arc<FlowManager>,
    topology: Arc<TopologyRegistry>,
    blocks: Mutex<HashMap<BlockIdentity, BlockEntry>>,
}

impl PolicyEnforcer {
    pub fn new(
        settings: EnforcementSettings,
        flows: Arc<FlowManager>,
        topology: Arc<TopologyRegistry>,
    ) -> Self {
        Self {
            settings,
            flows,
            topology,
            blocks: Mutex::new(HashMap::new()),
        }
    }

    fn blocks(&self) -> MutexGuard<'_, HashMap<BlockIdentity, BlockEntry>> {
        self.blocks.lock().unwrap_or_else(|poisoned| {
            warn!("Block table poisoned, continuing with last state");
            poisoned.into_inner()
        })
    }

    pub fn enforce(&self, verdict: &Verdict, features: &FlowFeatures) -> EnforcementOutcome {
        self.enforce_at(verdict, features, Utc::now())
    }

    pub fn enforce_at(
        &self,
        verdict: &Verdict,
        features: &FlowFeatures,
        now: DateTime<Utc>,
    ) -> EnforcementOutcome {
        if !verdict.threat {
            return EnforcementOutcome::Allowed;
        }
        let identity = BlockIdentity::for_verdict(verdict, features);
        self.block(identity, &verdict.threat_type(), verdict.severity, now)
    }

    /// Address-level block, used for alerts coming from an external IDS.
    pub fn block_address(&self, addr: IpAddr, reason: &str, severity: u8) -> EnforcementOutcome {
        self.block_address_at(addr, reason, severity, Utc::now())
    }

    pub fn block_address_at(
        &self,
        addr: IpAddr,
        reason: &str,
        severity: u8,
        now: DateTime<Utc>,
    ) -> EnforcementOutcome {
        self.block(BlockIdentity::Address(addr), reason, severity, now)
    }

    fn block(
        &self,
        identity: BlockIdentity,
        reason: &str,
        severity: u8,
        now: DateTime<Utc>,
    ) -> EnforcementOutcome {
        let mut blocks = self.blocks();

        if live_entry(&mut blocks, &identity, now).is_some() {
            debug!("{} already blocked", identity);
            return EnforcementOutcome::AlreadyBlocked;
        }

        let timeout = self.settings.timeout_for(&identity);
        let flow_match = identity.flow_match();
        let mut installed = BTreeSet::new();
        let mut failed = 0;

        for switch in self.topology.list_switches() {
            match self.flows.install(
                switch,
                self.settings.block_priority,
                flow_match.clone(),
                Vec::new(),
                0,
                timeout,
            ) {
                Ok(_) => {
                    installed.insert(switch);
                }
                Err(e) => {
                    warn!("Drop rule for {} not installed on {}: {}", identity, switch, e);
                    self.topology.set_liveness(switch, false);
                    failed += 1;
                }
            }
        }

        if installed.is_empty() {
            warn!("No switch accepted the drop rule for {}", identity);
            return EnforcementOutcome::NotInstalled(identity);
        }

        let count = installed.len();
        blocks.insert(
            identity,
            BlockEntry {
                identity,
                reason: reason.to_string(),
                severity,
                created_at: now,
                expires_at: now + Duration::seconds(i64::from(timeout)),
                switches: installed,
            },
        );
        info!(
            "Blocked {} on {} switch(es) for {}s ({}, severity {})",
            identity, count, timeout, reason, severity
        );

        EnforcementOutcome::Blocked {
            identity,
            installed: count,
            failed,
        }
    }

    /// Removes the drop rule from every switch that accepted it. Returns `false` when
    /// no live entry exists.
    pub fn unblock(&self, identity: &BlockIdentity) -> bool {
        self.unblock_at(identity, Utc::now())
    }

    pub fn unblock_at(&self, identity: &BlockIdentity, now: DateTime<Utc>) -> bool {
        let mut blocks = self.blocks();
        let Some(entry) = live_entry(&mut blocks, identity, now).cloned() else {
            return false;
        };

        let flow_match = identity.flow_match();
        for switch in &entry.switches {
            if let Err(e) = self.flows.delete(*switch, &flow_match) {
                warn!("Drop rule for {} not removed from {}: {}", identity, switch, e);
            }
        }
        blocks.remove(identity);
        info!("Unblocked {}", identity);
        true
    }

    pub fn is_blocked(&self, identity: &BlockIdentity, now: DateTime<Utc>) -> bool {
        live_entry(&mut self.blocks(), identity, now).is_some()
    }

    pub fn blocked_identities(&self, now: DateTime<Utc>) -> Vec<BlockEntry> {
        let mut entries: Vec<BlockEntry> = self
            .blocks()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.created_at);
        entries
    }

    /// Drops every entry whose rules have timed out on the switches.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut blocks = self.blocks();
        let before = blocks.len();
        blocks.retain(|_, entry| !entry.is_expired(now));
        let purged = before - blocks.len();
        if purged > 0 {
            debug!("Purged {} expired block(s)", purged);
        }
        purged
    }
}

/// Looks up `identity`, removing the entry first if it already expired.
fn live_entry<'a>(
    blocks: &'a mut HashMap<BlockIdentity, BlockEntry>,
    identity: &BlockIdentity,
    now: DateTime<Utc>,
) -> Option<&'a BlockEntry> {
    if blocks
        .get(identity)
        .map(|entry| entry.is_expired(now))
        .unwrap_or(false)
    {
        debug!("Block for {} expired", identity);
        blocks.remove(identity);
    }
    blocks.get(identity)
}

/// Whether an external alert of `severity` warrants an address block.
pub fn alert_warrants_block(severity: u8, max_severity: u8) -> bool {
    severity <= max_severity
}
