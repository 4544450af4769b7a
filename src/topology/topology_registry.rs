//! Inventory of switches, hosts and links seen by the controller.
//!
//! Readers (enforcement fan-out, the inventory API) only ever get owned copies, so a
//! switch can disappear while somebody iterates over an earlier listing.

use chrono::Utc;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::types::*;
use crate::southbound::types::{MacAddr, SwitchId};

#[derive(Default)]
struct Inventory {
    switches: BTreeMap<SwitchId, Switch>,
    hosts: HashMap<MacAddr, Host>,
    links: Vec<Link>,
    mac_to_port: HashMap<SwitchId, HashMap<MacAddr, u32>>,
}

#[derive(Default)]
pub struct TopologyRegistry {
    inventory: RwLock<Inventory>,
}

impl TopologyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inventory> {
        self.inventory.read().unwrap_or_else(|poisoned| {
            warn!("Topology lock poisoned, continuing with last state");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inventory> {
        self.inventory.write().unwrap_or_else(|poisoned| {
            warn!("Topology lock poisoned, continuing with last state");
            poisoned.into_inner()
        })
    }

    /// Registers a switch after its handshake. Returns `false` if it was already known,
    /// in which case it is marked alive again.
    pub fn add_switch(&self, id: SwitchId) -> bool {
        let mut inventory = self.write();
        if let Some(existing) = inventory.switches.get_mut(&id) {
            existing.alive = true;
            return false;
        }
        inventory.switches.insert(
            id,
            Switch {
                id,
                alive: true,
                connected_at: Utc::now(),
            },
        );
        info!("Switch added: {}", id);
        true
    }

    /// Forgets a switch together with its hosts, links and learned MAC table.
    pub fn remove_switch(&self, id: SwitchId) -> bool {
        let mut inventory = self.write();
        if inventory.switches.remove(&id).is_none() {
            return false;
        }
        inventory.hosts.retain(|_, h| h.switch != id);
        inventory.links.retain(|l| l.src != id && l.dst != id);
        inventory.mac_to_port.remove(&id);
        info!("Switch removed: {}", id);
        true
    }

    pub fn set_liveness(&self, id: SwitchId, alive: bool) {
        let mut inventory = self.write();
        if let Some(switch) = inventory.switches.get_mut(&id) {
            if switch.alive != alive {
                debug!("Switch {} liveness -> {}", id, alive);
            }
            switch.alive = alive;
        }
    }

    /// Records a host observed behind `switch`/`port`, refreshing it if already known.
    pub fn add_host(&self, mac: MacAddr, ip: Option<IpAddr>, switch: SwitchId, port: u32) {
        let mut inventory = self.write();
        if !inventory.switches.contains_key(&switch) {
            debug!("Ignoring host {} on unknown switch {}", mac, switch);
            return;
        }
        let now = Utc::now();
        match inventory.hosts.get_mut(&mac) {
            Some(host) => {
                host.last_seen = now;
                host.switch = switch;
                host.port = port;
                if ip.is_some() {
                    host.ip = ip;
                }
            }
            None => {
                inventory.hosts.insert(
                    mac,
                    Host {
                        mac,
                        ip,
                        switch,
                        port,
                        first_seen: now,
                        last_seen: now,
                    },
                );
                info!(
                    "Host added: {} ({}) on {}:{}",
                    mac,
                    ip.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string()),
                    switch,
                    port
                );
            }
        }
    }

    pub fn add_link(&self, link: Link) {
        let mut inventory = self.write();
        if !inventory.links.contains(&link) {
            inventory.links.push(link);
            info!(
                "Link added: {}:{} <-> {}:{}",
                link.src, link.src_port, link.dst, link.dst_port
            );
        }
    }

    /// Learns that `mac` is reachable through `port` of `switch`.
    pub fn learn(&self, switch: SwitchId, mac: MacAddr, port: u32) {
        let mut inventory = self.write();
        if !inventory.switches.contains_key(&switch) {
            return;
        }
        inventory
            .mac_to_port
            .entry(switch)
            .or_default()
            .insert(mac, port);
    }

    pub fn port_for(&self, switch: SwitchId, mac: MacAddr) -> Option<u32> {
        self.read()
            .mac_to_port
            .get(&switch)
            .and_then(|table| table.get(&mac).copied())
    }

    pub fn contains_switch(&self, id: SwitchId) -> bool {
        self.read().switches.contains_key(&id)
    }

    pub fn list_switches(&self) -> BTreeSet<SwitchId> {
        self.read().switches.keys().copied().collect()
    }

    pub fn switches(&self) -> Vec<Switch> {
        self.read().switches.values().cloned().collect()
    }

    pub fn hosts(&self) -> Vec<Host> {
        self.read().hosts.values().cloned().collect()
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        let inventory = self.read();
        let mut snapshot = TopologySnapshot::default();

        for switch in inventory.switches.values() {
            snapshot.nodes.push(TopologyNode {
                id: switch_node_id(switch.id),
                label: format!("S{}", switch.id.0),
                kind: NodeKind::Switch,
                alive: switch.alive,
            });
        }

        let mut hosts: Vec<&Host> = inventory.hosts.values().collect();
        hosts.sort_by_key(|h| h.mac.0);
        for host in &hosts {
            snapshot.nodes.push(TopologyNode {
                id: host.mac.to_string(),
                label: host
                    .ip
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| host.mac.to_string()),
                kind: NodeKind::Host,
                alive: true,
            });
        }

        for link in &inventory.links {
            snapshot.edges.push(TopologyEdge {
                from: switch_node_id(link.src),
                to: switch_node_id(link.dst),
                label: format!("{}-{}", link.src_port, link.dst_port),
            });
        }
        for host in &hosts {
            snapshot.edges.push(TopologyEdge {
                from: host.mac.to_string(),
                to: switch_node_id(host.switch),
                label: format!("p{}", host.port),
            });
        }

        snapshot
    }

    pub fn statistics(&self) -> TopologyStatistics {
        let inventory = self.read();
        TopologyStatistics {
            switches: inventory.switches.len(),
            hosts: inventory.hosts.len(),
            links: inventory.links.len(),
        }
    }
}
