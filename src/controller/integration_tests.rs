//! End-to-end runs of the control loop over in-process switch queues.

use chrono::{Duration as ChronoDuration, Utc};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_test::assert_ok;

use super::controller_handler::Controller;
use super::types::*;
use crate::classifier::classifier_adapter::ClassifierAdapter;
use crate::configuration::config::Config;
use crate::flow_extraction::extractor::test_frames::*;
use crate::flow_extraction::types::{PacketIn, PROTO_TCP};
use crate::policy_enforcement::types::BlockIdentity;
use crate::southbound::types::{FlowMatch, SouthboundCommand, SwitchId};

const ATTACKER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const VICTIM: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const FIRST_SOURCE_PORT: u16 = 40000;

fn test_config(max_inflight: usize) -> Config {
    let mut config = Config::default();
    config.storage.enabled = false;
    config.controller.max_inflight_events = max_inflight;
    config.controller.stats_interval_secs = 0;
    config
}

async fn connect(events: &Sender<ControllerEvent>, id: u64) -> Receiver<SouthboundCommand> {
    let (tx, rx) = mpsc::channel(128);
    events
        .send(ControllerEvent::SwitchConnected {
            switch: SwitchId(id),
            commands: tx,
        })
        .await
        .unwrap();
    rx
}

fn drain(rx: &mut Receiver<SouthboundCommand>) -> Vec<SouthboundCommand> {
    let mut commands = Vec::new();
    while let Ok(command) = rx.try_recv() {
        commands.push(command);
    }
    commands
}

fn drop_rules(commands: &[SouthboundCommand]) -> Vec<SouthboundCommand> {
    commands
        .iter()
        .filter(|c| {
            matches!(c, SouthboundCommand::InstallRule { actions, priority, .. }
                if actions.is_empty() && *priority > 0)
        })
        .cloned()
        .collect()
}

/// 10.0.0.1 sends SYNs to ports 1..=15 over ten seconds, each from a fresh source port.
fn scan_packets() -> Vec<PacketIn> {
    let start = Utc::now();
    (1..=15u16)
        .map(|port| PacketIn {
            switch: SwitchId(1),
            in_port: 1,
            buffer_id: None,
            data: tcp_frame(ATTACKER, VICTIM, FIRST_SOURCE_PORT + port, port, true),
            received_at: start + ChronoDuration::milliseconds(i64::from(port - 1) * 10_000 / 15),
        })
        .collect()
}

#[tokio::test]
async fn test_port_scan_is_blocked_on_every_switch() {
    let controller = Arc::new(Controller::new(
        test_config(1),
        ClassifierAdapter::disabled(),
        None,
    ));
    let (events, rx) = mpsc::channel(64);
    let handle = tokio::spawn(controller.clone().run(rx));

    let mut queues = Vec::new();
    for id in 1..=3 {
        queues.push(connect(&events, id).await);
    }
    for packet in scan_packets() {
        events.send(ControllerEvent::PacketIn(packet)).await.unwrap();
    }
    drop(events);
    assert_ok!(handle.await);

    let expected = SouthboundCommand::InstallRule {
        priority: 100,
        flow_match: FlowMatch::from_source(IpAddr::V4(ATTACKER)).with_protocol(PROTO_TCP),
        actions: Vec::new(),
        idle_timeout: 0,
        hard_timeout: 60,
    };
    for queue in queues.iter_mut() {
        let commands = drain(queue);
        assert_eq!(drop_rules(&commands), vec![expected.clone()]);
    }

    let blocked = controller.enforcer().blocked_identities(Utc::now());
    assert_eq!(blocked.len(), 1);
    assert_eq!(
        blocked[0].identity,
        BlockIdentity::Protocol {
            addr: IpAddr::V4(ATTACKER),
            protocol: PROTO_TCP,
        }
    );
    assert_eq!(blocked[0].switches.len(), 3);
    assert_eq!(
        blocked[0].expires_at - blocked[0].created_at,
        ChronoDuration::seconds(60)
    );
}

#[tokio::test]
async fn test_block_skips_disconnected_switch() {
    let controller = Arc::new(Controller::new(
        test_config(1),
        ClassifierAdapter::disabled(),
        None,
    ));
    let (events, rx) = mpsc::channel(64);
    let handle = tokio::spawn(controller.clone().run(rx));

    let mut first = connect(&events, 1).await;
    let second = connect(&events, 2).await;
    drop(second);
    events
        .send(ControllerEvent::SwitchDisconnected(SwitchId(2)))
        .await
        .unwrap();
    for packet in scan_packets() {
        events.send(ControllerEvent::PacketIn(packet)).await.unwrap();
    }
    drop(events);
    assert_ok!(handle.await);

    assert_eq!(drop_rules(&drain(&mut first)).len(), 1);
    let blocked = controller.enforcer().blocked_identities(Utc::now());
    assert_eq!(
        blocked[0].switches,
        [SwitchId(1)].into_iter().collect()
    );
}

#[tokio::test]
async fn test_many_sources_processed_concurrently() {
    let controller = Arc::new(Controller::new(
        test_config(16),
        ClassifierAdapter::disabled(),
        None,
    ));
    let (events, rx) = mpsc::channel(256);
    let handle = tokio::spawn(controller.clone().run(rx));
    let mut queue = connect(&events, 1).await;

    let now = Utc::now();
    for host in 1..=100u8 {
        let packet = PacketIn {
            switch: SwitchId(1),
            in_port: 1,
            buffer_id: None,
            data: udp_frame(Ipv4Addr::new(10, 1, 0, host), VICTIM, 5000, 53),
            received_at: now,
        };
        events.send(ControllerEvent::PacketIn(packet)).await.unwrap();
    }
    drop(events);
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(controller.engine().tracked_sources(), 100);
    assert!(controller.enforcer().blocked_identities(now).is_empty());
    let packet_outs = drain(&mut queue)
        .into_iter()
        .filter(|c| matches!(c, SouthboundCommand::PacketOut { .. }))
        .count();
    assert_eq!(packet_outs, 100);
}

#[tokio::test]
async fn test_flow_removed_updates_registry() {
    let controller = Arc::new(Controller::new(
        test_config(1),
        ClassifierAdapter::disabled(),
        None,
    ));
    let (events, rx) = mpsc::channel(8);
    let handle = tokio::spawn(controller.clone().run(rx));
    let _queue = connect(&events, 1).await;
    events
        .send(ControllerEvent::FlowRemoved {
            switch: SwitchId(1),
            flow_match: FlowMatch::any(),
        })
        .await
        .unwrap();
    drop(events);
    assert_ok!(handle.await);

    assert!(controller.flows().active_rules(Utc::now()).is_empty());
}
