//! # Controller
//!
//! Owns one instance of every component and drives them from a stream of
//! [`ControllerEvent`]s.
//!
//! ```text
//!  switch sessions ─┐
//!                   ├─▶ ControllerEvent ─▶ Controller ─┬─▶ packet-in tasks (bounded)
//!  EveMonitor ──────┘        (mpsc)                    │     extract ▶ detect ▶ enforce / forward
//!                                                      ├─▶ topology / transport bookkeeping
//!                                                      └─▶ maintenance + stats ticks
//! ```
//!
//! Packet-ins are the only events handled off the loop. Each one runs in its own task,
//! and at most `max_inflight_events` of them exist at a time; when the limit is reached the
//! loop stops pulling events until a task finishes. A panicking task is logged and the loop
//! carries on.

use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use super::types::*;
use crate::alert_ingestion::eve_monitor::EveMonitor;
use crate::alert_ingestion::types::ExternalAlert;
use crate::classifier::classifier_adapter::ClassifierAdapter;
use crate::classifier::linear_model::LinearModel;
use crate::configuration::config::Config;
use crate::configuration::types::ClassifierConfig;
use crate::detection::detection_engine::{DetectionEngine, DetectionSettings};
use crate::error_handling::types::*;
use crate::flow_extraction::extractor::{ethernet_addresses, extract};
use crate::flow_extraction::types::PacketIn;
use crate::flow_management::flow_manager::FlowManager;
use crate::policy_enforcement::policy_enforcer::{
    alert_warrants_block, EnforcementSettings, PolicyEnforcer,
};
use crate::policy_enforcement::types::EnforcementOutcome;
use crate::southbound::transport::ChannelTransport;
use crate::southbound::types::{FlowAction, FlowMatch, MacAddr, OutputPort, SouthboundCommand, SwitchId};
use crate::storage::file_storage::FileAlertStore;
use crate::storage::storage_trait::AlertStore;
use crate::storage::types::AlertRecord;
use crate::topology::topology_registry::TopologyRegistry;
use crate::web_interface::web_server::ApiState;

pub struct Controller {
    config: Config,
    transport: Arc<ChannelTransport>,
    topology: Arc<TopologyRegistry>,
    flows: Arc<FlowManager>,
    engine: Arc<DetectionEngine>,
    enforcer: Arc<PolicyEnforcer>,
    alerts: Option<Arc<dyn AlertStore>>,
}

impl Controller {
    /// Wires the components together around an already built classifier and alert store.
    pub fn new(
        config: Config,
        classifier: ClassifierAdapter,
        alerts: Option<Arc<dyn AlertStore>>,
    ) -> Self {
        let transport = Arc::new(ChannelTransport::new());
        let topology = Arc::new(TopologyRegistry::new());
        let flows = Arc::new(FlowManager::new(transport.clone()));
        let engine = Arc::new(DetectionEngine::new(
            DetectionSettings::from_config(&config),
            classifier,
        ));
        let enforcer = Arc::new(PolicyEnforcer::new(
            EnforcementSettings::from_config(&config),
            flows.clone(),
            topology.clone(),
        ));

        Self {
            config,
            transport,
            topology,
            flows,
            engine,
            enforcer,
            alerts,
        }
    }

    /// Builds a controller from configuration: classifier model and alert store included.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::ConfigurationError`] if the configuration is out of range
    /// - [`ControllerError::ClassifierError`] if a configured model cannot be loaded
    /// - [`ControllerError::StorageError`] if the alert file cannot be opened
    pub fn from_config(config: Config) -> Result<Self, ControllerError> {
        config.validate()?;
        let classifier = build_classifier(&config.classifier)?;
        let alerts: Option<Arc<dyn AlertStore>> = if config.storage.enabled {
            Some(Arc::new(FileAlertStore::new(&config.storage.alerts_path)?))
        } else {
            info!("Alert storage disabled");
            None
        };
        Ok(Self::new(config, classifier, alerts))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn topology(&self) -> &Arc<TopologyRegistry> {
        &self.topology
    }

    pub fn flows(&self) -> &Arc<FlowManager> {
        &self.flows
    }

    pub fn engine(&self) -> &Arc<DetectionEngine> {
        &self.engine
    }

    pub fn enforcer(&self) -> &Arc<PolicyEnforcer> {
        &self.enforcer
    }

    /// Shared read-only handles for the inventory API.
    pub fn api_state(&self) -> ApiState {
        ApiState {
            topology: self.topology.clone(),
            flows: self.flows.clone(),
            enforcer: self.enforcer.clone(),
            engine: self.engine.clone(),
            alerts: self.alerts.clone(),
        }
    }

    /// Consumes events until every sender is dropped, then waits for in-flight packet tasks.
    pub async fn run(self: Arc<Self>, mut events: Receiver<ControllerEvent>) {
        let limit = self.config.controller.max_inflight_events;
        let permits = Arc::new(Semaphore::new(limit));
        let mut tasks: JoinSet<()> = JoinSet::new();

        let mut maintenance = tokio::time::interval(Duration::from_secs(
            self.config.controller.maintenance_interval_secs,
        ));
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let stats_secs = self.config.controller.stats_interval_secs;
        let mut stats = tokio::time::interval(Duration::from_secs(stats_secs.max(1)));
        stats.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Controller running, {} concurrent packet-in task(s)", limit);
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ControllerEvent::PacketIn(packet)) => {
                        let permit = match permits.clone().acquire_owned().await {
                            Ok(p) => p,
                            Err(e) => {
                                error!("Packet-in limiter closed: {}", e);
                                break;
                            }
                        };
                        let controller = self.clone();
                        tasks.spawn(async move {
                            let _permit = permit;
                            controller.handle_packet_in(packet).await;
                        });
                    }
                    Some(event) => self.handle_event(event).await,
                    None => {
                        info!("Event stream closed, stopping controller");
                        break;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    reap(joined);
                }
                _ = maintenance.tick() => self.maintain(Utc::now()),
                _ = stats.tick(), if stats_secs > 0 => self.poll_stats(),
            }
        }

        while let Some(joined) = tasks.join_next().await {
            reap(joined);
        }
        info!("Controller stopped");
    }

    /// Handles every event except packet-ins, which [`Controller::run`] spawns.
    pub async fn handle_event(&self, event: ControllerEvent) {
        trace!("Event: {}", event.kind());
        match event {
            ControllerEvent::SwitchConnected { switch, commands } => {
                self.switch_connected(switch, commands)
            }
            ControllerEvent::SwitchDisconnected(switch) => self.switch_disconnected(switch),
            ControllerEvent::PacketIn(packet) => {
                self.handle_packet_in(packet).await;
            }
            ControllerEvent::FlowRemoved { switch, flow_match } => {
                self.flows.rule_removed(switch, &flow_match);
            }
            ControllerEvent::LinkDiscovered(link) => self.topology.add_link(link),
            ControllerEvent::ExternalAlert(alert) => {
                self.handle_external_alert(alert).await;
            }
        }
    }

    pub fn switch_connected(&self, switch: SwitchId, commands: Sender<SouthboundCommand>) {
        self.transport.attach_sender(switch, commands);
        self.topology.add_switch(switch);

        let table_miss = vec![FlowAction::Output(OutputPort::Controller)];
        match self
            .flows
            .install(switch, TABLE_MISS_PRIORITY, FlowMatch::any(), table_miss, 0, 0)
        {
            Ok(_) => info!("Switch {} connected, table-miss rule installed", switch),
            Err(e) => {
                warn!("Switch {} connected but table-miss install failed: {}", switch, e);
                self.topology.set_liveness(switch, false);
            }
        }
    }

    pub fn switch_disconnected(&self, switch: SwitchId) {
        self.transport.detach(switch);
        if self.topology.remove_switch(switch) {
            self.flows.forget_switch(switch);
            warn!("Switch {} disconnected", switch);
        }
    }

    /// Analyzes one packet-in and either blocks its source or forwards it.
    pub async fn handle_packet_in(&self, packet: PacketIn) -> PacketDisposition {
        if !self.topology.contains_switch(packet.switch) {
            debug!("Packet-in from unknown switch {}", packet.switch);
            return PacketDisposition::Ignored;
        }

        let features = match extract(&packet) {
            Ok(features) => features,
            Err(e) => {
                trace!("{} on {}:{}", e, packet.switch, packet.in_port);
                if !self.config.controller.forward_unparsed {
                    return PacketDisposition::Ignored;
                }
                return match ethernet_addresses(&packet.data) {
                    Some((src, dst)) => self.forward(&packet, src, dst),
                    None => PacketDisposition::Ignored,
                };
            }
        };

        if !features.eth_src.is_multicast() {
            self.topology.add_host(
                features.eth_src,
                Some(features.src_ip),
                packet.switch,
                packet.in_port,
            );
        }

        let verdict = self.engine.evaluate(&features).await;
        if verdict.threat {
            warn!(
                "Threat detected: {} from {} (severity {})",
                verdict.threat_type(),
                features.src_ip,
                verdict.severity
            );
            let outcome = self.enforcer.enforce(&verdict, &features);
            self.record_alert(AlertRecord::from_verdict(
                &verdict,
                &features,
                outcome.is_blocked(),
            ))
            .await;
            return PacketDisposition::Blocked(outcome);
        }

        self.forward(&packet, features.eth_src, features.eth_dst)
    }

    /// L2 learning switch: learn the source port, then send towards the known port of
    /// the destination or flood. A known destination also gets a forwarding rule.
    fn forward(&self, packet: &PacketIn, src: MacAddr, dst: MacAddr) -> PacketDisposition {
        self.topology.learn(packet.switch, src, packet.in_port);

        let out_port = match self.topology.port_for(packet.switch, dst) {
            Some(port) if !dst.is_multicast() => OutputPort::Physical(port),
            _ => OutputPort::Flood,
        };
        let actions = vec![FlowAction::Output(out_port)];

        if let OutputPort::Physical(_) = out_port {
            let flow_match = FlowMatch {
                in_port: Some(packet.in_port),
                eth_src: Some(src),
                eth_dst: Some(dst),
                ..FlowMatch::default()
            };
            if let Err(e) = self.flows.install(
                packet.switch,
                FORWARD_PRIORITY,
                flow_match,
                actions.clone(),
                FORWARD_IDLE_TIMEOUT,
                FORWARD_HARD_TIMEOUT,
            ) {
                warn!("Forwarding rule not installed: {}", e);
            }
        }

        if let Err(e) = self.flows.packet_out(
            packet.switch,
            packet.in_port,
            packet.buffer_id,
            actions,
            &packet.data,
        ) {
            warn!("Packet-out failed: {}", e);
        }

        PacketDisposition::Forwarded(out_port)
    }

    /// Blocks the alert's source address when the alert is severe enough, then stores it.
    pub async fn handle_external_alert(&self, alert: ExternalAlert) -> Option<EnforcementOutcome> {
        warn!(
            "Suricata alert: {} ({}, severity {})",
            alert.signature, alert.category, alert.severity
        );

        let max_severity = self.config.enforcement.alert_block_max_severity;
        let outcome = match alert.source_ip {
            Some(addr) if alert_warrants_block(alert.severity, max_severity) => Some(
                self.enforcer
                    .block_address(addr, &alert.signature, alert.severity),
            ),
            _ => None,
        };

        let blocked = outcome.as_ref().map(|o| o.is_blocked()).unwrap_or(false);
        self.record_alert(AlertRecord::from_external(&alert, blocked))
            .await;
        outcome
    }

    async fn record_alert(&self, record: AlertRecord) {
        let Some(store) = self.alerts.clone() else {
            return;
        };
        let id = record.id;
        let write = tokio::task::spawn_blocking(move || store.insert_alert(&record));
        match tokio::time::timeout(ALERT_WRITE_TIMEOUT, write).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!("Alert {} not stored: {}", id, e),
            Ok(Err(e)) => error!("Alert store task failed: {}", e),
            Err(_) => warn!(
                "Alert {} still queued for storage after {:?}, not waiting",
                id, ALERT_WRITE_TIMEOUT
            ),
        }
    }

    /// Periodic cleanup: stale source windows, expired blocks, timed-out rule records.
    pub fn maintain(&self, now: DateTime<Utc>) {
        let windows = self.engine.sweep(now);
        let blocks = self.enforcer.purge_expired(now);
        let rules = self.flows.active_rules(now).len();
        debug!(
            "Maintenance: {} window(s) evicted, {} block(s) expired, {} rule(s) active, {} source(s) tracked",
            windows,
            blocks,
            rules,
            self.engine.tracked_sources()
        );
    }

    pub fn poll_stats(&self) {
        for switch in self.topology.list_switches() {
            match self.flows.request_stats(switch) {
                Ok(()) => self.topology.set_liveness(switch, true),
                Err(e) => {
                    debug!("Stats request to {} failed: {}", switch, e);
                    self.topology.set_liveness(switch, false);
                }
            }
        }
    }

    /// Starts tailing the Suricata log if enabled, forwarding alerts into `events`.
    pub fn spawn_alert_ingestion(&self, events: Sender<ControllerEvent>) -> Option<JoinHandle<()>> {
        if !self.config.suricata.enabled {
            return None;
        }
        let monitor = EveMonitor::from_config(&self.config.suricata);
        let (tx, mut rx) = mpsc::channel::<ExternalAlert>(64);

        Some(tokio::spawn(async move {
            let path = monitor.path().display().to_string();
            let tail = tokio::spawn(monitor.run(tx));
            while let Some(alert) = rx.recv().await {
                if events.send(ControllerEvent::ExternalAlert(alert)).await.is_err() {
                    debug!("Controller gone, stopping alert forwarding");
                    break;
                }
            }
            match tail.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Suricata monitor on {} stopped: {}", path, e),
                Err(e) => error!("Suricata monitor task failed: {}", e),
            }
        }))
    }
}

fn reap(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Packet-in task panicked: {}", e);
        } else {
            debug!("Packet-in task cancelled: {}", e);
        }
    }
}

/// The configured model, or a disabled adapter when classification is off or no model is set.
pub fn build_classifier(config: &ClassifierConfig) -> Result<ClassifierAdapter, ClassifierError> {
    if !config.enabled {
        info!("Classifier disabled by configuration");
        return Ok(ClassifierAdapter::disabled());
    }
    match &config.model_path {
        Some(path) => {
            let model = LinearModel::from_file(path)?;
            Ok(ClassifierAdapter::new(
                Arc::new(model),
                Duration::from_millis(config.budget_ms),
            )
            .with_max_concurrent(config.max_concurrent))
        }
        None => {
            info!("No classifier model configured, classifier signal will abstain");
            Ok(ClassifierAdapter::disabled())
        }
    }
}
