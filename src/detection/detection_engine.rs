//! # Detection Engine
//!
//! Stateful threat detection over the stream of [`FlowFeatures`]. Each packet runs through
//! four signals in a fixed order:
//!
//! 1. **Port scan**: distinct destination ports per minute for the source
//! 2. **SYN flood**: TCP SYN packets per minute for the source
//! 3. **Suspicious port**: destination port on the deny-list
//! 4. **Classifier**: non-benign prediction above the confidence threshold
//!
//! Per-source state lives in a sharded concurrent map. All updates for one source happen
//! while holding that source's entry, so concurrent packets from the same address never
//! race, while different sources proceed in parallel. The entry is released before the
//! classifier is awaited.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use super::source_window::SourceWindow;
use super::types::*;
use crate::classifier::classifier_adapter::ClassifierAdapter;
use crate::classifier::types::{ClassifierOutcome, FeatureVector};
use crate::configuration::config::Config;
use crate::flow_extraction::types::{FlowFeatures, PROTO_TCP, PROTO_UDP};

/// Thresholds the engine evaluates against.
#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub scan_threshold_per_min: f64,
    pub syn_threshold_per_min: f64,
    pub window_retention_secs: u64,
    pub suspicious_ports: HashSet<u16>,
    pub confidence_threshold: f64,
    pub class_severity: HashMap<String, u8>,
}

impl DetectionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scan_threshold_per_min: config.detection.scan_threshold_per_min,
            syn_threshold_per_min: config.detection.syn_threshold_per_min,
            window_retention_secs: config.detection.window_retention_secs,
            suspicious_ports: config.detection.suspicious_ports.iter().copied().collect(),
            confidence_threshold: config.classifier.confidence_threshold,
            class_severity: config.classifier.class_severity.clone(),
        }
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What the stateful signals saw for one packet, copied out of the window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowObservation {
    pub port_rate_per_min: f64,
    pub syn_rate_per_min: f64,
    pub scan: bool,
    pub flood: bool,
    pub packet_count: u64,
    pub byte_count: u64,
    pub duration_secs: f64,
}

pub struct DetectionEngine {
    settings: DetectionSettings,
    windows: DashMap<IpAddr, SourceWindow>,
    classifier: ClassifierAdapter,
}

impl DetectionEngine {
    pub fn new(settings: DetectionSettings, classifier: ClassifierAdapter) -> Self {
        info!(
            "Detection engine ready: scan > {}/min, SYN > {}/min, {} suspicious ports, classifier {}",
            settings.scan_threshold_per_min,
            settings.syn_threshold_per_min,
            settings.suspicious_ports.len(),
            if classifier.is_configured() { "enabled" } else { "disabled" }
        );
        Self {
            settings,
            windows: DashMap::new(),
            classifier,
        }
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    /// Runs every signal for `features` and returns the verdict.
    ///
    /// The packet's observation timestamp is the engine's notion of "now".
    pub async fn evaluate(&self, features: &FlowFeatures) -> Verdict {
        let observation = self.observe(features, features.observed_at);
        let mut signals = Vec::new();

        if observation.scan {
            warn!(
                "Port scan detected from {}: {:.1} ports/min",
                features.src_ip, observation.port_rate_per_min
            );
            signals.push(Signal::PortScan);
        }
        if observation.flood {
            warn!(
                "SYN flood detected from {}: {:.1} SYN/min",
                features.src_ip, observation.syn_rate_per_min
            );
            signals.push(Signal::SynFlood);
        }
        if self.is_suspicious_port(features) {
            warn!(
                "Connection from {} to suspicious port {}",
                features.src_ip, features.dst_port
            );
            signals.push(Signal::SuspiciousPort);
        }
        if let Some(signal) = self.classify(features, &observation).await {
            warn!("Classifier flagged {} as {}", features.src_ip, signal);
            signals.push(signal);
        }

        self.verdict(signals, features)
    }

    /// Updates the source window and evaluates the scan and flood signals.
    pub fn observe(&self, features: &FlowFeatures, now: DateTime<Utc>) -> WindowObservation {
        let retention = self.settings.window_retention_secs;
        let mut window = self
            .windows
            .entry(features.src_ip)
            .or_insert_with(|| SourceWindow::new(now));

        if window.is_expired(now, retention) {
            debug!(
                "Window of {} rolled over after {:.0}s",
                features.src_ip,
                window.age_secs(now)
            );
            window.reset(now);
        }
        window.record_packet(features.total_length);

        let carries_ports = matches!(features.protocol, PROTO_TCP | PROTO_UDP);
        let mut scan = false;
        if carries_ports && features.dst_port != 0 {
            window.record_port(features.dst_port);
            scan = window.port_rate_per_min(now) > self.settings.scan_threshold_per_min;
        }

        let mut flood = false;
        if features.is_syn() {
            window.record_syn();
            flood = window.syn_rate_per_min(now) > self.settings.syn_threshold_per_min;
        }

        WindowObservation {
            port_rate_per_min: window.port_rate_per_min(now),
            syn_rate_per_min: window.syn_rate_per_min(now),
            scan,
            flood,
            packet_count: window.packet_count,
            byte_count: window.byte_count,
            duration_secs: window.age_secs(now),
        }
    }

    fn is_suspicious_port(&self, features: &FlowFeatures) -> bool {
        features.dst_port != 0 && self.settings.suspicious_ports.contains(&features.dst_port)
    }

    async fn classify(
        &self,
        features: &FlowFeatures,
        observation: &WindowObservation,
    ) -> Option<Signal> {
        if !self.classifier.is_configured() {
            return None;
        }
        let vector = feature_vector(features, observation);
        match self.classifier.predict(vector).await {
            ClassifierOutcome::Predicted(p) => {
                if p.is_malicious && p.confidence > self.settings.confidence_threshold {
                    Some(Signal::Classifier(p.class_label))
                } else {
                    None
                }
            }
            ClassifierOutcome::Abstain(reason) => {
                debug!("Classifier abstained for {}: {}", features.src_ip, reason);
                None
            }
        }
    }

    pub fn severity_of(&self, signal: &Signal) -> u8 {
        match signal {
            Signal::SynFlood => SEVERITY_CRITICAL,
            Signal::PortScan => SEVERITY_HIGH,
            Signal::SuspiciousPort => SEVERITY_MEDIUM,
            Signal::Classifier(label) => self
                .settings
                .class_severity
                .get(label)
                .copied()
                .unwrap_or(SEVERITY_MEDIUM),
        }
    }

    fn verdict(&self, signals: Vec<Signal>, features: &FlowFeatures) -> Verdict {
        if signals.is_empty() {
            return Verdict::benign();
        }
        let severity = signals
            .iter()
            .map(|s| self.severity_of(s))
            .min()
            .unwrap_or(SEVERITY_LOW);
        let names: Vec<&str> = signals.iter().map(|s| s.name()).collect();
        let description = format!(
            "Detected {} from {} to {}:{}",
            names.join(", "),
            features.src_ip,
            features.dst_ip,
            features.dst_port
        );
        Verdict {
            threat: true,
            signals,
            severity,
            description,
        }
    }

    /// Drops every window older than the retention horizon, returns how many went.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let retention = self.settings.window_retention_secs;
        let before = self.windows.len();
        self.windows.retain(|_, w| !w.is_expired(now, retention));
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!("Swept {} expired source windows", removed);
        }
        removed
    }

    pub fn tracked_sources(&self) -> usize {
        self.windows.len()
    }
}

/// The classifier input, in the order fixed by `FEATURE_NAMES`.
pub fn feature_vector(features: &FlowFeatures, observation: &WindowObservation) -> FeatureVector {
    let packet_count = observation.packet_count as f64;
    let byte_count = observation.byte_count as f64;
    let duration = observation.duration_secs;
    FeatureVector([
        packet_count,
        byte_count,
        duration,
        packet_count / duration.max(0.001),
        byte_count / packet_count.max(1.0),
        f64::from(features.protocol),
        f64::from(features.src_port),
        f64::from(features.dst_port),
        f64::from(features.tcp_flags),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classifier_adapter::test_classifiers::*;
    use crate::flow_extraction::types::{TCP_ACK, TCP_SYN};
    use crate::southbound::types::{MacAddr, SwitchId};
    use chrono::Duration;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn packet(
        src: [u8; 4],
        dst_port: u16,
        flags: u8,
        at: DateTime<Utc>,
    ) -> FlowFeatures {
        FlowFeatures {
            switch: SwitchId(1),
            in_port: 1,
            eth_src: MacAddr([2, 0, 0, 0, 0, 1]),
            eth_dst: MacAddr([2, 0, 0, 0, 0, 2]),
            eth_type: 0x0800,
            src_ip: IpAddr::from(Ipv4Addr::from(src)),
            dst_ip: IpAddr::from(Ipv4Addr::new(10, 0, 0, 2)),
            src_port: 40000,
            dst_port,
            protocol: PROTO_TCP,
            tcp_flags: flags,
            total_length: 60,
            ttl: 64,
            observed_at: at,
        }
    }

    fn engine() -> DetectionEngine {
        DetectionEngine::new(DetectionSettings::default(), ClassifierAdapter::disabled())
    }

    fn engine_with(classifier: ClassifierAdapter) -> DetectionEngine {
        DetectionEngine::new(DetectionSettings::default(), classifier)
    }

    fn adapter(classifier: impl crate::classifier::classifier_adapter::Classifier + 'static) -> ClassifierAdapter {
        ClassifierAdapter::new(Arc::new(classifier), std::time::Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_scan_fires_within_one_minute() {
        let engine = engine();
        let start = Utc::now();
        let mut fired = false;

        for i in 0..11i64 {
            let at = start + Duration::seconds(6 * i);
            let verdict = engine
                .evaluate(&packet([10, 0, 0, 1], 1000 + i as u16, TCP_ACK, at))
                .await;
            fired |= verdict.has(&Signal::PortScan);
        }

        assert!(fired);
    }

    #[tokio::test]
    async fn test_scan_silent_when_spread_over_two_minutes() {
        let engine = engine();
        let start = Utc::now();

        for i in 0..11i64 {
            let at = start + Duration::seconds(12 * i);
            let verdict = engine
                .evaluate(&packet([10, 0, 0, 1], 1000 + i as u16, TCP_ACK, at))
                .await;
            assert!(!verdict.threat, "fired on packet {}", i + 1);
        }
    }

    #[tokio::test]
    async fn test_single_packet_has_zero_rates() {
        let engine = engine();
        let features = packet([10, 0, 0, 9], 443, TCP_SYN, Utc::now());

        let observation = engine.observe(&features, features.observed_at);

        assert_eq!(observation.port_rate_per_min, 0.0);
        assert_eq!(observation.syn_rate_per_min, 0.0);
        assert!(!observation.scan);
        assert!(!observation.flood);
    }

    #[tokio::test]
    async fn test_single_packet_verdict_is_benign() {
        let engine = engine();
        let verdict = engine
            .evaluate(&packet([10, 0, 0, 9], 443, TCP_SYN, Utc::now()))
            .await;
        assert_eq!(verdict, Verdict::benign());
    }

    #[tokio::test]
    async fn test_flood_and_suspicious_port_take_most_severe() {
        let engine = engine();
        let start = Utc::now();

        engine
            .evaluate(&packet([10, 0, 0, 3], 4444, TCP_SYN, start))
            .await;
        let verdict = engine
            .evaluate(&packet(
                [10, 0, 0, 3],
                4444,
                TCP_SYN,
                start + Duration::milliseconds(500),
            ))
            .await;

        assert!(verdict.threat);
        assert!(verdict.has(&Signal::SynFlood));
        assert!(verdict.has(&Signal::SuspiciousPort));
        assert_eq!(verdict.severity, SEVERITY_CRITICAL);
    }

    #[tokio::test]
    async fn test_signal_order_is_fixed() {
        let engine = engine();
        let start = Utc::now();

        engine
            .evaluate(&packet([10, 0, 0, 4], 6666, TCP_SYN, start))
            .await;
        let verdict = engine
            .evaluate(&packet(
                [10, 0, 0, 4],
                6667,
                TCP_SYN,
                start + Duration::seconds(1),
            ))
            .await;

        assert_eq!(
            verdict.signals,
            vec![Signal::PortScan, Signal::SynFlood, Signal::SuspiciousPort]
        );
        assert_eq!(verdict.threat_type(), "PORT_SCAN, DOS_ATTACK, SUSPICIOUS_PORT");
        assert!(verdict.description.contains("10.0.0.4"));
    }

    #[tokio::test]
    async fn test_suspicious_port_alone() {
        let engine = engine();
        let verdict = engine
            .evaluate(&packet([10, 0, 0, 5], 31337, TCP_ACK, Utc::now()))
            .await;

        assert_eq!(verdict.signals, vec![Signal::SuspiciousPort]);
        assert_eq!(verdict.severity, SEVERITY_MEDIUM);
    }

    #[tokio::test]
    async fn test_flood_ignores_non_syn_and_udp() {
        let engine = engine();
        let start = Utc::now();

        for i in 0..50i64 {
            let mut features = packet([10, 0, 0, 6], 53, 0, start + Duration::milliseconds(10 * i));
            features.protocol = PROTO_UDP;
            let observation = engine.observe(&features, features.observed_at);
            assert!(!observation.flood);
            assert_eq!(observation.syn_rate_per_min, 0.0);
        }
    }

    #[tokio::test]
    async fn test_expired_window_rolls_over_on_touch() {
        let engine = engine();
        let start = Utc::now();

        engine.observe(&packet([10, 0, 0, 7], 1, TCP_ACK, start), start);
        engine.observe(
            &packet([10, 0, 0, 7], 2, TCP_ACK, start),
            start + Duration::seconds(10),
        );
        let later = start + Duration::seconds(311);
        let observation = engine.observe(&packet([10, 0, 0, 7], 3, TCP_ACK, later), later);

        assert_eq!(observation.packet_count, 1);
        assert_eq!(observation.duration_secs, 0.0);
        let window = engine.windows.get(&IpAddr::from(Ipv4Addr::new(10, 0, 0, 7))).unwrap();
        assert_eq!(window.ports.len(), 1);
        assert!(window.ports.contains(&3));
        assert_eq!(window.window_start, later);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_windows() {
        let engine = engine();
        let start = Utc::now();
        engine.observe(&packet([10, 0, 1, 1], 80, TCP_ACK, start), start);
        let fresh = start + Duration::seconds(200);
        engine.observe(&packet([10, 0, 1, 2], 80, TCP_ACK, fresh), fresh);

        let removed = engine.sweep(start + Duration::seconds(360));

        assert_eq!(removed, 1);
        assert_eq!(engine.tracked_sources(), 1);
    }

    #[tokio::test]
    async fn test_classifier_signal_above_threshold() {
        let engine = engine_with(adapter(FixedClassifier(malicious("PROBE", 0.9))));

        let verdict = engine
            .evaluate(&packet([10, 0, 0, 8], 8080, TCP_ACK, Utc::now()))
            .await;

        assert_eq!(verdict.signals, vec![Signal::Classifier("PROBE".to_string())]);
        assert_eq!(verdict.severity, SEVERITY_MEDIUM);
    }

    #[tokio::test]
    async fn test_classifier_below_threshold_or_benign_is_ignored() {
        let weak = engine_with(adapter(FixedClassifier(malicious("PROBE", 0.7))));
        let verdict = weak
            .evaluate(&packet([10, 0, 0, 8], 8080, TCP_ACK, Utc::now()))
            .await;
        assert!(!verdict.threat);

        let benign = engine_with(adapter(FixedClassifier(crate::classifier::types::Prediction {
            is_malicious: false,
            class_label: "BENIGN".to_string(),
            confidence: 0.99,
        })));
        let verdict = benign
            .evaluate(&packet([10, 0, 0, 8], 8080, TCP_ACK, Utc::now()))
            .await;
        assert!(!verdict.threat);
    }

    #[tokio::test]
    async fn test_class_severity_override() {
        let mut settings = DetectionSettings::default();
        settings.class_severity.insert("DOS".to_string(), 1);
        let engine = DetectionEngine::new(settings, adapter(FixedClassifier(malicious("DOS", 0.95))));

        let verdict = engine
            .evaluate(&packet([10, 0, 0, 8], 8080, TCP_ACK, Utc::now()))
            .await;

        assert_eq!(verdict.severity, SEVERITY_CRITICAL);
    }

    #[tokio::test]
    async fn test_failing_classifier_leaves_other_signals_untouched() {
        let start = Utc::now();
        let packets = [
            packet([10, 0, 0, 10], 4444, TCP_SYN, start),
            packet([10, 0, 0, 10], 4445, TCP_SYN, start + Duration::milliseconds(300)),
            packet([10, 0, 0, 10], 80, TCP_ACK, start + Duration::seconds(40)),
        ];

        let reference = engine();
        let failing = engine_with(adapter(FailingClassifier));
        let slow = DetectionEngine::new(
            DetectionSettings::default(),
            ClassifierAdapter::new(
                Arc::new(SlowClassifier(std::time::Duration::from_millis(200))),
                std::time::Duration::from_millis(5),
            ),
        );

        for features in &packets {
            let expected = reference.evaluate(features).await;
            assert_eq!(failing.evaluate(features).await, expected);
            assert_eq!(slow.evaluate(features).await, expected);
        }
    }

    #[test]
    fn test_feature_vector_layout() {
        let features = packet([10, 0, 0, 11], 22, TCP_SYN, Utc::now());
        let observation = WindowObservation {
            port_rate_per_min: 0.0,
            syn_rate_per_min: 0.0,
            scan: false,
            flood: false,
            packet_count: 4,
            byte_count: 240,
            duration_secs: 2.0,
        };

        let vector = feature_vector(&features, &observation);

        assert_eq!(
            vector.0,
            [4.0, 240.0, 2.0, 2.0, 60.0, 6.0, 40000.0, 22.0, 2.0]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_for_one_source_do_not_race() {
        let engine = Arc::new(engine());
        let start = Utc::now();
        let mut handles = Vec::new();

        for task in 0..8u16 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50u16 {
                    let features = packet([10, 9, 9, 9], task * 100 + i + 1, TCP_SYN, start);
                    engine.observe(&features, start);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let window = engine.windows.get(&IpAddr::from(Ipv4Addr::new(10, 9, 9, 9))).unwrap();
        assert_eq!(window.packet_count, 400);
        assert_eq!(window.syn_count, 400);
        assert_eq!(window.ports.len(), 400);
    }
}
