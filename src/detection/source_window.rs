use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Sliding observation window for one source address.
///
/// The port set and counters only grow for the life of a window. When the window is
/// older than the retention horizon it is reset in place and starts over.
#[derive(Debug, Clone)]
pub struct SourceWindow {
    pub window_start: DateTime<Utc>,
    pub ports: HashSet<u16>,
    pub syn_count: u64,
    pub packet_count: u64,
    pub byte_count: u64,
}

impl SourceWindow {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            ports: HashSet::new(),
            syn_count: 0,
            packet_count: 0,
            byte_count: 0,
        }
    }

    /// Window age in seconds. Packets stamped before the window start count as age zero.
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.window_start).num_milliseconds();
        if millis <= 0 {
            0.0
        } else {
            millis as f64 / 1000.0
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, retention_secs: u64) -> bool {
        self.age_secs(now) > retention_secs as f64
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        *self = Self::new(now);
    }

    pub fn record_packet(&mut self, bytes: u32) {
        self.packet_count += 1;
        self.byte_count += u64::from(bytes);
    }

    pub fn record_port(&mut self, port: u16) {
        self.ports.insert(port);
    }

    pub fn record_syn(&mut self) {
        self.syn_count += 1;
    }

    pub fn port_rate_per_min(&self, now: DateTime<Utc>) -> f64 {
        per_minute(self.ports.len() as f64, self.age_secs(now))
    }

    pub fn syn_rate_per_min(&self, now: DateTime<Utc>) -> f64 {
        per_minute(self.syn_count as f64, self.age_secs(now))
    }
}

/// `count / (age / 60)`, zero for a zero-age window.
pub fn per_minute(count: f64, age_secs: f64) -> f64 {
    if age_secs <= 0.0 {
        0.0
    } else {
        count / (age_secs / 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_zero_age_rate_is_zero() {
        let now = Utc::now();
        let mut window = SourceWindow::new(now);
        window.record_port(80);
        window.record_syn();

        assert_eq!(window.age_secs(now), 0.0);
        assert_eq!(window.port_rate_per_min(now), 0.0);
        assert_eq!(window.syn_rate_per_min(now), 0.0);
    }

    #[test]
    fn test_rates() {
        let start = Utc::now();
        let mut window = SourceWindow::new(start);
        for port in 1..=5 {
            window.record_port(port);
        }
        window.record_port(5);

        let now = start + Duration::seconds(30);
        assert_eq!(window.ports.len(), 5);
        assert!((window.port_rate_per_min(now) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_order_packet_has_zero_age() {
        let start = Utc::now();
        let window = SourceWindow::new(start);
        assert_eq!(window.age_secs(start - Duration::seconds(5)), 0.0);
    }

    #[test]
    fn test_expiry_and_reset() {
        let start = Utc::now();
        let mut window = SourceWindow::new(start);
        window.record_port(22);
        window.record_packet(60);

        assert!(!window.is_expired(start + Duration::seconds(300), 300));
        let later = start + Duration::seconds(301);
        assert!(window.is_expired(later, 300));

        window.reset(later);
        assert!(window.ports.is_empty());
        assert_eq!(window.packet_count, 0);
        assert_eq!(window.byte_count, 0);
        assert_eq!(window.window_start, later);
    }
}
