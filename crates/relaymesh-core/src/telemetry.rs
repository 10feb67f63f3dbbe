//! Duty-cycle telemetry transmitter
//!
//! The relay announces itself to its upstream neighbor once per period. The
//! timer is polled from the main loop with a monotonic timestamp; there is no
//! interrupt and no catch-up: a late poll fires once and restarts the period
//! from that poll.

use std::fmt;
use std::time::{Duration, Instant};

use crate::link::NodeIdentity;
use crate::packet::Packet;
use crate::traits::{FixedMarker, TelemetrySource};

/// Periodic telemetry packet generator with a bounded send counter
pub struct TelemetryTransmitter {
    period: Duration,
    last_fired: Instant,
    send_count: u32,
    source: Box<dyn TelemetrySource>,
}

impl TelemetryTransmitter {
    /// Create a transmitter whose first period starts at `start`
    pub fn new(period: Duration, marker: u8, start: Instant) -> Self {
        Self {
            period,
            last_fired: start,
            send_count: 0,
            source: Box::new(FixedMarker(marker)),
        }
    }

    /// Replace the payload source
    pub fn set_source(&mut self, source: Box<dyn TelemetrySource>) {
        self.source = source;
    }

    /// Restart the current period at `now`
    pub fn reset_timer(&mut self, now: Instant) {
        self.last_fired = now;
    }

    /// Number of telemetry packets produced so far
    pub fn send_count(&self) -> u32 {
        self.send_count
    }

    /// Check whether a period has elapsed at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_fired) >= self.period
    }

    /// Produce the telemetry packet if the period has elapsed
    ///
    /// Returns `None` for nodes without an upstream neighbor.
    pub fn poll(&mut self, now: Instant, identity: &NodeIdentity) -> Option<Packet> {
        if !self.is_due(now) {
            return None;
        }
        let upstream = identity.upstream?;
        self.last_fired = now;
        self.send_count = self.send_count.saturating_add(1);
        let payload = self.source.payload(self.send_count);
        Some(Packet::new(upstream, identity.own_address, &payload))
    }
}

impl fmt::Debug for TelemetryTransmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryTransmitter")
            .field("period", &self.period)
            .field("last_fired", &self.last_fired)
            .field("send_count", &self.send_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    fn identity() -> NodeIdentity {
        NodeIdentity::relay(Address::new(192, 168, 5, 1), Address::new(192, 168, 4, 1))
    }

    #[test]
    fn test_fires_once_per_period() {
        let start = Instant::now();
        let period = Duration::from_millis(100);
        let mut tx = TelemetryTransmitter::new(period, 1, start);
        let id = identity();

        assert!(tx.poll(start, &id).is_none());
        assert!(tx.poll(start + Duration::from_millis(99), &id).is_none());

        let packet = tx.poll(start + period, &id).unwrap();
        assert_eq!(packet.destination, Address::new(192, 168, 4, 1));
        assert_eq!(packet.source, Address::new(192, 168, 5, 1));
        assert_eq!(packet.payload, vec![1]);
        assert_eq!(tx.send_count(), 1);

        // Period restarts from the firing
        assert!(tx.poll(start + Duration::from_millis(150), &id).is_none());
        assert!(tx.poll(start + Duration::from_millis(200), &id).is_some());
        assert_eq!(tx.send_count(), 2);
    }

    #[test]
    fn test_late_poll_fires_once() {
        let start = Instant::now();
        let mut tx = TelemetryTransmitter::new(Duration::from_millis(10), 1, start);
        let id = identity();

        let late = start + Duration::from_millis(55);
        assert!(tx.poll(late, &id).is_some());
        assert!(tx.poll(late, &id).is_none());
        assert_eq!(tx.send_count(), 1);
    }

    #[test]
    fn test_custom_source() {
        struct Counter;
        impl TelemetrySource for Counter {
            fn payload(&mut self, send_count: u32) -> Vec<u8> {
                vec![send_count as u8]
            }
        }

        let start = Instant::now();
        let mut tx = TelemetryTransmitter::new(Duration::from_millis(1), 0, start);
        tx.set_source(Box::new(Counter));
        let id = identity();

        let first = tx.poll(start + Duration::from_millis(1), &id).unwrap();
        let second = tx.poll(start + Duration::from_millis(2), &id).unwrap();
        assert_eq!(first.payload, vec![1]);
        assert_eq!(second.payload, vec![2]);
    }

    #[test]
    fn test_root_never_fires() {
        let start = Instant::now();
        let mut tx = TelemetryTransmitter::new(Duration::from_millis(1), 1, start);
        let root = NodeIdentity::root(Address::new(192, 168, 4, 1));
        assert!(tx.poll(start + Duration::from_secs(1), &root).is_none());
        assert_eq!(tx.send_count(), 0);
    }
}
