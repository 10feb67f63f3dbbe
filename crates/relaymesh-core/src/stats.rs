//! Relay counters

use crate::forwarding::RouteCase;

/// Statistics for one relay session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Datagrams polled from the transport
    pub packets_rx: u64,
    /// Case (a): forwarded upstream
    pub forwarded_upstream: u64,
    /// Case (b): delivered locally
    pub delivered_local: u64,
    /// Case (c): forwarded to a child
    pub forwarded_downstream: u64,
    /// Case (d): broadcast downstream
    pub broadcast: u64,
    /// Datagrams dropped by the codec
    pub malformed_dropped: u64,
    /// Sends the transport refused
    pub send_failures: u64,
    /// Telemetry packets emitted
    pub telemetry_sent: u64,
    /// Uplink connection attempts
    pub connect_attempts: u64,
}

impl RelayStats {
    /// Count one classified packet
    pub fn record(&mut self, case: RouteCase) {
        match case {
            RouteCase::FromChild => self.forwarded_upstream += 1,
            RouteCase::Local => self.delivered_local += 1,
            RouteCase::ToChild => self.forwarded_downstream += 1,
            RouteCase::Unknown => self.broadcast += 1,
        }
    }

    /// Packets that produced an outbound datagram
    pub fn forwarded_total(&self) -> u64 {
        self.forwarded_upstream + self.forwarded_downstream + self.broadcast
    }
}
