//! In-memory collaborators for running a relay without a radio
//!
//! [`SimTransport`] is scripted up front (visible networks, addresses the
//! uplink hands out, how many connect attempts fail) and fed inbound
//! datagrams while the session runs. Everything the relay sends is recorded
//! for inspection. [`SimPower`] records sleep requests instead of powering
//! anything down.
//!
//! ## Example
//!
//! ```ignore
//! use relaymesh_core::simulation::{SimPower, SimTransport};
//! use relaymesh_core::{IgnoreReceive, RelayConfig, RelaySession};
//!
//! let config = RelayConfig::default();
//! let transport = SimTransport::under_root(&config);
//! let mut session = RelaySession::new(config, transport, SimPower::default(), IgnoreReceive)?;
//! session.start()?;
//! session.step()?;
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use tracing::trace;

use crate::address::Address;
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::packet::{Packet, PacketCodec};
use crate::traits::{ActionOnReceive, Datagram, PowerControl, ScannedNetwork, Transport};

/// Address the simulated Root hands out to its direct clients
pub const SIM_ROOT_GATEWAY: Address = Address::new(192, 168, 4, 1);

/// A datagram the relay sent through the simulated transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDatagram {
    /// Transport destination
    pub destination: Address,
    /// Transport destination port
    pub port: u16,
    /// Raw bytes
    pub bytes: Vec<u8>,
}

/// Downstream domain opened by the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedDomain {
    pub name: String,
    pub own_address: Address,
    pub netmask: Address,
}

/// Scripted transport
#[derive(Debug, Clone, Default)]
pub struct SimTransport {
    networks: Vec<ScannedNetwork>,
    local: Address,
    gateway: Address,
    fail_connects: u32,
    fail_sends: bool,
    fail_listen: bool,
    scans: u32,
    connect_attempts: u32,
    disconnects: u32,
    connected: Option<String>,
    domain: Option<OpenedDomain>,
    listening: Option<u16>,
    inbox: VecDeque<Datagram>,
    sent: Vec<SentDatagram>,
}

impl SimTransport {
    /// Transport with nothing visible
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that sees the Root and gets `192.168.4.2` from it
    pub fn under_root(config: &RelayConfig) -> Self {
        Self::new()
            .with_network(&config.root_identity, -60)
            .with_addresses(Address::new(192, 168, 4, 2), SIM_ROOT_GATEWAY)
    }

    /// Transport that only sees one Relay, owning `192.168.5.0/24`
    pub fn under_relay(config: &RelayConfig, signal_strength: i32) -> Self {
        Self::new()
            .with_network(&config.relay_identity, signal_strength)
            .with_addresses(Address::new(192, 168, 5, 2), Address::new(192, 168, 5, 1))
    }

    pub fn with_network(mut self, name: &str, signal_strength: i32) -> Self {
        self.networks.push(ScannedNetwork::new(name, signal_strength));
        self
    }

    /// Addresses handed out by the uplink on connect
    pub fn with_addresses(mut self, local: Address, gateway: Address) -> Self {
        self.local = local;
        self.gateway = gateway;
        self
    }

    /// Make the first `count` connect attempts time out
    pub fn with_connect_failures(mut self, count: u32) -> Self {
        self.fail_connects = count;
        self
    }

    /// Make every send fail
    pub fn with_send_failures(mut self, fail: bool) -> Self {
        self.fail_sends = fail;
        self
    }

    /// Make `listen` fail, as if the port were taken
    pub fn with_listen_failure(mut self, fail: bool) -> Self {
        self.fail_listen = fail;
        self
    }

    /// Queue an inbound datagram
    pub fn inject(&mut self, bytes: Vec<u8>, source: Address, port: u16) {
        self.inbox.push_back(Datagram::new(bytes, source, port));
    }

    /// Encode and queue an inbound packet
    pub fn inject_packet(&mut self, codec: &PacketCodec, packet: &Packet, source: Address, port: u16) {
        self.inject(codec.encode(packet), source, port);
    }

    /// Datagrams sent so far
    pub fn sent(&self) -> &[SentDatagram] {
        &self.sent
    }

    /// Take and clear the sent datagrams
    pub fn drain_sent(&mut self) -> Vec<SentDatagram> {
        std::mem::take(&mut self.sent)
    }

    /// Inbound datagrams not yet polled
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    pub fn scans(&self) -> u32 {
        self.scans
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts
    }

    pub fn disconnects(&self) -> u32 {
        self.disconnects
    }

    pub fn connected_to(&self) -> Option<&str> {
        self.connected.as_deref()
    }

    pub fn domain(&self) -> Option<&OpenedDomain> {
        self.domain.as_ref()
    }

    pub fn listening_port(&self) -> Option<u16> {
        self.listening
    }
}

impl Transport for SimTransport {
    fn scan_networks(&mut self) -> Vec<ScannedNetwork> {
        self.scans += 1;
        self.networks.clone()
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
        self.connected = None;
    }

    fn connect(&mut self, name: &str, _secret: &str) -> Result<()> {
        self.connect_attempts += 1;
        if self.connect_attempts <= self.fail_connects {
            return Err(RelayError::Transport(format!("timeout joining {}", name)));
        }
        if !self.networks.iter().any(|n| n.name == name) {
            return Err(RelayError::Transport(format!("{} not in range", name)));
        }
        self.connected = Some(name.to_string());
        Ok(())
    }

    fn local_address(&self) -> Address {
        self.local
    }

    fn gateway_address(&self) -> Address {
        self.gateway
    }

    fn open_downstream_domain(
        &mut self,
        name: &str,
        _secret: &str,
        own_address: Address,
        netmask: Address,
    ) -> Result<()> {
        self.domain = Some(OpenedDomain {
            name: name.to_string(),
            own_address,
            netmask,
        });
        Ok(())
    }

    fn listen(&mut self, port: u16) -> Result<()> {
        if self.fail_listen {
            return Err(RelayError::Transport(format!("port {} busy", port)));
        }
        self.listening = Some(port);
        Ok(())
    }

    fn try_send(&mut self, destination: Address, port: u16, bytes: &[u8]) -> Result<()> {
        if self.fail_sends {
            return Err(RelayError::Transport("send buffer full".into()));
        }
        trace!(%destination, port, len = bytes.len(), "sim send");
        self.sent.push(SentDatagram {
            destination,
            port,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn poll_receive(&mut self) -> Option<Datagram> {
        self.inbox.pop_front()
    }
}

/// Power collaborator that records sleep requests
#[derive(Debug, Clone, Default)]
pub struct SimPower {
    requests: Vec<Duration>,
}

impl SimPower {
    /// Every sleep request received
    pub fn requests(&self) -> &[Duration] {
        &self.requests
    }

    pub fn slept(&self) -> bool {
        !self.requests.is_empty()
    }
}

impl PowerControl for SimPower {
    fn request_sleep(&mut self, duration: Duration) {
        self.requests.push(duration);
    }
}

/// Receive action that keeps every locally delivered packet
#[derive(Debug, Clone, Default)]
pub struct CollectReceived {
    pub packets: Vec<Packet>,
}

impl ActionOnReceive for CollectReceived {
    fn on_receive(&mut self, packet: &Packet) {
        self.packets.push(packet.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_failures_then_success() {
        let config = RelayConfig::default();
        let mut t = SimTransport::under_root(&config).with_connect_failures(2);

        assert!(t.connect(&config.root_identity, "").is_err());
        assert!(t.connect(&config.root_identity, "").is_err());
        assert!(t.connect(&config.root_identity, "").is_ok());
        assert_eq!(t.connect_attempts(), 3);
        assert_eq!(t.connected_to(), Some(config.root_identity.as_str()));
    }

    #[test]
    fn test_unknown_network_rejected() {
        let mut t = SimTransport::new();
        assert!(t.connect("NOPE", "").is_err());
    }

    #[test]
    fn test_inbox_is_fifo() {
        let mut t = SimTransport::new();
        t.inject(vec![1], Address::new(1, 1, 1, 1), 1);
        t.inject(vec![2], Address::new(2, 2, 2, 2), 2);
        assert_eq!(t.poll_receive().unwrap().bytes, vec![1]);
        assert_eq!(t.poll_receive().unwrap().bytes, vec![2]);
        assert!(t.poll_receive().is_none());
    }

    #[test]
    fn test_send_failure() {
        let mut t = SimTransport::new().with_send_failures(true);
        assert!(t.try_send(Address::new(1, 2, 3, 4), 1, &[0]).is_err());
        assert!(t.sent().is_empty());
    }
}
