//! Collaborator traits
//!
//! The relay core never touches a radio directly. Scanning, joining networks,
//! sending and receiving datagrams, and powering down are all delegated to the
//! implementations of these traits. Real firmware plugs its driver in here; the
//! [`simulation`](crate::simulation) module provides in-memory versions.

use std::fmt::Debug;
use std::time::Duration;

use crate::address::Address;
use crate::error::Result;
use crate::packet::Packet;

/// A network seen during a scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedNetwork {
    /// Advertised network name
    pub name: String,
    /// Received signal strength in dBm (higher is better)
    pub signal_strength: i32,
}

impl ScannedNetwork {
    pub fn new(name: &str, signal_strength: i32) -> Self {
        Self {
            name: name.to_string(),
            signal_strength,
        }
    }
}

/// One received datagram, owned by the event that consumes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Raw bytes as received
    pub bytes: Vec<u8>,
    /// Transport-layer sender address
    pub source: Address,
    /// Transport-layer sender port
    pub port: u16,
}

impl Datagram {
    pub fn new(bytes: Vec<u8>, source: Address, port: u16) -> Self {
        Self { bytes, source, port }
    }
}

/// Radio/transport driver consumed by the relay
pub trait Transport: Debug {
    /// Scan for visible networks (blocking, one-shot)
    fn scan_networks(&mut self) -> Vec<ScannedNetwork>;

    /// Drop any existing uplink association
    fn disconnect(&mut self);

    /// Make a single attempt to join `name`
    ///
    /// Returns an error if the attempt timed out. Retrying is the caller's
    /// business.
    fn connect(&mut self, name: &str, secret: &str) -> Result<()>;

    /// Address assigned to this node by the uplink
    fn local_address(&self) -> Address;

    /// Gateway address of the uplink
    fn gateway_address(&self) -> Address;

    /// Open this node's own downstream network
    fn open_downstream_domain(
        &mut self,
        name: &str,
        secret: &str,
        own_address: Address,
        netmask: Address,
    ) -> Result<()>;

    /// Start listening for datagrams on `port`
    fn listen(&mut self, port: u16) -> Result<()>;

    /// Send a datagram without blocking
    fn try_send(&mut self, destination: Address, port: u16, bytes: &[u8]) -> Result<()>;

    /// Poll for one received datagram without blocking
    fn poll_receive(&mut self) -> Option<Datagram>;
}

/// Power management collaborator
pub trait PowerControl: Debug {
    /// Ask the hardware to sleep for `duration`
    ///
    /// On real hardware this never returns within the session; the node
    /// reboots into a fresh session.
    fn request_sleep(&mut self, duration: Duration);
}

/// Handler for packets addressed to this relay itself
pub trait ActionOnReceive {
    fn on_receive(&mut self, packet: &Packet);
}

/// Discards locally delivered packets
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreReceive;

impl ActionOnReceive for IgnoreReceive {
    fn on_receive(&mut self, _packet: &Packet) {}
}

impl<F: FnMut(&Packet)> ActionOnReceive for F {
    fn on_receive(&mut self, packet: &Packet) {
        self(packet)
    }
}

/// Supplier of the telemetry payload
pub trait TelemetrySource {
    /// Produce the payload for the next telemetry packet
    fn payload(&mut self, send_count: u32) -> Vec<u8>;
}

/// Fixed single-byte marker payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedMarker(pub u8);

impl TelemetrySource for FixedMarker {
    fn payload(&mut self, _send_count: u32) -> Vec<u8> {
        vec![self.0]
    }
}
