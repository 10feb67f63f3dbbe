//! # relaymesh core
//!
//! Relay node logic for a two-tier wireless telemetry network. Leaf endpoints
//! report a state bit upward, the Root sinks reports and sends commands down,
//! and Relays bridge Leaves that cannot reach the Root directly.
//!
//! This crate implements the Relay:
//!
//! - **Discovery**: pick the uplink from one network scan
//! - **Link formation**: join it, derive an own subnet without any allocator
//! - **Forwarding**: classify every packet by address prefix, no routing table
//! - **Telemetry**: periodic liveness packet to the upstream neighbor
//! - **Lifecycle**: go to sleep when there is no uplink or the send budget is spent
//!
//! The radio driver and power management are collaborators behind the
//! [`Transport`] and [`PowerControl`] traits.
//!
//! ## Topology
//!
//! ```text
//!                      Root 192.168.4.1
//!                     /                \
//!        Relay 192.168.5.1           Leaf 192.168.4.x
//!         /            \
//!   Leaf 192.168.5.x   Leaf 192.168.5.y
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use relaymesh_core::simulation::{SimPower, SimTransport};
//! use relaymesh_core::{IgnoreReceive, RelayConfig, RelaySession};
//!
//! let config = RelayConfig::default();
//! let transport = SimTransport::under_root(&config);
//! let mut session = RelaySession::new(config, transport, SimPower::default(), IgnoreReceive)
//!     .expect("valid config");
//!
//! let identity = session.start().expect("uplink");
//! println!("own address {}", identity.own_address);
//!
//! let state = session.run(|| false).expect("linked");
//! println!("session ended: {:?}", state);
//! ```

#![warn(rust_2018_idioms)]

pub mod address;
pub mod config;
pub mod discovery;
pub mod error;
pub mod forwarding;
pub mod lifecycle;
pub mod link;
pub mod packet;
pub mod session;
pub mod simulation;
pub mod stats;
pub mod telemetry;
pub mod traits;

// Re-export main types
pub use address::{subnet_of, Address, Subnet, SubnetPrefix};
pub use config::{RelayConfig, RetryPolicy};
pub use discovery::{select_uplink, NeighborCandidate, UplinkDecision};
pub use error::{RelayError, Result};
pub use forwarding::{classify, ForwardDecision, Forwarder, Outbound, RouteCase};
pub use lifecycle::{LifecycleController, SessionState, SleepReason};
pub use link::{derive_identity, find_subnet_collisions, LinkFormation, LinkState, NodeIdentity, NodeRole, SubnetCollision};
pub use packet::{Packet, PacketCodec};
pub use session::RelaySession;
pub use stats::RelayStats;
pub use telemetry::TelemetryTransmitter;
pub use traits::{
    ActionOnReceive, Datagram, FixedMarker, IgnoreReceive, PowerControl, ScannedNetwork,
    TelemetrySource, Transport,
};
