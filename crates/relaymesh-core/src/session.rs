//! Relay session: the single cooperative control loop
//!
//! A [`RelaySession`] owns everything a relay knows between boot and sleep:
//! configuration, collaborators, identity, counters. Nothing is global, and
//! nothing survives the session; waking from sleep means building a new one.
//!
//! ```text
//! start():   scan ─► select uplink ─► connect (retry) ─► derive identity ─► open subnet
//!                         │                   │
//!                         └── none ──► sleep  └── policy exhausted / setup failed ──► sleep
//!
//! step():    poll one datagram ─► forward ─► telemetry due? ─► send limit? ─► sleep
//! ```

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::discovery::{select_uplink, UplinkDecision};
use crate::error::{RelayError, Result};
use crate::forwarding::{ForwardDecision, Forwarder};
use crate::lifecycle::{LifecycleController, SessionState, SleepReason};
use crate::link::{LinkFormation, LinkState, NodeIdentity};
use crate::packet::PacketCodec;
use crate::stats::RelayStats;
use crate::telemetry::TelemetryTransmitter;
use crate::traits::{ActionOnReceive, PowerControl, TelemetrySource, Transport};

/// One boot-to-sleep run of a relay node
#[derive(Debug)]
pub struct RelaySession<T: Transport, P: PowerControl, A: ActionOnReceive> {
    config: RelayConfig,
    codec: PacketCodec,
    transport: T,
    power: P,
    on_receive: A,
    decision: Option<UplinkDecision>,
    link: Option<LinkFormation>,
    forwarder: Option<Forwarder>,
    telemetry: TelemetryTransmitter,
    lifecycle: LifecycleController,
    stats: RelayStats,
}

impl<T: Transport, P: PowerControl, A: ActionOnReceive> RelaySession<T, P, A> {
    /// Create a session; fails if the configuration is invalid
    pub fn new(config: RelayConfig, transport: T, power: P, on_receive: A) -> Result<Self> {
        config.validate()?;
        let codec = PacketCodec::new(config.payload_len);
        let telemetry = TelemetryTransmitter::new(
            config.telemetry_period(),
            config.telemetry_marker,
            Instant::now(),
        );
        let lifecycle = LifecycleController::new(config.max_sends, config.sleep_duration());
        Ok(Self {
            config,
            codec,
            transport,
            power,
            on_receive,
            decision: None,
            link: None,
            forwarder: None,
            telemetry,
            lifecycle,
            stats: RelayStats::default(),
        })
    }

    /// Replace the telemetry payload source
    pub fn with_telemetry_source(mut self, source: Box<dyn TelemetrySource>) -> Self {
        self.telemetry.set_source(source);
        self
    }

    /// Run discovery and link formation, starting the telemetry timer now
    pub fn start(&mut self) -> Result<NodeIdentity> {
        self.start_at(Instant::now())
    }

    /// Run discovery and link formation; the first telemetry period begins
    /// at `now`
    pub fn start_at(&mut self, now: Instant) -> Result<NodeIdentity> {
        if let Some(forwarder) = &self.forwarder {
            return Ok(*forwarder.identity());
        }
        if self.lifecycle.state().is_sleeping() {
            return Err(RelayError::LinkNotEstablished);
        }

        let networks = self.transport.scan_networks();
        debug!(count = networks.len(), "Scan complete");
        let decision = select_uplink(&networks, &self.config);
        self.decision = Some(decision.clone());

        let target = match decision.target_name(&self.config) {
            Some(target) => target.to_string(),
            None => {
                warn!("No uplink found, sleeping");
                self.lifecycle
                    .enter_sleep(&mut self.power, SleepReason::UplinkNotFound);
                return Err(RelayError::UplinkNotFound {
                    root: self.config.root_identity.clone(),
                    relay: self.config.relay_identity.clone(),
                });
            }
        };

        let mut link = LinkFormation::new(&target, self.config.retry);
        let result = link.establish(&mut self.transport, &self.config);
        self.stats.connect_attempts += u64::from(link.attempts());
        self.link = Some(link);

        let identity = match result {
            Ok(identity) => identity,
            Err(e) => {
                let reason = match e {
                    RelayError::ConnectionTimeout { .. } => SleepReason::ConnectionTimeout,
                    _ => SleepReason::LinkSetupFailed,
                };
                self.lifecycle.enter_sleep(&mut self.power, reason);
                return Err(e);
            }
        };

        self.forwarder = Some(Forwarder::new(identity, self.codec));
        self.telemetry.reset_timer(now);
        info!(own = %identity.own_address, subnet = %identity.downstream, "Relay active");
        Ok(identity)
    }

    /// Run one loop iteration at the current time
    pub fn step(&mut self) -> Result<SessionState> {
        self.step_at(Instant::now())
    }

    /// Run one loop iteration at `now`
    ///
    /// Order is fixed: one inbound datagram is forwarded, then the telemetry
    /// timer is checked, then the send limit.
    pub fn step_at(&mut self, now: Instant) -> Result<SessionState> {
        if self.lifecycle.state().is_sleeping() {
            return Ok(self.lifecycle.state());
        }
        let forwarder = self.forwarder.ok_or(RelayError::LinkNotEstablished)?;

        if let Some(datagram) = self.transport.poll_receive() {
            self.stats.packets_rx += 1;
            match forwarder.process(&datagram) {
                Ok(decision) => {
                    self.stats.record(decision.case());
                    match decision {
                        ForwardDecision::DeliverLocal(packet) => {
                            self.on_receive.on_receive(&packet);
                        }
                        other => {
                            if let Some(out) = other.outbound() {
                                if let Err(e) =
                                    self.transport.try_send(out.destination, out.port, &out.bytes)
                                {
                                    self.stats.send_failures += 1;
                                    warn!(dest = %out.destination, error = %e, "Forward failed");
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    self.stats.malformed_dropped += 1;
                    warn!(sender = %datagram.source, error = %e, "Dropping packet");
                }
            }
        }

        if let Some(packet) = self.telemetry.poll(now, forwarder.identity()) {
            self.stats.telemetry_sent += 1;
            debug!(count = self.telemetry.send_count(), dest = %packet.destination, "Telemetry");
            let sent = self.codec.try_encode(&packet).and_then(|bytes| {
                self.transport
                    .try_send(packet.destination, self.config.port, &bytes)
            });
            if let Err(e) = sent {
                self.stats.send_failures += 1;
                warn!(error = %e, "Telemetry send failed");
            }
        }

        if self.lifecycle.send_limit_reached(self.telemetry.send_count()) {
            self.lifecycle
                .enter_sleep(&mut self.power, SleepReason::SendLimitReached);
        }

        Ok(self.lifecycle.state())
    }

    /// Step until the session sleeps or `stop` returns true
    pub fn run(&mut self, mut stop: impl FnMut() -> bool) -> Result<SessionState> {
        loop {
            let state = self.step()?;
            if state.is_sleeping() || stop() {
                return Ok(state);
            }
        }
    }

    /// Lifecycle state
    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    /// Identity, once linked
    pub fn identity(&self) -> Option<&NodeIdentity> {
        self.forwarder.as_ref().map(|f| f.identity())
    }

    /// Discovery outcome, once discovery ran
    pub fn decision(&self) -> Option<&UplinkDecision> {
        self.decision.as_ref()
    }

    /// Link state
    pub fn link_state(&self) -> LinkState {
        self.link
            .as_ref()
            .map(|l| l.state().clone())
            .unwrap_or(LinkState::Disconnected)
    }

    /// Telemetry packets sent so far
    pub fn send_count(&self) -> u32 {
        self.telemetry.send_count()
    }

    /// Session counters
    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Session configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    pub fn receiver(&self) -> &A {
        &self.on_receive
    }
}
