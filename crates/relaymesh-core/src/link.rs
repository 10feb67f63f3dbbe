//! Link formation and subnet identity derivation
//!
//! Once discovery has picked a target, the relay joins it and derives its own
//! downstream subnet from the addresses the uplink handed out. No allocator is
//! involved:
//!
//! ```text
//! local   = L0.L1.L2.L3      (assigned by the uplink)
//! gateway = G0.G1.G2.G3      (the uplink itself)
//! own     = L0.L1.(L2 + G3 mod 256).1
//! ```
//!
//! A relay under the Root at `192.168.4.1` therefore owns `192.168.5.0/24`, a
//! relay under that relay owns `192.168.6.0/24`, and so on. Two relays can end
//! up with the same subnet (see [`find_subnet_collisions`]); nothing here
//! prevents it.

use std::thread;

use tracing::{debug, info, warn};

use crate::address::{Address, Subnet, SubnetPrefix};
use crate::config::{RelayConfig, RetryPolicy};
use crate::error::{RelayError, Result};
use crate::traits::Transport;

/// Role of a node in the two-tier tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Base station; sink for uplink traffic, no upstream
    Root,
    /// Bridges one downstream subnet to one upstream neighbor
    Relay,
}

/// Identity of a node, fixed for the whole session once linked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Role of this node
    pub role: NodeRole,
    /// This node's address (gateway of its own subnet)
    pub own_address: Address,
    /// Subnet this node owns
    pub downstream: Subnet,
    /// Upstream neighbor (`None` only for the Root)
    pub upstream: Option<Address>,
}

impl NodeIdentity {
    /// Identity of a relay linked to `upstream`
    pub fn relay(own_address: Address, upstream: Address) -> Self {
        Self {
            role: NodeRole::Relay,
            own_address,
            downstream: Subnet::of(own_address),
            upstream: Some(upstream),
        }
    }

    /// Identity of the Root
    pub fn root(own_address: Address) -> Self {
        Self {
            role: NodeRole::Root,
            own_address,
            downstream: Subnet::of(own_address),
            upstream: None,
        }
    }

    /// Prefix of the owned subnet
    pub fn prefix(&self) -> SubnetPrefix {
        self.downstream.prefix
    }
}

/// Derive a relay identity from the addresses the uplink assigned
pub fn derive_identity(local: Address, gateway: Address) -> NodeIdentity {
    let octets = local.as_bytes();
    let own = Address::new(
        octets[0],
        octets[1],
        octets[2].wrapping_add(gateway.host_id()),
        Address::GATEWAY_HOST_ID,
    );
    NodeIdentity::relay(own, gateway)
}

/// A pair of identities that derived the same downstream subnet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetCollision {
    /// Index of the first identity
    pub first: usize,
    /// Index of the second identity
    pub second: usize,
    /// Shared prefix
    pub prefix: SubnetPrefix,
}

/// Find identities whose downstream subnets coincide
pub fn find_subnet_collisions(identities: &[NodeIdentity]) -> Vec<SubnetCollision> {
    let mut collisions = Vec::new();
    for (i, a) in identities.iter().enumerate() {
        for (j, b) in identities.iter().enumerate().skip(i + 1) {
            if a.prefix() == b.prefix() {
                collisions.push(SubnetCollision {
                    first: i,
                    second: j,
                    prefix: a.prefix(),
                });
            }
        }
    }
    collisions
}

/// State of the uplink
#[derive(Debug, Clone, PartialEq)]
pub enum LinkState {
    /// No uplink yet
    Disconnected,
    /// Attempting to join `target`
    Connecting {
        /// Network being joined
        target: String,
        /// Failed attempts so far
        failures: u32,
    },
    /// Joined and identity derived
    Linked(NodeIdentity),
    /// Retry policy exhausted, or the downstream domain could not be set up
    Failed,
}

/// Drives one link formation against a transport
#[derive(Debug)]
pub struct LinkFormation {
    target: String,
    policy: RetryPolicy,
    attempts: u32,
    state: LinkState,
}

impl LinkFormation {
    /// Prepare to join `target` under `policy`
    pub fn new(target: &str, policy: RetryPolicy) -> Self {
        Self {
            target: target.to_string(),
            policy,
            attempts: 0,
            state: LinkState::Disconnected,
        }
    }

    /// Current link state
    pub fn state(&self) -> &LinkState {
        &self.state
    }

    /// Total connection attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Join the target, derive the identity and open the downstream domain
    ///
    /// Blocks for `policy.delay()` between failed attempts. Under an
    /// unbounded policy this only returns once connected.
    pub fn establish<T: Transport>(
        &mut self,
        transport: &mut T,
        config: &RelayConfig,
    ) -> Result<NodeIdentity> {
        transport.disconnect();
        let mut failures = 0u32;

        loop {
            self.state = LinkState::Connecting {
                target: self.target.clone(),
                failures,
            };
            self.attempts = self.attempts.saturating_add(1);

            match transport.connect(&self.target, &config.secret) {
                Ok(()) => break,
                Err(e) => {
                    failures = failures.saturating_add(1);
                    debug!(network = %self.target, attempt = failures, error = %e, "Connect attempt failed");
                    if !self.policy.allows(failures) {
                        warn!(network = %self.target, attempts = failures, "Giving up on uplink");
                        self.state = LinkState::Failed;
                        return Err(RelayError::ConnectionTimeout {
                            network: self.target.clone(),
                            attempts: failures,
                        });
                    }
                    thread::sleep(self.policy.delay());
                }
            }
        }

        let local = transport.local_address();
        let gateway = transport.gateway_address();
        let identity = derive_identity(local, gateway);
        info!(
            uplink = %self.target,
            local = %local,
            gateway = %gateway,
            own = %identity.own_address,
            subnet = %identity.downstream,
            "Uplink established"
        );

        let setup = transport
            .open_downstream_domain(
                &config.relay_identity,
                &config.secret,
                identity.own_address,
                identity.downstream.netmask,
            )
            .and_then(|()| transport.listen(config.port));
        if let Err(e) = setup {
            warn!(own = %identity.own_address, error = %e, "Downstream setup failed");
            self.state = LinkState::Failed;
            return Err(e);
        }

        self.state = LinkState::Linked(identity);
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimTransport;

    #[test]
    fn test_derive_under_root() {
        let id = derive_identity(Address::new(192, 168, 4, 2), Address::new(192, 168, 4, 1));
        assert_eq!(id.own_address, Address::new(192, 168, 5, 1));
        assert_eq!(id.upstream, Some(Address::new(192, 168, 4, 1)));
        assert_eq!(id.role, NodeRole::Relay);
        assert_eq!(id.downstream.prefix, id.own_address.prefix());
    }

    #[test]
    fn test_derive_ignores_local_host_id() {
        let a = derive_identity(Address::new(192, 168, 4, 2), Address::new(192, 168, 4, 1));
        let b = derive_identity(Address::new(192, 168, 4, 77), Address::new(192, 168, 4, 1));
        assert_eq!(a.own_address, b.own_address);
    }

    #[test]
    fn test_derive_wraps_third_octet() {
        let id = derive_identity(Address::new(10, 0, 250, 3), Address::new(10, 0, 250, 10));
        assert_eq!(id.own_address, Address::new(10, 0, 4, 1));
    }

    #[test]
    fn test_collision_is_detectable() {
        // Two different uplinks can fold into the same subnet
        let a = derive_identity(Address::new(192, 168, 4, 5), Address::new(192, 168, 4, 2));
        let b = derive_identity(Address::new(192, 168, 5, 9), Address::new(192, 168, 5, 1));
        assert_eq!(a.own_address, b.own_address);

        let c = derive_identity(Address::new(192, 168, 4, 5), Address::new(192, 168, 4, 1));
        let collisions = find_subnet_collisions(&[a, c, b]);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].first, 0);
        assert_eq!(collisions[0].second, 2);
        assert_eq!(collisions[0].prefix, SubnetPrefix::new(192, 168, 6));
    }

    #[test]
    fn test_root_identity_has_no_upstream() {
        let root = NodeIdentity::root(Address::new(192, 168, 4, 1));
        assert_eq!(root.upstream, None);
        assert_eq!(root.role, NodeRole::Root);
    }

    #[test]
    fn test_listen_failure_fails_link() {
        let config = RelayConfig::default().with_retry(RetryPolicy::Unbounded { delay_ms: 0 });
        let mut transport = SimTransport::under_root(&config).with_listen_failure(true);
        let mut link = LinkFormation::new(&config.root_identity, config.retry);

        let result = link.establish(&mut transport, &config);
        assert!(matches!(result, Err(RelayError::Transport(_))));
        assert_eq!(link.state(), &LinkState::Failed);
        assert_eq!(link.attempts(), 1);
    }

    #[test]
    fn test_connecting_state_counts_failures() {
        let config = RelayConfig::default().with_retry(RetryPolicy::Bounded {
            delay_ms: 0,
            max_attempts: 2,
        });
        let mut transport = SimTransport::under_root(&config).with_connect_failures(5);
        let mut link = LinkFormation::new(&config.root_identity, config.retry);

        let result = link.establish(&mut transport, &config);
        assert_eq!(
            result,
            Err(RelayError::ConnectionTimeout {
                network: config.root_identity.clone(),
                attempts: 2,
            })
        );
        assert_eq!(link.state(), &LinkState::Failed);
        assert_eq!(link.attempts(), 2);
    }

    #[test]
    fn test_new_link_is_disconnected() {
        let link = LinkFormation::new("RELAY", RetryPolicy::relay());
        assert_eq!(link.state(), &LinkState::Disconnected);
        assert_eq!(link.attempts(), 0);
    }
}
