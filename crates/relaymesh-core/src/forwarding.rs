//! Stateless forwarding engine
//!
//! Every inbound datagram is classified against the node identity alone; no
//! routing table, no duplicate cache, no per-packet state. The four cases are
//! checked in a fixed priority order:
//!
//! | Case | Condition | Action |
//! |------|-----------|--------|
//! | (a) | transport sender is inside our subnet | forward upstream, unchanged |
//! | (b) | embedded destination is our address | deliver locally |
//! | (c) | embedded destination is inside our subnet | forward to that child |
//! | (d) | anything else | broadcast to our subnet |
//!
//! Case (a) looks at the transport-layer sender, not the embedded source.
//! This only works because the network is a two-level tree: there is no loop
//! detection, and two relays that derived the same subnet would bounce
//! traffic between each other.

use tracing::{debug, trace};

use crate::address::Address;
use crate::error::Result;
use crate::link::NodeIdentity;
use crate::packet::{Packet, PacketCodec};
use crate::traits::Datagram;

/// Which forwarding rule applies to a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteCase {
    /// (a) from a directly attached child; goes upstream
    FromChild,
    /// (b) addressed to this node
    Local,
    /// (c) addressed to a child in our subnet
    ToChild,
    /// (d) unknown destination subnet; broadcast downstream
    Unknown,
}

/// A datagram the engine wants sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Transport destination address
    pub destination: Address,
    /// Transport destination port
    pub port: u16,
    /// Encoded packet
    pub bytes: Vec<u8>,
}

/// Result of processing one inbound datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardDecision {
    /// Case (a): send upstream
    Upstream(Outbound),
    /// Case (b): hand to the local receive action
    DeliverLocal(Packet),
    /// Case (c): send to a specific child
    Downstream(Outbound),
    /// Case (d): send to the subnet broadcast address
    Broadcast(Outbound),
}

impl ForwardDecision {
    /// The rule that produced this decision
    pub fn case(&self) -> RouteCase {
        match self {
            ForwardDecision::Upstream(_) => RouteCase::FromChild,
            ForwardDecision::DeliverLocal(_) => RouteCase::Local,
            ForwardDecision::Downstream(_) => RouteCase::ToChild,
            ForwardDecision::Broadcast(_) => RouteCase::Unknown,
        }
    }

    /// Outbound datagram, if the decision produces one
    pub fn outbound(&self) -> Option<&Outbound> {
        match self {
            ForwardDecision::Upstream(o)
            | ForwardDecision::Downstream(o)
            | ForwardDecision::Broadcast(o) => Some(o),
            ForwardDecision::DeliverLocal(_) => None,
        }
    }
}

/// Classify a decoded packet received from `sender`
pub fn classify(identity: &NodeIdentity, packet: &Packet, sender: Address) -> RouteCase {
    let downstream = identity.downstream.prefix;
    if sender.prefix() == downstream {
        RouteCase::FromChild
    } else if packet.destination == identity.own_address {
        RouteCase::Local
    } else if packet.destination.prefix() == downstream {
        RouteCase::ToChild
    } else {
        RouteCase::Unknown
    }
}

/// Per-packet forwarding decisions for one node identity
#[derive(Debug, Clone, Copy)]
pub struct Forwarder {
    identity: NodeIdentity,
    codec: PacketCodec,
}

impl Forwarder {
    pub fn new(identity: NodeIdentity, codec: PacketCodec) -> Self {
        Self { identity, codec }
    }

    /// Identity the decisions are made against
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Decode and classify one datagram
    ///
    /// Returns `MalformedPacket` for bytes that do not match the wire size;
    /// the caller drops those.
    pub fn process(&self, datagram: &Datagram) -> Result<ForwardDecision> {
        let packet = self.codec.decode(&datagram.bytes)?;
        let case = classify(&self.identity, &packet, datagram.source);
        trace!(
            sender = %datagram.source,
            dest = %packet.destination,
            ?case,
            "Classified packet"
        );

        let decision = match case {
            RouteCase::FromChild => match self.identity.upstream {
                Some(upstream) => ForwardDecision::Upstream(Outbound {
                    destination: upstream,
                    port: datagram.port,
                    bytes: datagram.bytes.clone(),
                }),
                // The Root is the sink for everything coming up the tree
                None => ForwardDecision::DeliverLocal(packet),
            },
            RouteCase::Local => ForwardDecision::DeliverLocal(packet),
            RouteCase::ToChild => ForwardDecision::Downstream(Outbound {
                destination: packet.destination,
                port: datagram.port,
                bytes: datagram.bytes.clone(),
            }),
            RouteCase::Unknown => {
                debug!(dest = %packet.destination, "Unknown subnet, broadcasting downstream");
                ForwardDecision::Broadcast(Outbound {
                    destination: self.identity.downstream.broadcast(),
                    port: datagram.port,
                    bytes: datagram.bytes.clone(),
                })
            }
        };
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;

    fn node() -> NodeIdentity {
        NodeIdentity::relay(Address::new(192, 168, 5, 1), Address::new(192, 168, 4, 1))
    }

    fn packet_to(dest: Address) -> Packet {
        Packet::new(dest, Address::new(192, 168, 5, 7), &[1])
    }

    #[test]
    fn test_priority_order() {
        let id = node();
        let child = Address::new(192, 168, 5, 7);
        let outside = Address::new(10, 0, 0, 2);

        // Child sender wins even when the packet is addressed to us
        assert_eq!(
            classify(&id, &packet_to(id.own_address), child),
            RouteCase::FromChild
        );
        assert_eq!(classify(&id, &packet_to(id.own_address), outside), RouteCase::Local);
        assert_eq!(
            classify(&id, &packet_to(Address::new(192, 168, 5, 9)), outside),
            RouteCase::ToChild
        );
        assert_eq!(
            classify(&id, &packet_to(Address::new(172, 16, 0, 4)), outside),
            RouteCase::Unknown
        );
    }

    #[test]
    fn test_classification_is_total_and_exclusive() {
        let id = node();
        let addresses = [
            Address::new(192, 168, 5, 1),
            Address::new(192, 168, 5, 9),
            Address::new(192, 168, 5, 255),
            Address::new(192, 168, 4, 1),
            Address::new(10, 0, 0, 2),
            Address::new(0, 0, 0, 0),
        ];
        for sender in addresses {
            for dest in addresses {
                let packet = packet_to(dest);
                let case = classify(&id, &packet, sender);

                let a = sender.prefix() == id.downstream.prefix;
                let b = !a && dest == id.own_address;
                let c = !a && !b && dest.prefix() == id.downstream.prefix;
                let d = !a && !b && !c;
                let expected = [a, b, c, d];
                assert_eq!(expected.iter().filter(|x| **x).count(), 1);

                let index = match case {
                    RouteCase::FromChild => 0,
                    RouteCase::Local => 1,
                    RouteCase::ToChild => 2,
                    RouteCase::Unknown => 3,
                };
                assert!(expected[index], "sender {} dest {} -> {:?}", sender, dest, case);

                // Same input, same answer
                assert_eq!(classify(&id, &packet, sender), case);
            }
        }
    }

    #[test]
    fn test_upstream_reuses_sender_port_and_bytes() {
        let forwarder = Forwarder::new(node(), PacketCodec::default());
        let bytes = vec![10, 0, 0, 9, 192, 168, 5, 7, 1];
        let datagram = Datagram::new(bytes.clone(), Address::new(192, 168, 5, 7), 5555);

        let decision = forwarder.process(&datagram).unwrap();
        assert_eq!(
            decision,
            ForwardDecision::Upstream(Outbound {
                destination: Address::new(192, 168, 4, 1),
                port: 5555,
                bytes,
            })
        );
    }

    #[test]
    fn test_malformed_is_rejected() {
        let forwarder = Forwarder::new(node(), PacketCodec::default());
        let datagram = Datagram::new(vec![1, 2, 3, 4], Address::new(192, 168, 5, 7), 5555);
        assert!(matches!(
            forwarder.process(&datagram),
            Err(RelayError::MalformedPacket { .. })
        ));
    }

    #[test]
    fn test_root_sinks_child_traffic() {
        let root = NodeIdentity::root(Address::new(192, 168, 4, 1));
        let forwarder = Forwarder::new(root, PacketCodec::default());
        let bytes = vec![192, 168, 4, 1, 192, 168, 4, 2, 1];
        let datagram = Datagram::new(bytes, Address::new(192, 168, 4, 2), 4210);

        let decision = forwarder.process(&datagram).unwrap();
        assert_eq!(decision.case(), RouteCase::Local);
        assert!(decision.outbound().is_none());
    }
}
