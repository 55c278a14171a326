//! C6: the transport facade (spec §4.6). Only the abstract contract
//! lives here — binding sockets, enumerating interfaces, and joining
//! multicast groups are all external to this crate (spec §1).

use core::net::SocketAddr;

use smol_str::SmolStr;

/// An opaque identifier for a network interface. This crate never
/// enumerates interfaces itself; it only tags outbound sends and
/// inbound receives with whatever identifier the caller assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceId(SmolStr);

impl InterfaceId {
  /// Wraps a caller-defined interface identifier (e.g. `"eth0"` or a
  /// platform interface index rendered as a string).
  #[inline]
  pub fn new(id: impl Into<SmolStr>) -> Self {
    Self(id.into())
  }

  /// The identifier as a string.
  #[inline]
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

/// Where an outgoing packet should be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
  /// The mDNS multicast group on the given interface (spec §6:
  /// `224.0.0.251` for IPv4, `ff02::fb` for IPv6).
  Multicast,
  /// A specific unicast address, used for legacy-unicast responses.
  Unicast(SocketAddr),
}

/// The abstract send/receive contract a responder drives this crate's
/// codecs and state machines through. The transport is expected to be
/// lossy and unordered; every correctness obligation about ordering or
/// retransmission lives in the layers above it (spec §4.6).
pub trait Transport {
  /// The error type a send can fail with.
  type Error;

  /// Sends already-encoded packet bytes on `interface` to `destination`.
  fn send(
    &mut self,
    bytes: &[u8],
    interface: &InterfaceId,
    destination: Destination,
  ) -> Result<(), Self::Error>;
}
