//! Sans-I/O wire protocol engine for Multicast DNS (RFC 6762) and
//! DNS-Based Service Discovery (RFC 6763).
//!
//! This crate implements the three hard pieces of an mDNS responder:
//!
//! - the DNS message codec, with RFC 1035 §4.1.4 label compression
//!   ([`name`], [`record`], [`packet`]),
//! - the probing state machine that claims a service name uniquely on the
//!   local link ([`prober`]),
//! - the response queue that implements RFC 6762 §6's randomized-delay /
//!   coalescing rule ([`queue`]).
//!
//! Everything that touches a real clock, a real socket, or the local
//! network-interface list lives outside this crate. [`Prober::poll`](prober::Prober::poll)
//! and [`ResponseQueue::poll`](queue::ResponseQueue::poll) take the
//! current time as a plain `u64` millisecond argument and return what the
//! caller should do next; nothing in this crate spawns a thread, reads a
//! clock, or owns a socket.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

use core::net::{Ipv4Addr, Ipv6Addr};

/// The mDNS multicast group for IPv4 (RFC 6762 §3).
pub const IPV4_MDNS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
/// The mDNS multicast group for IPv6 (RFC 6762 §3).
pub const IPV6_MDNS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);
/// The UDP port mDNS operates on (RFC 6762 §3).
pub const MDNS_PORT: u16 = 5353;
/// Default UDP payload size cap, overridable via [`Config`].
pub const DEFAULT_UDP_PAYLOAD_SIZE: usize = 1440;
/// Size in bytes of a DNS message header.
pub const MESSAGE_HEADER_SIZE: usize = 12;

pub mod class;
pub mod error;
pub mod name;
pub mod packet;
pub mod prober;
pub mod queue;
pub mod question;
pub mod random;
pub mod record;
pub mod service;
pub mod transport;


pub use class::DnsClass;
pub use error::{BuildError, NameError, ProbeTimeout, ProtoError};
pub use name::Name;
pub use packet::{Header, Packet};
pub use prober::{Prober, ProberAction, ProberEvent};
pub use question::Question;
pub use queue::{QueuedResponse, ResponseQueue};
pub use random::RandomSource;
pub use record::{Record, RecordHeader, RecordType};
pub use service::ServiceRecords;
pub use transport::{Destination, InterfaceId, Transport};

/// Runtime-tunable knobs for the codec and queue (spec.md §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Maximum bytes a single outgoing UDP datagram may occupy. Default
  /// [`DEFAULT_UDP_PAYLOAD_SIZE`].
  pub udp_payload_size: usize,
  /// If set, restricts operation to the named network interfaces. This
  /// crate never enumerates interfaces itself (spec.md §1); the list is
  /// opaque identifiers the caller assigns meaning to.
  pub interface_filter: Option<smallvec_wrapper::TinyVec<smol_str::SmolStr>>,
}

impl Default for Config {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl Config {
  /// Returns the default configuration: 1440 byte payloads, no interface
  /// filter.
  #[inline]
  pub const fn new() -> Self {
    Self {
      udp_payload_size: DEFAULT_UDP_PAYLOAD_SIZE,
      interface_filter: None,
    }
  }

  /// Sets the UDP payload size cap.
  #[inline]
  pub const fn with_udp_payload_size(mut self, size: usize) -> Self {
    self.udp_payload_size = size;
    self
  }

  /// Restricts operation to the given interface identifiers.
  #[inline]
  pub fn with_interface_filter(
    mut self,
    interfaces: smallvec_wrapper::TinyVec<smol_str::SmolStr>,
  ) -> Self {
    self.interface_filter = Some(interfaces);
    self
  }
}
