//! C4: the response queue. Implements RFC 6762 §6's "send with a small
//! random delay and coalesce when possible" rule (spec §4.4).
//!
//! Like the rest of this crate, the queue is sans-I/O: it owns no timer
//! and spawns no task. The caller calls [`ResponseQueue::poll`] whenever
//! its own clock advances (on a timer tick or before blocking on the
//! next event) and is told which responses are now due.

use smallvec_wrapper::TinyVec;

use crate::packet::Packet;
use crate::random::{uniform_delay_ms, RandomSource};
use crate::transport::InterfaceId;

const DELAY_MIN_MS: u64 = 20;
const DELAY_MAX_MS: u64 = 120;
/// The longest an entry's total delay-from-creation may grow through
/// successive merges (RFC 6762 §6, spec §4.4 `MAX_DELAY`).
pub const MAX_DELAY_MS: u64 = 500;

/// One packet waiting to be sent on a particular interface (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedResponse {
  packet: Packet,
  interface: InterfaceId,
  created_at_ms: u64,
  scheduled_at_ms: u64,
  cancelled: bool,
}

impl QueuedResponse {
  /// The packet to send.
  #[inline]
  pub const fn packet(&self) -> &Packet {
    &self.packet
  }

  /// The interface it should be sent on.
  #[inline]
  pub const fn interface(&self) -> &InterfaceId {
    &self.interface
  }

  /// When this entry was first created (before any merges).
  #[inline]
  pub const fn created_at_ms(&self) -> u64 {
    self.created_at_ms
  }

  /// When this entry is scheduled to fire.
  #[inline]
  pub const fn scheduled_at_ms(&self) -> u64 {
    self.scheduled_at_ms
  }

  /// Whether this entry was cancelled by a later merge. Cancelled
  /// entries are removed from the queue by [`ResponseQueue::poll`]
  /// without ever being returned (spec invariant 4).
  #[inline]
  pub const fn is_cancelled(&self) -> bool {
    self.cancelled
  }
}

/// Holds outgoing responses with per-packet randomized delay, merging
/// compatible packets on the same interface to reduce traffic (spec
/// §4.4).
#[derive(Debug, Default)]
pub struct ResponseQueue {
  entries: Vec<QueuedResponse>,
}

impl ResponseQueue {
  /// An empty queue.
  #[inline]
  pub fn new() -> Self {
    Self::default()
  }

  /// Enqueues `packet` for `interface`. Assigns a uniform 20-120ms
  /// delay, then attempts to merge it with the most recently enqueued
  /// still-pending entry on the same interface (spec §4.4).
  ///
  /// `cap` is the UDP payload size used for the combine-compatibility
  /// check (spec §4.3).
  pub fn enqueue(
    &mut self,
    packet: Packet,
    interface: InterfaceId,
    now_ms: u64,
    cap: usize,
    random: &mut impl RandomSource,
  ) {
    let delay = uniform_delay_ms(random.uniform(), DELAY_MIN_MS, DELAY_MAX_MS);
    let mut new_entry = QueuedResponse {
      packet,
      interface: interface.clone(),
      created_at_ms: now_ms,
      scheduled_at_ms: now_ms + delay,
      cancelled: false,
    };

    if let Some(idx) = self
      .entries
      .iter()
      .rposition(|e| !e.cancelled && e.interface == interface)
    {
      let merged_creation = self.entries[idx].created_at_ms.min(new_entry.created_at_ms);
      let later_scheduled = self.entries[idx]
        .scheduled_at_ms
        .max(new_entry.scheduled_at_ms);
      let within_cap = later_scheduled.saturating_sub(merged_creation) <= MAX_DELAY_MS;

      if within_cap
        && self.entries[idx]
          .packet
          .combine_compatible(&mut new_entry.packet, cap)
      {
        tracing::debug!(interface = interface.as_str(), "mdns queue: coalescing responses");
        if self.entries[idx].scheduled_at_ms >= new_entry.scheduled_at_ms {
          // The existing entry is scheduled to fire no earlier than the
          // new one: it survives and absorbs the new packet.
          self.entries[idx].packet.combine(new_entry.packet);
          self.entries[idx].created_at_ms = merged_creation;
        } else {
          // The new entry fires later: it survives, absorbing the
          // existing entry's packet. The existing entry is cancelled by
          // removing it outright rather than leaving a dead placeholder
          // behind.
          let existing = self.entries.swap_remove(idx);
          new_entry.packet.combine(existing.packet);
          new_entry.created_at_ms = merged_creation;
          self.entries.push(new_entry);
        }
        return;
      }
    }

    self.entries.push(new_entry);
  }

  /// Cancels every pending entry for `interface`, e.g. when a responder
  /// shuts down that interface.
  pub fn cancel_interface(&mut self, interface: &InterfaceId) {
    for entry in &mut self.entries {
      if &entry.interface == interface {
        entry.cancelled = true;
      }
    }
  }

  /// Discards every pending entry regardless of interface (spec §5:
  /// "Shutting down a responder... drains (discards) the response
  /// queue").
  pub fn clear(&mut self) {
    self.entries.clear();
  }

  /// Removes and returns every entry whose scheduled time has arrived.
  /// Cancelled entries are dropped silently; they are never returned
  /// (spec invariant 4).
  pub fn poll(&mut self, now_ms: u64) -> TinyVec<QueuedResponse> {
    let mut ready = TinyVec::new();
    let mut remaining = Vec::with_capacity(self.entries.len());
    for entry in core::mem::take(&mut self.entries) {
      if entry.scheduled_at_ms <= now_ms {
        if !entry.cancelled {
          ready.push(entry);
        }
      } else {
        remaining.push(entry);
      }
    }
    self.entries = remaining;
    ready
  }

  /// The earliest scheduled time among pending, non-cancelled entries —
  /// what the caller should arm its next timer for.
  pub fn next_wake_ms(&self) -> Option<u64> {
    self
      .entries
      .iter()
      .filter(|e| !e.cancelled)
      .map(QueuedResponse::scheduled_at_ms)
      .min()
  }

  /// Number of entries still pending, cancelled or not.
  #[inline]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Whether the queue holds no entries.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::name::Name;
  use crate::packet::Header;
  use crate::record::{RData, Record, RecordHeader};
  use crate::random::RandomSource;
  use std::net::Ipv4Addr;

  struct FixedRandom(f64);
  impl RandomSource for FixedRandom {
    fn uniform(&mut self) -> f64 {
      self.0
    }
  }

  fn a_packet(id: u16, addr: Ipv4Addr) -> Packet {
    let mut p = Packet::new(Header::response(id));
    p.add_answer(Record::new(
      RecordHeader::new(Name::parse("host.local").unwrap(), 120),
      RData::A(addr),
    ));
    p
  }

  #[test]
  fn single_entry_fires_after_its_delay() {
    let mut q = ResponseQueue::new();
    let mut rng = FixedRandom(0.0); // delay = 20ms
    q.enqueue(
      a_packet(0, Ipv4Addr::new(1, 1, 1, 1)),
      InterfaceId::new("eth0"),
      0,
      1440,
      &mut rng,
    );
    assert!(q.poll(19).is_empty());
    let ready = q.poll(20);
    assert_eq!(ready.len(), 1);
    assert!(q.is_empty());
  }

  #[test]
  fn compatible_entries_coalesce_into_one_transmission() {
    let mut q = ResponseQueue::new();
    let mut rng = FixedRandom(0.0); // delay = 20ms each
    let iface = InterfaceId::new("eth0");
    q.enqueue(a_packet(0, Ipv4Addr::new(1, 1, 1, 1)), iface.clone(), 0, 1440, &mut rng);
    q.enqueue(a_packet(0, Ipv4Addr::new(2, 2, 2, 2)), iface, 30, 1440, &mut rng);

    assert_eq!(q.len(), 1, "second enqueue should merge into the first");
    let ready = q.poll(120);
    assert_eq!(ready.len(), 1);
    let merged = &ready[0];
    assert_eq!(merged.packet().answers().len(), 2);
    assert_eq!(merged.created_at_ms(), 0);
    assert!(merged.scheduled_at_ms() <= 120);
  }

  #[test]
  fn incompatible_ids_do_not_merge() {
    let mut q = ResponseQueue::new();
    let mut rng = FixedRandom(0.0);
    let iface = InterfaceId::new("eth0");
    q.enqueue(a_packet(1, Ipv4Addr::new(1, 1, 1, 1)), iface.clone(), 0, 1440, &mut rng);
    q.enqueue(a_packet(2, Ipv4Addr::new(2, 2, 2, 2)), iface, 5, 1440, &mut rng);
    assert_eq!(q.len(), 2);
  }

  #[test]
  fn cancelled_entry_never_returned_from_poll() {
    let mut q = ResponseQueue::new();
    let mut rng = FixedRandom(0.0);
    let iface = InterfaceId::new("eth0");
    q.enqueue(a_packet(0, Ipv4Addr::new(1, 1, 1, 1)), iface.clone(), 0, 1440, &mut rng);
    q.cancel_interface(&iface);
    let ready = q.poll(1000);
    assert!(ready.is_empty());
  }
}
