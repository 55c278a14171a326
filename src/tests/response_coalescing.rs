//! Scenario 3 (spec.md §8): two compatible responses enqueued 30ms
//! apart on the same interface coalesce into a single transmission
//! whose answers are the union of both, without exceeding the 500ms
//! delay cap measured from the earlier response's creation time.

use crate::name::Name;
use crate::packet::{Header, Packet};
use crate::queue::{ResponseQueue, MAX_DELAY_MS};
use crate::random::RandomSource;
use crate::record::{RData, Record, RecordHeader};
use crate::transport::InterfaceId;
use std::net::Ipv4Addr;

struct FixedRandom(f64);
impl RandomSource for FixedRandom {
  fn uniform(&mut self) -> f64 {
    self.0
  }
}

fn response_with(addr: Ipv4Addr) -> Packet {
  let mut p = Packet::new(Header::response(0));
  p.add_answer(Record::new(
    RecordHeader::new(Name::parse("printer.local").unwrap(), 120),
    RData::A(addr),
  ));
  p
}

#[test]
fn compatible_responses_coalesce_within_the_delay_cap() {
  let mut queue = ResponseQueue::new();
  let mut random = FixedRandom(0.0); // minimum 20ms delay each
  let iface = InterfaceId::new("eth0");

  // A at t=0 (scheduled for t=20), B at t=30 (scheduled for t=50): the
  // later-scheduled entry survives a merge and absorbs the earlier one
  // (spec.md §4.4).
  queue.enqueue(response_with(Ipv4Addr::new(10, 0, 0, 1)), iface.clone(), 0, 1440, &mut random);
  queue.enqueue(response_with(Ipv4Addr::new(10, 0, 0, 2)), iface.clone(), 30, 1440, &mut random);

  assert_eq!(queue.len(), 1, "compatible entries merge into one pending transmission");

  let ready = queue.poll(49);
  assert!(ready.is_empty(), "must not fire before its scheduled time");
  let ready = queue.poll(50);
  assert_eq!(ready.len(), 1);

  let merged = &ready[0];
  assert_eq!(merged.interface(), &iface);
  assert_eq!(merged.created_at_ms(), 0, "creation time pins to the earlier entry");
  assert!(merged.scheduled_at_ms() <= 120, "spec.md §8 scenario 3: send time <= 120ms");
  assert!(merged.scheduled_at_ms() - merged.created_at_ms() <= MAX_DELAY_MS);

  let addrs: Vec<Ipv4Addr> = merged
    .packet()
    .answers()
    .iter()
    .map(|r| match r.data() {
      RData::A(addr) => *addr,
      other => panic!("expected an A record, got {other:?}"),
    })
    .collect();
  let mut sorted = addrs.clone();
  sorted.sort();
  assert_eq!(
    sorted,
    vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)],
    "merged answers are the union of A and B"
  );
}
