//! Scenario 2 (spec.md §8): known-answer splitting across multiple
//! query packets, with every non-final packet truncated and the
//! original answer list recoverable in ascending-length order from the
//! concatenation of the fragments.

use crate::name::Name;
use crate::packet::build_query;
use crate::question::Question;
use crate::record::{RData, Record, RecordHeader, RecordType};
use smallvec_wrapper::TinyVec;

fn ptr_answer(target: &str) -> Record {
  Record::new(
    RecordHeader::new(Name::parse("_hap._tcp.local").unwrap(), 4500),
    RData::Ptr(Name::parse(target).unwrap()),
  )
}

#[test]
fn fragments_are_truncated_and_recombine_in_ascending_length_order() {
  // Two length classes, interleaved on input so the splitter's sort is
  // actually exercised rather than a no-op on already-sorted input.
  let mut known_answers: TinyVec<Record> = TinyVec::new();
  for i in 0..150 {
    known_answers.push(ptr_answer(&format!(
      "long-device-name-{i:03}._hap._tcp.local"
    )));
    known_answers.push(ptr_answer(&format!("d{i:03}._hap._tcp.local")));
  }
  let shorts: Vec<_> = known_answers
    .iter()
    .filter(|r| r.uncompressed_len() == ptr_answer("d000._hap._tcp.local").uncompressed_len())
    .cloned()
    .collect();
  let longs: Vec<_> = known_answers
    .iter()
    .filter(|r| {
      r.uncompressed_len()
        == ptr_answer("long-device-name-000._hap._tcp.local").uncompressed_len()
    })
    .cloned()
    .collect();

  let questions = TinyVec::from_iter([Question::new(
    Name::parse("_hap._tcp.local").unwrap(),
    RecordType::PTR,
    false,
  )]);
  let packets = build_query(0, questions, known_answers, 1440).unwrap();
  assert!(packets.len() >= 11, "expected >= 11 packets, got {}", packets.len());

  let last = packets.len() - 1;
  for (i, pkt) in packets.iter().enumerate() {
    assert_eq!(pkt.header().tc, i != last, "packet {i} tc flag");
  }
  assert_eq!(packets[0].questions().len(), 1, "question rides only the primary packet");

  let recombined: Vec<Record> = packets.iter().flat_map(|p| p.answers().to_vec()).collect();
  assert_eq!(recombined.len(), shorts.len() + longs.len());
  // Stable ascending sort by uncompressed length groups all the shorts
  // (emitted first, in their original relative order) ahead of all the
  // longs.
  assert_eq!(&recombined[..shorts.len()], shorts.as_slice());
  assert_eq!(&recombined[shorts.len()..], longs.as_slice());
}
