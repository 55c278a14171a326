//! C3: the packet codec. The 12-byte DNS header, the four record
//! sections, query fragmentation, response building, and the
//! combine-compatibility check the response queue relies on (spec §4.3).

use smallvec_wrapper::TinyVec;

use crate::class::DnsClass;
use crate::error::{BuildError, ProtoError};
use crate::name::CompressionMap;
use crate::question::Question;
use crate::record::Record;
use crate::MESSAGE_HEADER_SIZE;

const QDCOUNT_OFFSET: usize = 4;
const ANCOUNT_OFFSET: usize = 6;
const NSCOUNT_OFFSET: usize = 8;
const ARCOUNT_OFFSET: usize = 10;

const QR_BIT: u16 = 1 << 15;
const OPCODE_SHIFT: u16 = 11;
const OPCODE_MASK: u16 = 0b1111;
const AA_BIT: u16 = 1 << 10;
const TC_BIT: u16 = 1 << 9;
const RD_BIT: u16 = 1 << 8;
const RA_BIT: u16 = 1 << 7;
const Z_BIT: u16 = 1 << 6;
const AD_BIT: u16 = 1 << 5;
const CD_BIT: u16 = 1 << 4;
const RCODE_MASK: u16 = 0b1111;

/// The 12-byte DNS message header, minus the section counts (which are
/// derived from the packet's sections at encode time rather than stored
/// redundantly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
  /// Transaction id. Zero for multicast queries/responses; mirrored from
  /// the request for legacy unicast (spec §6).
  pub id: u16,
  /// Whether this message is a response (`QR` bit).
  pub qr: bool,
  /// 4-bit opcode, always 0 (standard query) in mDNS.
  pub opcode: u8,
  /// Authoritative-answer bit. Set on every response this crate builds
  /// (spec §4.3).
  pub aa: bool,
  /// Truncation bit: more known-answer packets follow.
  pub tc: bool,
  /// Recursion-desired bit, unused by mDNS but preserved on the wire.
  pub rd: bool,
  /// Recursion-available bit, unused by mDNS but preserved on the wire.
  pub ra: bool,
  /// Reserved bit, must be zero per RFC 1035 but preserved on decode.
  pub z: bool,
  /// Authentic-data bit (RFC 4035), unused by mDNS but preserved.
  pub ad: bool,
  /// Checking-disabled bit (RFC 4035), unused by mDNS but preserved.
  pub cd: bool,
  /// 4-bit response code.
  pub rcode: u8,
}

impl Header {
  /// A header for an outgoing query: `QR=0`, all other flags clear.
  #[inline]
  pub const fn query(id: u16) -> Self {
    Self {
      id,
      qr: false,
      opcode: 0,
      aa: false,
      tc: false,
      rd: false,
      ra: false,
      z: false,
      ad: false,
      cd: false,
      rcode: 0,
    }
  }

  /// A header for an outgoing response: `QR=1`, `AA=1` (spec §4.3:
  /// "Responses always set AA").
  #[inline]
  pub const fn response(id: u16) -> Self {
    Self {
      id,
      qr: true,
      opcode: 0,
      aa: true,
      tc: false,
      rd: false,
      ra: false,
      z: false,
      ad: false,
      cd: false,
      rcode: 0,
    }
  }

  fn to_wire(self) -> u16 {
    let mut flags = 0u16;
    if self.qr {
      flags |= QR_BIT;
    }
    flags |= (self.opcode as u16 & OPCODE_MASK) << OPCODE_SHIFT;
    if self.aa {
      flags |= AA_BIT;
    }
    if self.tc {
      flags |= TC_BIT;
    }
    if self.rd {
      flags |= RD_BIT;
    }
    if self.ra {
      flags |= RA_BIT;
    }
    if self.z {
      flags |= Z_BIT;
    }
    if self.ad {
      flags |= AD_BIT;
    }
    if self.cd {
      flags |= CD_BIT;
    }
    flags |= self.rcode as u16 & RCODE_MASK;
    flags
  }

  fn from_wire(id: u16, flags: u16) -> Self {
    Self {
      id,
      qr: flags & QR_BIT != 0,
      opcode: ((flags >> OPCODE_SHIFT) & OPCODE_MASK) as u8,
      aa: flags & AA_BIT != 0,
      tc: flags & TC_BIT != 0,
      rd: flags & RD_BIT != 0,
      ra: flags & RA_BIT != 0,
      z: flags & Z_BIT != 0,
      ad: flags & AD_BIT != 0,
      cd: flags & CD_BIT != 0,
      rcode: (flags & RCODE_MASK) as u8,
    }
  }
}

/// A complete DNS/mDNS message under construction or just decoded (spec
/// §3, §4.3).
///
/// The packet caches its own encoded length: an incremental upper-bound
/// estimate kept exact on every mutation, and a real (compressed) length
/// computed lazily and invalidated whenever a section changes. The real
/// length is always recomputed with a fresh compression map, so the
/// cache can never leak state between unrelated encodes (spec §4.3,
/// design note "mutable shared packet length cache").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
  header: Header,
  questions: TinyVec<Question>,
  answers: TinyVec<Record>,
  authorities: TinyVec<Record>,
  additionals: TinyVec<Record>,
  legacy_unicast: bool,
  estimated_len: usize,
  real_len: Option<usize>,
}

impl Packet {
  /// An empty packet with the given header.
  #[inline]
  pub fn new(header: Header) -> Self {
    Self {
      header,
      questions: TinyVec::new(),
      answers: TinyVec::new(),
      authorities: TinyVec::new(),
      additionals: TinyVec::new(),
      legacy_unicast: false,
      estimated_len: MESSAGE_HEADER_SIZE,
      real_len: Some(MESSAGE_HEADER_SIZE),
    }
  }

  /// Marks this packet as using legacy-unicast encoding: the id is
  /// mirrored from the request and SRV targets are encoded uncompressed
  /// (spec §4.1, §6).
  #[inline]
  pub fn set_legacy_unicast(&mut self, legacy_unicast: bool) {
    self.legacy_unicast = legacy_unicast;
  }

  /// Whether this packet uses legacy-unicast encoding.
  #[inline]
  pub const fn legacy_unicast(&self) -> bool {
    self.legacy_unicast
  }

  /// The packet's header.
  #[inline]
  pub const fn header(&self) -> &Header {
    &self.header
  }

  /// Mutable access to the header, e.g. to set the `TC` bit during query
  /// fragmentation.
  #[inline]
  pub fn header_mut(&mut self) -> &mut Header {
    &mut self.header
  }

  /// The question section.
  #[inline]
  pub fn questions(&self) -> &[Question] {
    &self.questions
  }

  /// The answer section.
  #[inline]
  pub fn answers(&self) -> &[Record] {
    &self.answers
  }

  /// The authority section.
  #[inline]
  pub fn authorities(&self) -> &[Record] {
    &self.authorities
  }

  /// The additional section.
  #[inline]
  pub fn additionals(&self) -> &[Record] {
    &self.additionals
  }

  /// Appends a question, updating the length estimate.
  pub fn add_question(&mut self, question: Question) {
    self.estimated_len += question.uncompressed_len();
    self.questions.push(question);
    self.real_len = None;
  }

  /// Appends an answer, updating the length estimate.
  pub fn add_answer(&mut self, record: Record) {
    self.estimated_len += record.uncompressed_len();
    self.answers.push(record);
    self.real_len = None;
  }

  /// Appends an authority record, updating the length estimate.
  pub fn add_authority(&mut self, record: Record) {
    self.estimated_len += record.uncompressed_len();
    self.authorities.push(record);
    self.real_len = None;
  }

  /// Appends an additional record, updating the length estimate.
  pub fn add_additional(&mut self, record: Record) {
    self.estimated_len += record.uncompressed_len();
    self.additionals.push(record);
    self.real_len = None;
  }

  fn pop_answer(&mut self) -> Option<Record> {
    let record = self.answers.pop();
    if let Some(r) = &record {
      self.estimated_len -= r.uncompressed_len();
    }
    self.real_len = None;
    record
  }

  /// The incremental upper-bound length estimate. Cheap; never encodes.
  #[inline]
  pub const fn estimated_len(&self) -> usize {
    self.estimated_len
  }

  /// The real, compressed encoded length, computed with a fresh
  /// compression map and cached until the next mutation.
  pub fn real_len(&mut self) -> usize {
    if let Some(len) = self.real_len {
      return len;
    }
    let mut buf = Vec::new();
    // A field that overflows its wire representation (e.g. an rdlength
    // past 65535) makes this packet unsendable regardless of cap, so
    // report its length as unbounded rather than propagating the error
    // through every caller of real_len().
    let len = self.encode(&mut buf).map(|_| buf.len()).unwrap_or(usize::MAX);
    self.real_len = Some(len);
    len
  }

  /// Encodes the full packet (header with derived counts, then the four
  /// sections) into `buf`, using a fresh compression map.
  pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, BuildError> {
    let start = buf.len();
    buf.extend_from_slice(&self.header.id.to_be_bytes());
    buf.extend_from_slice(&self.header.to_wire().to_be_bytes());
    buf.extend_from_slice(&(self.questions.len() as u16).to_be_bytes());
    buf.extend_from_slice(&(self.answers.len() as u16).to_be_bytes());
    buf.extend_from_slice(&(self.authorities.len() as u16).to_be_bytes());
    buf.extend_from_slice(&(self.additionals.len() as u16).to_be_bytes());

    let mut cmap = CompressionMap::new();
    for q in &self.questions {
      let pos = buf.len() - start;
      q.encode(buf, pos, &mut cmap);
    }
    for r in &self.answers {
      let pos = buf.len() - start;
      r.encode(buf, pos, &mut cmap, self.legacy_unicast)?;
    }
    for r in &self.authorities {
      let pos = buf.len() - start;
      r.encode(buf, pos, &mut cmap, self.legacy_unicast)?;
    }
    for r in &self.additionals {
      let pos = buf.len() - start;
      r.encode(buf, pos, &mut cmap, self.legacy_unicast)?;
    }
    Ok(buf.len() - start)
  }

  /// Decodes a whole packet from `msg`. Errors if trailing bytes remain
  /// after every declared section is parsed (spec §7,
  /// [`TrailingGarbage`](ProtoError::TrailingGarbage)).
  ///
  /// Decode errors are local recoveries (spec §7): this only logs and
  /// returns the error, it never drops the datagram itself — that is the
  /// caller's call, since this crate owns no transport.
  pub fn decode(msg: &[u8]) -> Result<Self, ProtoError> {
    match Self::decode_inner(msg) {
      Ok(packet) => Ok(packet),
      Err(err) => {
        tracing::warn!(%err, "mdns packet: dropping malformed datagram");
        Err(err)
      }
    }
  }

  fn decode_inner(msg: &[u8]) -> Result<Self, ProtoError> {
    if msg.len() < MESSAGE_HEADER_SIZE {
      return Err(ProtoError::BufferTooSmall("header"));
    }
    let id = u16::from_be_bytes([msg[0], msg[1]]);
    let flags = u16::from_be_bytes([msg[2], msg[3]]);
    let header = Header::from_wire(id, flags);
    let qdcount = u16::from_be_bytes([msg[QDCOUNT_OFFSET], msg[QDCOUNT_OFFSET + 1]]);
    let ancount = u16::from_be_bytes([msg[ANCOUNT_OFFSET], msg[ANCOUNT_OFFSET + 1]]);
    let nscount = u16::from_be_bytes([msg[NSCOUNT_OFFSET], msg[NSCOUNT_OFFSET + 1]]);
    let arcount = u16::from_be_bytes([msg[ARCOUNT_OFFSET], msg[ARCOUNT_OFFSET + 1]]);

    let mut off = MESSAGE_HEADER_SIZE;
    let mut questions = TinyVec::new();
    for _ in 0..qdcount {
      let (q, next) = Question::decode(msg, off)?;
      questions.push(q);
      off = next;
    }
    let mut answers = TinyVec::new();
    for _ in 0..ancount {
      let (r, next) = Record::decode(msg, off)?;
      answers.push(r);
      off = next;
    }
    let mut authorities = TinyVec::new();
    for _ in 0..nscount {
      let (r, next) = Record::decode(msg, off)?;
      authorities.push(r);
      off = next;
    }
    let mut additionals = TinyVec::new();
    for _ in 0..arcount {
      let (r, next) = Record::decode(msg, off)?;
      additionals.push(r);
      off = next;
    }

    if off != msg.len() {
      return Err(ProtoError::TrailingGarbage(msg.len() - off));
    }

    let estimated_len = MESSAGE_HEADER_SIZE
      + questions.iter().map(Question::uncompressed_len).sum::<usize>()
      + answers.iter().map(Record::uncompressed_len).sum::<usize>()
      + authorities.iter().map(Record::uncompressed_len).sum::<usize>()
      + additionals.iter().map(Record::uncompressed_len).sum::<usize>();

    Ok(Self {
      header,
      questions,
      answers,
      authorities,
      additionals,
      legacy_unicast: false,
      estimated_len,
      real_len: None,
    })
  }

  /// Whether `self` and `other` may be merged into one packet (spec
  /// §4.3): same id, same `QR`, same opcode, same rcode, byte-equal
  /// flags, and the combined real length fits `cap`.
  pub fn combine_compatible(&mut self, other: &mut Self, cap: usize) -> bool {
    if self.header.id != other.header.id || self.header.to_wire() != other.header.to_wire() {
      return false;
    }
    let combined_estimate = self.estimated_len + other.estimated_len - MESSAGE_HEADER_SIZE;
    if combined_estimate <= cap {
      return true;
    }
    self.real_len() + other.real_len() - MESSAGE_HEADER_SIZE <= cap
  }

  /// Merges `other`'s sections into `self`, ORing the legacy-unicast
  /// flag, and invalidates the length cache.
  pub fn combine(&mut self, other: Self) {
    self.questions.extend(other.questions);
    self.answers.extend(other.answers);
    self.authorities.extend(other.authorities);
    self.additionals.extend(other.additionals);
    self.legacy_unicast |= other.legacy_unicast;
    self.estimated_len += other.estimated_len - MESSAGE_HEADER_SIZE;
    self.real_len = None;
  }
}

/// Fragments an outgoing query (spec §4.3 "Outbound query fragmentation").
///
/// `known_answers` is sorted ascending by uncompressed length before
/// packing. Every packet but the last has `TC=1`; the last has `TC=0`.
pub fn build_query(
  id: u16,
  questions: TinyVec<Question>,
  mut known_answers: TinyVec<Record>,
  cap: usize,
) -> Result<TinyVec<Packet>, BuildError> {
  let mut primary = Packet::new(Header::query(id));
  for q in questions {
    primary.add_question(q);
  }
  {
    let len = primary.real_len();
    if len > cap {
      return Err(BuildError::QuerySectionTooLarge { len, cap });
    }
  }

  known_answers.sort_by_key(Record::uncompressed_len);

  let mut packets = TinyVec::new();
  let mut current = primary;
  for answer in known_answers {
    let candidate_estimate = current.estimated_len() + answer.uncompressed_len();
    if candidate_estimate <= cap {
      current.add_answer(answer);
      continue;
    }

    // The estimate alone exceeds the cap, but compression may still make
    // it fit once actually encoded (spec §4.3 step 2).
    current.add_answer(answer.clone());
    if current.real_len() <= cap {
      continue;
    }
    current.pop_answer();

    current.header_mut().tc = true;
    packets.push(current);
    current = Packet::new(Header::query(id));
    current.add_answer(answer);
  }

  packets.push(current);
  Ok(packets)
}

/// Builds a single probe query packet (spec §4.5 "Probe query shape").
/// Authorities are never split across packets: if they don't fit,
/// this fails with [`ProbeTooLarge`](BuildError::ProbeTooLarge).
pub fn build_probe(
  id: u16,
  questions: [Question; 2],
  authorities: TinyVec<Record>,
  cap: usize,
) -> Result<Packet, BuildError> {
  let mut packet = Packet::new(Header::query(id));
  for q in questions {
    packet.add_question(q);
  }
  for r in authorities {
    packet.add_authority(r);
  }
  let len = packet.real_len();
  if len > cap {
    return Err(BuildError::ProbeTooLarge { len, cap });
  }
  Ok(packet)
}

/// Builds a response packet (spec §4.3 "Outbound response"). `AA` is
/// always set. A single oversize answer is allowed through alone (RFC
/// 6762 §17) when it would otherwise be the packet's only content.
pub fn build_response(
  id: u16,
  answers: TinyVec<Record>,
  additionals: TinyVec<Record>,
  cap: usize,
  legacy_unicast: bool,
) -> Result<Packet, BuildError> {
  let mut packet = Packet::new(Header::response(id));
  packet.set_legacy_unicast(legacy_unicast);
  let single_oversize_carveout = answers.len() == 1 && additionals.is_empty();
  for r in answers {
    packet.add_answer(r);
  }
  for r in additionals {
    packet.add_additional(r);
  }
  let len = packet.real_len();
  if len > cap && !single_oversize_carveout {
    return Err(BuildError::ResponseTooLarge { len, cap });
  }
  Ok(packet)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::name::Name;
  use crate::record::{RData, RecordHeader, RecordType};

  fn ptr_answer(target: &str, ttl: u32) -> Record {
    Record::new(
      RecordHeader::new(Name::parse("_hap._tcp.local").unwrap(), ttl),
      RData::Ptr(Name::parse(target).unwrap()),
    )
  }

  #[test]
  fn header_flags_round_trip() {
    let h = Header {
      id: 0x1234,
      qr: true,
      opcode: 0,
      aa: true,
      tc: false,
      rd: false,
      ra: false,
      z: false,
      ad: false,
      cd: false,
      rcode: 0,
    };
    let decoded = Header::from_wire(h.id, h.to_wire());
    assert_eq!(decoded, h);
  }

  #[test]
  fn empty_packet_is_header_size() {
    let mut p = Packet::new(Header::query(0));
    assert_eq!(p.real_len(), MESSAGE_HEADER_SIZE);
  }

  #[test]
  fn packet_round_trips() {
    let mut p = Packet::new(Header::response(0));
    p.add_answer(ptr_answer("one._hap._tcp.local", 120));
    p.add_answer(ptr_answer("two._hap._tcp.local", 120));
    let mut buf = Vec::new();
    p.encode(&mut buf).unwrap();
    let decoded = Packet::decode(&buf).unwrap();
    assert_eq!(decoded.answers().len(), 2);
    assert!(decoded.header().aa);
  }

  #[test]
  fn label_compression_shrinks_shared_suffix() {
    let mut p = Packet::new(Header::response(0));
    p.add_answer(ptr_answer("one._hap._tcp.local", 120));
    let first_len = p.real_len();
    p.add_answer(ptr_answer("two._hap._tcp.local", 120));
    let total_len = p.real_len();
    // The second PTR target's "._hap._tcp.local" suffix compresses to a
    // pointer, so appending it costs far less than the first occupied.
    assert!(total_len - first_len < first_len);
  }

  #[test]
  fn decode_rejects_trailing_garbage() {
    let mut p = Packet::new(Header::query(0));
    p.add_question(Question::new(
      Name::parse("local").unwrap(),
      RecordType::PTR,
      false,
    ));
    let mut buf = Vec::new();
    p.encode(&mut buf).unwrap();
    buf.push(0xFF);
    let err = Packet::decode(&buf).unwrap_err();
    assert_eq!(err, ProtoError::TrailingGarbage(1));
  }

  #[test]
  fn known_answer_splitting_sets_tc_on_all_but_last() {
    let questions = TinyVec::from_iter([Question::new(
      Name::parse("_hap._tcp.local").unwrap(),
      RecordType::PTR,
      false,
    )]);
    let known_answers: TinyVec<Record> = (0..300)
      .map(|i| ptr_answer(&format!("device-{i:03}._hap._tcp.local"), 4500))
      .collect();

    let packets = build_query(0, questions, known_answers, 1440).unwrap();
    assert!(packets.len() >= 11, "expected >= 11 packets, got {}", packets.len());
    let last = packets.len() - 1;
    for (i, pkt) in packets.iter().enumerate() {
      assert_eq!(pkt.header().tc, i != last, "packet {i} tc flag");
    }
  }

  #[test]
  fn probe_too_large_authorities_fail_without_splitting() {
    let questions = [
      Question::new(Name::parse("svc._hap._tcp.local").unwrap(), RecordType::ANY, true),
      Question::new(Name::parse("host.local").unwrap(), RecordType::ANY, true),
    ];
    let big_txt: TinyVec<Box<[u8]>> = (0..300)
      .map(|_| vec![b'x'; 200].into_boxed_slice())
      .collect();
    let authorities = TinyVec::from_iter([Record::new(
      RecordHeader::new(Name::parse("svc._hap._tcp.local").unwrap(), 120),
      RData::Txt(big_txt),
    )]);
    let err = build_probe(0, questions, authorities, 1440).unwrap_err();
    assert!(matches!(err, BuildError::ProbeTooLarge { .. }));
  }

  #[test]
  fn response_oversize_single_record_carveout() {
    let big_txt: TinyVec<Box<[u8]>> = (0..300)
      .map(|_| vec![b'x'; 200].into_boxed_slice())
      .collect();
    let answers = TinyVec::from_iter([Record::new(
      RecordHeader::new(Name::parse("svc._hap._tcp.local").unwrap(), 120),
      RData::Txt(big_txt),
    )]);
    let packet = build_response(0, answers, TinyVec::new(), 1440, false).unwrap();
    assert!(packet.answers().len() == 1);
  }

  #[test]
  fn combine_compatible_requires_equal_flags() {
    let mut a = Packet::new(Header::response(7));
    a.add_answer(ptr_answer("one._hap._tcp.local", 120));
    let mut b = Packet::new(Header::response(7));
    b.add_answer(ptr_answer("two._hap._tcp.local", 120));
    assert!(a.combine_compatible(&mut b, 1440));

    let mut c = Packet::new(Header::response(8));
    assert!(!a.combine_compatible(&mut c, 1440));
  }

  #[test]
  fn combine_concatenates_sections() {
    let mut a = Packet::new(Header::response(1));
    a.add_answer(ptr_answer("one._hap._tcp.local", 120));
    let mut b = Packet::new(Header::response(1));
    b.add_answer(ptr_answer("two._hap._tcp.local", 120));
    a.combine(b);
    assert_eq!(a.answers().len(), 2);
  }
}
