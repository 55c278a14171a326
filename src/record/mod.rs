//! C2: the record codec. Resource-record headers, the typed rdata
//! variants (see [`rdata`]), and canonical-form ordering for probe
//! tiebreaking (spec §4.2, §4.5).

mod rdata;
mod record_type;

pub use rdata::RData;
pub use record_type::RecordType;

use crate::class::DnsClass;
use crate::error::{BuildError, ProtoError};
use crate::name::{CompressionMap, Name};

const U16_LEN: usize = 2;
const U32_LEN: usize = 4;
/// Bytes occupied by type + class + ttl + rdlength, excluding the name.
pub const RECORD_HEADER_FIXED_LEN: usize = U16_LEN + U16_LEN + U32_LEN + U16_LEN;

/// The name/type/class/ttl fields every resource record shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
  name: Name,
  class: DnsClass,
  cache_flush: bool,
  ttl: u32,
}

impl RecordHeader {
  /// Builds a header with the cache-flush bit set and class IN, the
  /// common case for records an advertiser publishes about itself.
  #[inline]
  pub fn new(name: Name, ttl: u32) -> Self {
    Self {
      name,
      class: DnsClass::In,
      cache_flush: true,
      ttl,
    }
  }

  /// Builds a header with explicit class and cache-flush settings.
  #[inline]
  pub fn with_class(name: Name, class: DnsClass, cache_flush: bool, ttl: u32) -> Self {
    Self {
      name,
      class,
      cache_flush,
      ttl,
    }
  }

  /// The record's owner name.
  #[inline]
  pub const fn name(&self) -> &Name {
    &self.name
  }

  /// The record's class, with the cache-flush bit already stripped.
  #[inline]
  pub const fn class(&self) -> DnsClass {
    self.class
  }

  /// Whether the cache-flush bit is set (RFC 6762 §10.2).
  #[inline]
  pub const fn cache_flush(&self) -> bool {
    self.cache_flush
  }

  /// Time-to-live in seconds.
  #[inline]
  pub const fn ttl(&self) -> u32 {
    self.ttl
  }
}

/// A single resource record: a header plus its typed payload (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
  header: RecordHeader,
  data: RData,
}

impl Record {
  /// Builds a record from a header and its payload.
  #[inline]
  pub const fn new(header: RecordHeader, data: RData) -> Self {
    Self { header, data }
  }

  /// The record's header fields.
  #[inline]
  pub const fn header(&self) -> &RecordHeader {
    &self.header
  }

  /// The record's typed payload.
  #[inline]
  pub const fn data(&self) -> &RData {
    &self.data
  }

  /// The record's type, derived from its payload.
  #[inline]
  pub fn record_type(&self) -> RecordType {
    self.data.record_type()
  }

  /// Two records *represent the same data* when they share (name
  /// ignoring case, type, class without the cache-flush bit) — spec
  /// §4.2.
  pub fn same_identity(&self, other: &Self) -> bool {
    self.header.name.eq_ignore_case(&other.header.name)
      && self.record_type() == other.record_type()
      && self.header.class == other.header.class
  }

  /// Two records are *data-equal* when, additionally to
  /// [`same_identity`](Self::same_identity), their rdata matches exactly.
  pub fn data_equal(&self, other: &Self) -> bool {
    self.same_identity(other) && self.data == other.data
  }

  /// Encodes this record's name, type, class, ttl, rdlength, and rdata at
  /// `pos`, using `cmap` for name compression. `legacy_unicast` forces
  /// uncompressed SRV targets (spec §4.1, §4.2).
  pub fn encode(
    &self,
    buf: &mut Vec<u8>,
    pos: usize,
    cmap: &mut CompressionMap,
    legacy_unicast: bool,
  ) -> Result<usize, BuildError> {
    let start = buf.len();
    let name_len = self.header.name.encode(buf, pos, cmap);

    buf.extend_from_slice(&self.record_type().value().to_be_bytes());
    let class_wire = self.header.class.to_wire(self.header.cache_flush);
    buf.extend_from_slice(&class_wire.to_be_bytes());
    buf.extend_from_slice(&self.header.ttl.to_be_bytes());

    let rdlen_at = buf.len();
    buf.extend_from_slice(&[0, 0]); // patched below

    let rdata_pos = pos + name_len + RECORD_HEADER_FIXED_LEN;
    let rdlen = self.data.encode(buf, rdata_pos, cmap, legacy_unicast)?;
    if rdlen > u16::MAX as usize {
      return Err(BuildError::Overflow { field: "rdlength" });
    }
    buf[rdlen_at..rdlen_at + 2].copy_from_slice(&(rdlen as u16).to_be_bytes());

    Ok(buf.len() - start)
  }

  /// Upper-bound (uncompressed) encoded length of this record.
  pub fn uncompressed_len(&self) -> usize {
    self.header.name.uncompressed_len() + RECORD_HEADER_FIXED_LEN + self.data.uncompressed_len()
  }

  /// Builds this record's canonical-form bytes for probe tiebreaking:
  /// class, then type, then rdata with embedded names lowercased and
  /// never compressed (spec §4.5).
  pub fn canonical_bytes(&self, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&self.header.class.value().to_be_bytes());
    buf.extend_from_slice(&self.record_type().value().to_be_bytes());
    self.data.encode_canonical(buf);
  }

  /// Decodes one resource record at `off` in `msg`. Returns the record
  /// and the offset immediately following it.
  pub fn decode(msg: &[u8], off: usize) -> Result<(Self, usize), ProtoError> {
    let (name, off) = Name::decode(msg, off)?;
    if msg.len() < off + RECORD_HEADER_FIXED_LEN {
      return Err(ProtoError::BufferTooSmall("record header"));
    }
    let ty = RecordType::from(u16::from_be_bytes([msg[off], msg[off + 1]]));
    let raw_class = u16::from_be_bytes([msg[off + 2], msg[off + 3]]);
    let (class, cache_flush) = DnsClass::from_wire(raw_class);
    let ttl = u32::from_be_bytes(msg[off + 4..off + 8].try_into().unwrap());
    let rdlen = u16::from_be_bytes([msg[off + 8], msg[off + 9]]) as usize;
    let rdata_off = off + RECORD_HEADER_FIXED_LEN;
    if msg.len() < rdata_off + rdlen {
      return Err(ProtoError::MalformedRecord("rdlength exceeds buffer"));
    }

    let data = RData::decode(ty, msg, rdata_off, rdlen)?;
    let header = RecordHeader {
      name,
      class,
      cache_flush,
      ttl,
    };
    Ok((Self { header, data }, rdata_off + rdlen))
  }
}

/// Sorts `records` in place by canonical order: class, then type, then
/// canonical rdata bytes (spec §4.5, invariant 5). This is the order the
/// prober both transmits authority records in and compares them in
/// during tiebreaking.
pub fn sort_canonical(records: &mut [Record]) {
  records.sort_by(|a, b| {
    let mut ab = Vec::new();
    let mut bb = Vec::new();
    a.canonical_bytes(&mut ab);
    b.canonical_bytes(&mut bb);
    ab.cmp(&bb)
  });
}

/// Sorts `records` by canonical order and concatenates their canonical
/// bytes, producing the byte string two probers compare during
/// simultaneous-probe tiebreaking (spec §4.5).
pub fn canonical_concat(records: &[Record]) -> Vec<u8> {
  let mut sorted = records.to_vec();
  sort_canonical(&mut sorted);
  let mut out = Vec::new();
  for r in &sorted {
    r.canonical_bytes(&mut out);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::Ipv4Addr;

  fn a_record(label: &str, addr: Ipv4Addr) -> Record {
    Record::new(
      RecordHeader::new(Name::parse(label).unwrap(), 120),
      RData::A(addr),
    )
  }

  #[test]
  fn same_identity_ignores_case_and_ttl() {
    let a = Record::new(
      RecordHeader::new(Name::parse("Host.Local").unwrap(), 120),
      RData::A(Ipv4Addr::new(10, 0, 0, 1)),
    );
    let b = Record::new(
      RecordHeader::new(Name::parse("host.local").unwrap(), 4500),
      RData::A(Ipv4Addr::new(10, 0, 0, 1)),
    );
    assert!(a.same_identity(&b));
    assert!(a.data_equal(&b));
  }

  #[test]
  fn data_inequal_when_rdata_differs() {
    let a = a_record("host.local", Ipv4Addr::new(10, 0, 0, 1));
    let b = a_record("host.local", Ipv4Addr::new(10, 0, 0, 2));
    assert!(a.same_identity(&b));
    assert!(!a.data_equal(&b));
  }

  #[test]
  fn encode_decode_round_trips() {
    let rec = a_record("printer.local", Ipv4Addr::new(192, 168, 1, 5));
    let mut buf = Vec::new();
    let mut cmap = CompressionMap::new();
    let written = rec.encode(&mut buf, 0, &mut cmap, false).unwrap();
    assert_eq!(written, buf.len());
    let (decoded, consumed) = Record::decode(&buf, 0).unwrap();
    assert_eq!(consumed, buf.len());
    assert!(decoded.data_equal(&rec));
    assert!(decoded.header().cache_flush());
  }

  #[test]
  fn canonical_order_is_deterministic() {
    let a = a_record("x.local", Ipv4Addr::new(1, 1, 1, 1));
    let b = a_record("x.local", Ipv4Addr::new(1, 1, 1, 2));
    let ab = canonical_concat(&[a.clone(), b.clone()]);
    let ba = canonical_concat(&[b, a]);
    assert_eq!(ab, ba);
  }
}
