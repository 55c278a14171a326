//! Per-type resource record data (spec §3, §4.2).

use std::net::{Ipv4Addr, Ipv6Addr};

use smallvec_wrapper::TinyVec;

use super::RecordType;
use crate::error::{BuildError, ProtoError};
use crate::name::{CompressionMap, Name};

const IPV4_LEN: usize = 4;
const IPV6_LEN: usize = 16;
const SRV_FIXED_LEN: usize = 6; // priority + weight + port

/// The typed payload of a resource record.
///
/// `Srv`'s target is encoded without compression whenever the enclosing
/// packet is legacy-unicast (RFC 2782: "name compression is not to be
/// used for this field" combined with RFC 6762 §6.2's legacy-unicast
/// carve-out).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RData {
  /// A 4-byte IPv4 address.
  A(Ipv4Addr),
  /// A 16-byte IPv6 address.
  Aaaa(Ipv6Addr),
  /// A pointer to another name, subject to compression.
  Ptr(Name),
  /// An alias to another name, subject to compression.
  Cname(Name),
  /// A service locator record.
  Srv {
    /// Lower values are tried first.
    priority: u16,
    /// Relative weight among equal-priority targets.
    weight: u16,
    /// The port the service listens on.
    port: u16,
    /// The target host name.
    target: Name,
  },
  /// An ordered list of character strings, each at most 255 bytes, whose
  /// total rdata length is at most 65535 bytes.
  Txt(TinyVec<Box<[u8]>>),
  /// A type bitmap asserting which record types exist (and by omission,
  /// which don't) for `next_name` (RFC 4034 §4.1, used negatively per RFC
  /// 6762 §6.1).
  Nsec {
    /// The name the bitmap describes; in mDNS's negative-response usage
    /// this equals the owner name of the NSEC record itself.
    next_name: Name,
    /// The record types asserted present, sorted ascending, deduplicated.
    types: TinyVec<RecordType>,
  },
  /// An EDNS0 pseudo-record (RFC 6891). The class and ttl fields are
  /// repurposed; see [`RecordHeader`](super::RecordHeader).
  Opt {
    /// Requestor's UDP payload size, carried in the class field on the
    /// wire rather than here, but mirrored for convenience.
    udp_payload_size: u16,
    /// Upper 8 bits of the 12-bit extended RCODE.
    extended_rcode: u8,
    /// EDNS version.
    version: u8,
    /// DNSSEC OK bit.
    dnssec_ok: bool,
    /// Raw concatenated `(option-code, option-length, option-data)` TLVs,
    /// passed through uninterpreted.
    options: TinyVec<u8>,
  },
  /// Any other record type, preserved as an opaque byte string.
  Unknown {
    /// The wire type value.
    ty: u16,
    /// The raw rdata bytes.
    bytes: TinyVec<u8>,
  },
}

impl RData {
  /// The [`RecordType`] this payload corresponds to.
  #[inline]
  pub fn record_type(&self) -> RecordType {
    match self {
      Self::A(_) => RecordType::A,
      Self::Aaaa(_) => RecordType::AAAA,
      Self::Ptr(_) => RecordType::PTR,
      Self::Cname(_) => RecordType::CNAME,
      Self::Srv { .. } => RecordType::SRV,
      Self::Txt(_) => RecordType::TXT,
      Self::Nsec { .. } => RecordType::NSEC,
      Self::Opt { .. } => RecordType::OPT,
      Self::Unknown { ty, .. } => RecordType::from(*ty),
    }
  }

  /// Whether this rdata's embedded name (if any) must never be compressed
  /// when `legacy_unicast` is set (only SRV targets are affected).
  #[inline]
  fn target_is_compressible(&self, legacy_unicast: bool) -> bool {
    !(matches!(self, Self::Srv { .. }) && legacy_unicast)
  }

  /// Encodes this rdata (without the 2-byte rdlength prefix, which the
  /// caller writes after learning the length) at `pos` in the message
  /// under construction.
  pub fn encode(
    &self,
    buf: &mut Vec<u8>,
    pos: usize,
    cmap: &mut CompressionMap,
    legacy_unicast: bool,
  ) -> Result<usize, BuildError> {
    let start = buf.len();
    match self {
      Self::A(addr) => buf.extend_from_slice(&addr.octets()),
      Self::Aaaa(addr) => buf.extend_from_slice(&addr.octets()),
      Self::Ptr(name) | Self::Cname(name) => {
        name.encode(buf, pos, cmap);
      }
      Self::Srv {
        priority,
        weight,
        port,
        target,
      } => {
        buf.extend_from_slice(&priority.to_be_bytes());
        buf.extend_from_slice(&weight.to_be_bytes());
        buf.extend_from_slice(&port.to_be_bytes());
        if self.target_is_compressible(legacy_unicast) {
          target.encode(buf, pos + SRV_FIXED_LEN, cmap);
        } else {
          target.encode_uncompressed(buf);
        }
      }
      Self::Txt(strings) => encode_txt(strings, buf)?,
      Self::Nsec { next_name, types } => {
        next_name.encode_uncompressed(buf);
        encode_type_bitmap(types, buf);
      }
      Self::Opt { options, .. } => {
        buf.extend_from_slice(options);
      }
      Self::Unknown { bytes, .. } => buf.extend_from_slice(bytes),
    }
    Ok(buf.len() - start)
  }

  /// Encodes this rdata in canonical form: names lowercased and never
  /// compressed (spec §4.5). Used only for probe tiebreaking comparisons.
  pub fn encode_canonical(&self, buf: &mut Vec<u8>) {
    match self {
      Self::A(addr) => buf.extend_from_slice(&addr.octets()),
      Self::Aaaa(addr) => buf.extend_from_slice(&addr.octets()),
      Self::Ptr(name) | Self::Cname(name) => encode_lowercased(name, buf),
      Self::Srv {
        priority,
        weight,
        port,
        target,
      } => {
        buf.extend_from_slice(&priority.to_be_bytes());
        buf.extend_from_slice(&weight.to_be_bytes());
        buf.extend_from_slice(&port.to_be_bytes());
        encode_lowercased(target, buf);
      }
      Self::Txt(strings) => {
        let _ = encode_txt(strings, buf);
      }
      Self::Nsec { next_name, types } => {
        encode_lowercased(next_name, buf);
        encode_type_bitmap(types, buf);
      }
      Self::Opt { options, .. } => buf.extend_from_slice(options),
      Self::Unknown { bytes, .. } => buf.extend_from_slice(bytes),
    }
  }

  /// Upper-bound (uncompressed) byte length of this rdata, used for the
  /// packet's incremental size estimate.
  pub fn uncompressed_len(&self) -> usize {
    match self {
      Self::A(_) => IPV4_LEN,
      Self::Aaaa(_) => IPV6_LEN,
      Self::Ptr(name) | Self::Cname(name) => name.uncompressed_len(),
      Self::Srv { target, .. } => SRV_FIXED_LEN + target.uncompressed_len(),
      Self::Txt(strings) => txt_len(strings),
      Self::Nsec { next_name, types } => next_name.uncompressed_len() + type_bitmap_len(types),
      Self::Opt { options, .. } => options.len(),
      Self::Unknown { bytes, .. } => bytes.len(),
    }
  }

  /// Decodes rdata of the given `ty` occupying exactly `rdata[..]` (the
  /// slice already sliced to `rdlength`), with `msg` the whole message
  /// (needed so embedded names can follow compression pointers) and
  /// `rdata_off` the rdata's own start offset within `msg`.
  pub fn decode(
    ty: RecordType,
    msg: &[u8],
    rdata_off: usize,
    rdlen: usize,
  ) -> Result<Self, ProtoError> {
    let rdata = msg
      .get(rdata_off..rdata_off + rdlen)
      .ok_or(ProtoError::MalformedRecord("rdata shorter than rdlength"))?;
    Ok(match ty {
      RecordType::A => {
        let octets: [u8; IPV4_LEN] = rdata
          .try_into()
          .map_err(|_| ProtoError::MalformedRecord("A"))?;
        Self::A(Ipv4Addr::from(octets))
      }
      RecordType::AAAA => {
        let octets: [u8; IPV6_LEN] = rdata
          .try_into()
          .map_err(|_| ProtoError::MalformedRecord("AAAA"))?;
        Self::Aaaa(Ipv6Addr::from(octets))
      }
      RecordType::PTR => {
        let (name, _) = Name::decode(msg, rdata_off)?;
        Self::Ptr(name)
      }
      RecordType::CNAME => {
        let (name, _) = Name::decode(msg, rdata_off)?;
        Self::Cname(name)
      }
      RecordType::SRV => {
        if rdata.len() < SRV_FIXED_LEN {
          return Err(ProtoError::MalformedRecord("SRV"));
        }
        let priority = u16::from_be_bytes([rdata[0], rdata[1]]);
        let weight = u16::from_be_bytes([rdata[2], rdata[3]]);
        let port = u16::from_be_bytes([rdata[4], rdata[5]]);
        let (target, _) = Name::decode(msg, rdata_off + SRV_FIXED_LEN)?;
        Self::Srv {
          priority,
          weight,
          port,
          target,
        }
      }
      RecordType::TXT => Self::Txt(decode_txt(rdata)?),
      RecordType::NSEC => {
        let (next_name, consumed) = Name::decode(msg, rdata_off)?;
        let bitmap_off = consumed - rdata_off;
        let bitmap = rdata
          .get(bitmap_off..)
          .ok_or(ProtoError::MalformedRecord("NSEC next_name exceeds rdlength"))?;
        let types = decode_type_bitmap(bitmap)?;
        Self::Nsec { next_name, types }
      }
      RecordType::OPT => Self::Opt {
        udp_payload_size: 0,
        extended_rcode: 0,
        version: 0,
        dnssec_ok: false,
        options: rdata.iter().copied().collect(),
      },
      RecordType::ANY => return Err(ProtoError::MalformedRecord("ANY is not a valid rdata type")),
      RecordType::Unknown(raw) => Self::Unknown {
        ty: raw,
        bytes: rdata.iter().copied().collect(),
      },
    })
  }
}

fn encode_lowercased(name: &Name, buf: &mut Vec<u8>) {
  for label in name.labels() {
    buf.push(label.len() as u8);
    buf.extend(label.iter().map(|b| b.to_ascii_lowercase()));
  }
  buf.push(0);
}

fn encode_txt(strings: &[Box<[u8]>], buf: &mut Vec<u8>) -> Result<(), BuildError> {
  if strings.is_empty() {
    buf.push(0);
    return Ok(());
  }
  for s in strings {
    if s.len() > u8::MAX as usize {
      return Err(BuildError::Overflow { field: "TXT string" });
    }
    buf.push(s.len() as u8);
    buf.extend_from_slice(s);
  }
  Ok(())
}

fn txt_len(strings: &[Box<[u8]>]) -> usize {
  if strings.is_empty() {
    1
  } else {
    strings.iter().map(|s| s.len() + 1).sum()
  }
}

fn decode_txt(rdata: &[u8]) -> Result<TinyVec<Box<[u8]>>, ProtoError> {
  let mut out = TinyVec::new();
  let mut i = 0;
  while i < rdata.len() {
    let len = rdata[i] as usize;
    i += 1;
    if i + len > rdata.len() {
      return Err(ProtoError::TxtTooLong);
    }
    if len > 0 {
      out.push(rdata[i..i + len].to_vec().into_boxed_slice());
    }
    i += len;
  }
  Ok(out)
}

fn encode_type_bitmap(types: &[RecordType], buf: &mut Vec<u8>) {
  let mut values: Vec<u16> = types.iter().map(|t| t.value()).collect();
  values.sort_unstable();
  values.dedup();

  let mut i = 0;
  while i < values.len() {
    let window = (values[i] >> 8) as u8;
    let mut bitmap = [0u8; 32];
    let mut max_byte = 0usize;
    while i < values.len() && (values[i] >> 8) as u8 == window {
      let lower = (values[i] & 0xff) as usize;
      let byte_idx = lower / 8;
      bitmap[byte_idx] |= 1 << (7 - (lower % 8));
      max_byte = max_byte.max(byte_idx);
      i += 1;
    }
    buf.push(window);
    buf.push((max_byte + 1) as u8);
    buf.extend_from_slice(&bitmap[..max_byte + 1]);
  }
}

fn type_bitmap_len(types: &[RecordType]) -> usize {
  let mut buf = Vec::new();
  encode_type_bitmap(types, &mut buf);
  buf.len()
}

fn decode_type_bitmap(bytes: &[u8]) -> Result<TinyVec<RecordType>, ProtoError> {
  let mut out = TinyVec::new();
  let mut i = 0;
  while i < bytes.len() {
    if i + 2 > bytes.len() {
      return Err(ProtoError::MalformedRecord("NSEC bitmap window header"));
    }
    let window = bytes[i] as u16;
    let len = bytes[i + 1] as usize;
    i += 2;
    if i + len > bytes.len() {
      return Err(ProtoError::MalformedRecord("NSEC bitmap window body"));
    }
    for (byte_idx, byte) in bytes[i..i + len].iter().enumerate() {
      for bit in 0..8u16 {
        if byte & (1 << (7 - bit)) != 0 {
          out.push(RecordType::from((window << 8) | (byte_idx as u16 * 8 + bit)));
        }
      }
    }
    i += len;
  }
  Ok(out)
}
