//! DNS questions, including the mDNS unicast-response top-bit convention
//! (RFC 6762 §5.4, §18.12).

use crate::class::DnsClass;
use crate::error::ProtoError;
use crate::name::{CompressionMap, Name};
use crate::record::RecordType;

const U16_LEN: usize = 2;
/// Bytes occupied by qtype + qclass, excluding the name.
const QUESTION_FIXED_LEN: usize = U16_LEN + U16_LEN;

/// A single question in a DNS message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
  name: Name,
  qtype: RecordType,
  class: DnsClass,
  unicast_response: bool,
}

impl Question {
  /// Builds a question. `unicast_response` sets the top bit of the
  /// qclass field, requesting a unicast rather than multicast reply
  /// (RFC 6762 §5.4).
  #[inline]
  pub const fn new(name: Name, qtype: RecordType, unicast_response: bool) -> Self {
    Self {
      name,
      qtype,
      class: DnsClass::In,
      unicast_response,
    }
  }

  /// The question's name.
  #[inline]
  pub const fn name(&self) -> &Name {
    &self.name
  }

  /// The question's type.
  #[inline]
  pub const fn qtype(&self) -> RecordType {
    self.qtype
  }

  /// Whether a unicast reply was requested.
  #[inline]
  pub const fn unicast_response(&self) -> bool {
    self.unicast_response
  }

  /// Encodes this question at `pos`, using `cmap` for name compression.
  pub fn encode(&self, buf: &mut Vec<u8>, pos: usize, cmap: &mut CompressionMap) -> usize {
    let start = buf.len();
    self.name.encode(buf, pos, cmap);
    buf.extend_from_slice(&self.qtype.value().to_be_bytes());
    let qclass = self.class.to_wire(self.unicast_response);
    buf.extend_from_slice(&qclass.to_be_bytes());
    buf.len() - start
  }

  /// Upper-bound (uncompressed) encoded length of this question.
  #[inline]
  pub fn uncompressed_len(&self) -> usize {
    self.name.uncompressed_len() + QUESTION_FIXED_LEN
  }

  /// Decodes one question at `off` in `msg`. Returns the question and the
  /// offset immediately following it.
  pub fn decode(msg: &[u8], off: usize) -> Result<(Self, usize), ProtoError> {
    let (name, off) = Name::decode(msg, off)?;
    if msg.len() < off + QUESTION_FIXED_LEN {
      return Err(ProtoError::BufferTooSmall("question"));
    }
    let qtype = RecordType::from(u16::from_be_bytes([msg[off], msg[off + 1]]));
    let raw_class = u16::from_be_bytes([msg[off + 2], msg[off + 3]]);
    let (class, unicast_response) = DnsClass::from_wire(raw_class);
    Ok((
      Self {
        name,
        qtype,
        class,
        unicast_response,
      },
      off + QUESTION_FIXED_LEN,
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encode_sets_unicast_bit_in_qclass() {
    let q = Question::new(Name::parse("printer.local").unwrap(), RecordType::ANY, true);
    let mut buf = Vec::new();
    let mut cmap = CompressionMap::new();
    q.encode(&mut buf, 0, &mut cmap);
    let (decoded, consumed) = Question::decode(&buf, 0).unwrap();
    assert_eq!(consumed, buf.len());
    assert_eq!(decoded, q);
    assert!(decoded.unicast_response());
  }

  #[test]
  fn decode_without_unicast_bit() {
    let q = Question::new(Name::parse("printer.local").unwrap(), RecordType::PTR, false);
    let mut buf = Vec::new();
    let mut cmap = CompressionMap::new();
    q.encode(&mut buf, 0, &mut cmap);
    let (decoded, _) = Question::decode(&buf, 0).unwrap();
    assert!(!decoded.unicast_response());
  }
}
