use smol_str::SmolStr;

use crate::name::MAX_DOMAIN_NAME_WIRE_OCTETS;

/// Errors raised while decoding a wire-format mDNS message.
///
/// These are always *local recoveries*: the caller drops the offending
/// datagram and the responder keeps running (see spec.md §7).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ProtoError {
  /// A label length byte had an unknown reserved top-bit pattern (`0b01` or
  /// `0b10`).
  #[error("invalid label length byte")]
  InvalidLabel,
  /// A compression pointer pointed forward or at/after its own offset.
  #[error("compression pointer does not point backwards")]
  ForwardPointer,
  /// More than [`MAX_COMPRESSION_POINTERS`](crate::name::MAX_COMPRESSION_POINTERS) pointers were
  /// followed while decoding a single name.
  #[error("too many compression pointers")]
  TooManyPointers,
  /// The decoded name exceeded [`MAX_DOMAIN_NAME_WIRE_OCTETS`] bytes.
  #[error("name exceeds maximum length of {MAX_DOMAIN_NAME_WIRE_OCTETS} bytes")]
  NameTooLong,
  /// The buffer ended before a length-prefixed field was fully present.
  #[error("buffer too small to decode {0}")]
  BufferTooSmall(&'static str),
  /// A record's `rdlength` disagreed with the bytes actually available.
  #[error("malformed record data for {0}")]
  MalformedRecord(&'static str),
  /// A TXT string or the whole TXT rdata exceeded its length limit.
  #[error("TXT record data is too long")]
  TxtTooLong,
  /// Bytes remained in the buffer after every declared section was decoded.
  #[error("{0} trailing bytes after decoding message")]
  TrailingGarbage(usize),
  /// An unrecognized record type or class value was encountered where a
  /// known value was required.
  #[error("unknown {kind} value: {value}")]
  Unknown {
    /// `"record type"` or `"class"`.
    kind: &'static str,
    /// The raw wire value.
    value: u16,
  },
}

/// Errors raised while *building* an outgoing packet (spec.md §4.3, §7).
///
/// Unlike [`ProtoError`], these are fatal to the operation: the caller
/// cannot recover by retrying with the same inputs and must decompose the
/// record set or raise the payload cap.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum BuildError {
  /// The question section alone exceeded `udp_payload_size`.
  #[error("query section of {len} bytes exceeds the {cap} byte payload cap")]
  QuerySectionTooLarge {
    /// Size in bytes of the encoded question section.
    len: usize,
    /// The configured payload cap.
    cap: usize,
  },
  /// A probe's authority section did not fit and probes are not fragmented
  /// (spec.md §4.3: "this case is not handled by splitting").
  #[error("probe authority section of {len} bytes exceeds the {cap} byte payload cap")]
  ProbeTooLarge {
    /// Size in bytes of the encoded authority section.
    len: usize,
    /// The configured payload cap.
    cap: usize,
  },
  /// A response did not fit after real compression and the caller must
  /// decompose the record set themselves.
  #[error("response of {len} bytes exceeds the {cap} byte payload cap")]
  ResponseTooLarge {
    /// Size in bytes of the encoded response.
    len: usize,
    /// The configured payload cap.
    cap: usize,
  },
  /// A name could not be encoded (e.g. it is not a fully-qualified domain
  /// name where one was required).
  #[error("{0}")]
  Name(#[from] NameError),
  /// An rdata field overflowed its wire representation (e.g. TXT rdata
  /// longer than 65535 bytes).
  #[error("{field} overflows its wire representation")]
  Overflow {
    /// Name of the field that overflowed.
    field: &'static str,
  },
}

/// Errors raised while constructing or appending to a [`crate::name::Name`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum NameError {
  /// A label was empty or longer than 63 bytes.
  #[error("label {0:?} is not 1-63 bytes")]
  InvalidLabel(SmolStr),
  /// The fully-qualified wire length would exceed 255 bytes.
  #[error("name exceeds maximum length of {MAX_DOMAIN_NAME_WIRE_OCTETS} bytes")]
  TooLong,
}

/// Errors the [`crate::prober::Prober`] state machine can report to its
/// caller (spec.md §4.5, §7). Conflicts and lost tiebreaks are *not*
/// errors — only the terminal 60s timeout is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("probing timed out after 60s without resolving a unique name")]
pub struct ProbeTimeout;
