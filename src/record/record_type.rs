//! DNS/mDNS record type values (RFC 1035 §3.2.2, RFC 3596, RFC 2782,
//! RFC 4034, RFC 6891), restricted to the subset mDNS/DNS-SD actually use.

use core::fmt;

const A_VALUE: u16 = 1;
const CNAME_VALUE: u16 = 5;
const PTR_VALUE: u16 = 12;
const TXT_VALUE: u16 = 16;
const AAAA_VALUE: u16 = 28;
const SRV_VALUE: u16 = 33;
const NSEC_VALUE: u16 = 47;
const OPT_VALUE: u16 = 41;
const ANY_VALUE: u16 = 255;

/// A DNS record type (also used as a question's `qtype`).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[non_exhaustive]
#[allow(clippy::upper_case_acronyms)]
pub enum RecordType {
  /// RFC 1035 IPv4 address record.
  A,
  /// RFC 1035 canonical name record.
  CNAME,
  /// RFC 1035 pointer record.
  PTR,
  /// RFC 1035 text record.
  TXT,
  /// RFC 3596 IPv6 address record.
  AAAA,
  /// RFC 2782 service locator record.
  SRV,
  /// RFC 4034 next-secure record, used by mDNS to assert negative
  /// existence (RFC 6762 §6.1).
  NSEC,
  /// RFC 6891 EDNS0 pseudo-record.
  OPT,
  /// RFC 1035 wildcard matching any type, valid only as a `qtype`.
  ANY,
  /// Any other wire value, preserved verbatim.
  Unknown(u16),
}

impl RecordType {
  /// The wire value of this record type.
  #[inline]
  pub const fn value(self) -> u16 {
    match self {
      Self::A => A_VALUE,
      Self::CNAME => CNAME_VALUE,
      Self::PTR => PTR_VALUE,
      Self::TXT => TXT_VALUE,
      Self::AAAA => AAAA_VALUE,
      Self::SRV => SRV_VALUE,
      Self::NSEC => NSEC_VALUE,
      Self::OPT => OPT_VALUE,
      Self::ANY => ANY_VALUE,
      Self::Unknown(v) => v,
    }
  }

  /// A short uppercase name for this record type, mainly for logging.
  #[inline]
  pub const fn as_str(self) -> &'static str {
    match self {
      Self::A => "A",
      Self::CNAME => "CNAME",
      Self::PTR => "PTR",
      Self::TXT => "TXT",
      Self::AAAA => "AAAA",
      Self::SRV => "SRV",
      Self::NSEC => "NSEC",
      Self::OPT => "OPT",
      Self::ANY => "ANY",
      Self::Unknown(_) => "UNKNOWN",
    }
  }
}

impl From<u16> for RecordType {
  #[inline]
  fn from(value: u16) -> Self {
    match value {
      A_VALUE => Self::A,
      CNAME_VALUE => Self::CNAME,
      PTR_VALUE => Self::PTR,
      TXT_VALUE => Self::TXT,
      AAAA_VALUE => Self::AAAA,
      SRV_VALUE => Self::SRV,
      NSEC_VALUE => Self::NSEC,
      OPT_VALUE => Self::OPT,
      ANY_VALUE => Self::ANY,
      other => Self::Unknown(other),
    }
  }
}

impl From<RecordType> for u16 {
  #[inline]
  fn from(value: RecordType) -> Self {
    value.value()
  }
}

impl fmt::Display for RecordType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
