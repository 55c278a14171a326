//! C1: the label coder. Encodes and decodes DNS names with RFC 1035
//! §4.1.4 pointer compression.
//!
//! A [`Name`] stores its labels as raw bytes rather than as a
//! human-readable escaped string (unlike a zone-file pretty-printer):
//! encoding and decoding never lose information, which is what spec.md's
//! invariant 1 ("every name's wire-compressed encoding must still
//! round-trip to the identical label sequence") requires. [`fmt::Display`]
//! renders the RFC 1035 zone-file escaping for debugging.

use core::fmt;
use std::collections::HashMap;

use smallvec_wrapper::TinyVec;
use triomphe::Arc;

use crate::error::{NameError, ProtoError};

/// RFC 1035 §2.3.4: the wire-format length of a name, including every
/// length-prefix byte and the terminating zero, is capped at 255.
pub const MAX_DOMAIN_NAME_WIRE_OCTETS: usize = 255;
/// The largest label is 63 bytes (the top two bits of the length byte are
/// reserved to flag a compression pointer).
pub const MAX_LABEL_OCTETS: usize = 63;
/// Only the low 14 bits of a compression pointer carry the offset, so a
/// name occurring at or beyond this offset in the message can never be
/// pointed to.
pub const MAX_COMPRESSION_OFFSET: usize = 0x4000;
/// An upper bound on the number of compression pointers a well-formed
/// message can chain through without looping (spec.md §4.1: "the chain
/// exceeds 128 hops").
pub const MAX_COMPRESSION_POINTERS: usize = 128;

const POINTER_TAG: u8 = 0xC0;

/// An immutable, already-validated DNS name: a non-empty sequence of
/// 1-63 byte labels, whose total wire encoding (including length bytes
/// and the root terminator) is at most 255 bytes.
///
/// Every `Name` is implicitly fully qualified — there is no notion of a
/// "relative" name in this crate, since every name that reaches the wire
/// is absolute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Name {
  labels: TinyVec<Arc<[u8]>>,
}

impl Name {
  /// The root name (the empty label sequence), written as `.`.
  #[inline]
  pub fn root() -> Self {
    Self {
      labels: TinyVec::new(),
    }
  }

  /// Builds a name from already-split raw labels, validating lengths.
  pub fn from_labels<I, L>(labels: I) -> Result<Self, NameError>
  where
    I: IntoIterator<Item = L>,
    L: Into<Vec<u8>>,
  {
    let mut out = TinyVec::new();
    let mut total = 1usize; // root terminator
    for label in labels {
      let label = label.into();
      if label.is_empty() || label.len() > MAX_LABEL_OCTETS {
        return Err(NameError::InvalidLabel(lossy_smolstr(&label)));
      }
      total += label.len() + 1;
      if total > MAX_DOMAIN_NAME_WIRE_OCTETS {
        return Err(NameError::TooLong);
      }
      out.push(Arc::from(label.into_boxed_slice()));
    }
    Ok(Self { labels: out })
  }

  /// Parses a dotted textual name such as `"_http._tcp.local"` or
  /// `"_http._tcp.local."`, unescaping `\DDD` and `\X` sequences the same
  /// way zone-file syntax does. An empty string or bare `"."` parses to
  /// [`Name::root`].
  pub fn parse(s: &str) -> Result<Self, NameError> {
    let trimmed = s.strip_suffix('.').unwrap_or(s);
    if trimmed.is_empty() {
      return Ok(Self::root());
    }

    let mut labels = Vec::new();
    let mut current = Vec::new();
    let mut chars = trimmed.bytes().peekable();
    while let Some(b) = chars.next() {
      match b {
        b'.' => {
          labels.push(core::mem::take(&mut current));
        }
        b'\\' => {
          let unescaped = unescape_one(&mut chars)
            .ok_or_else(|| NameError::InvalidLabel(lossy_smolstr(current.as_slice())))?;
          current.push(unescaped);
        }
        other => current.push(other),
      }
    }
    labels.push(current);

    Self::from_labels(labels)
  }

  /// Returns `true` if this is the root name (no labels).
  #[inline]
  pub fn is_root(&self) -> bool {
    self.labels.is_empty()
  }

  /// Iterates over the raw label bytes, most significant (leftmost) first.
  #[inline]
  pub fn labels(&self) -> impl ExactSizeIterator<Item = &[u8]> {
    self.labels.iter().map(|l| l.as_ref())
  }

  /// Number of labels, excluding the implicit root terminator.
  #[inline]
  pub fn label_count(&self) -> usize {
    self.labels.len()
  }

  /// Case-insensitive equality, per spec.md §3 ("Case-insensitive for
  /// comparison").
  pub fn eq_ignore_case(&self, other: &Self) -> bool {
    self.labels.len() == other.labels.len()
      && self
        .labels
        .iter()
        .zip(other.labels.iter())
        .all(|(a, b)| a.eq_ignore_ascii_case(b))
  }

  /// Appends `suffix`'s labels after this name's labels, returning a new
  /// name (e.g. combining an instance label with `_service._proto.local`).
  pub fn appended(&self, suffix: &Self) -> Result<Self, NameError> {
    let mut total = 1usize;
    for l in self.labels.iter().chain(suffix.labels.iter()) {
      total += l.len() + 1;
    }
    if total > MAX_DOMAIN_NAME_WIRE_OCTETS {
      return Err(NameError::TooLong);
    }
    let mut labels = TinyVec::with_capacity(self.labels.len() + suffix.labels.len());
    labels.extend(self.labels.iter().cloned());
    labels.extend(suffix.labels.iter().cloned());
    Ok(Self { labels })
  }

  /// Returns a copy of this name with a numeric suffix appended/incremented
  /// on the leftmost label, used by conflict-triggered renaming (spec.md
  /// §4.5: "appends/increments a numeric suffix"). `MyPrinter` becomes
  /// `MyPrinter (2)`, `MyPrinter (2)` becomes `MyPrinter (3)`, matching the
  /// zeroconf/Bonjour convention of parenthesized counters.
  pub fn bump_leading_label(&self) -> Result<Self, NameError> {
    let Some((first, rest)) = self.labels.split_first() else {
      return Err(NameError::InvalidLabel(Default::default()));
    };
    let bumped = bump_counter(first);
    if bumped.is_empty() || bumped.len() > MAX_LABEL_OCTETS {
      return Err(NameError::InvalidLabel(lossy_smolstr(&bumped)));
    }
    let mut labels = TinyVec::with_capacity(self.labels.len());
    labels.push(Arc::from(bumped.into_boxed_slice()));
    labels.extend(rest.iter().cloned());
    let total: usize = labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1;
    if total > MAX_DOMAIN_NAME_WIRE_OCTETS {
      return Err(NameError::TooLong);
    }
    Ok(Self { labels })
  }

  /// Decodes a name starting at `off` in `msg`, following compression
  /// pointers. Returns the name and the offset immediately after the
  /// bytes *this* name occupied in the message (i.e. after the first
  /// pointer or the terminating zero, never following into a pointer
  /// chain — RFC 1035 §4.1.4).
  pub fn decode(msg: &[u8], off: usize) -> Result<(Self, usize), ProtoError> {
    let mut labels = TinyVec::new();
    let mut total = 1usize; // root terminator
    let (first_stop, _) = Self::walk(msg, off, |label| {
      total += label.len() + 1;
      if total > MAX_DOMAIN_NAME_WIRE_OCTETS {
        return Err(ProtoError::NameTooLong);
      }
      labels.push(Arc::<[u8]>::from(label));
      Ok(())
    })?;
    Ok((Self { labels }, first_stop))
  }

  /// Like [`decode`](Self::decode) but discards the label content,
  /// returning only the number of bytes this name occupies at `off` (used
  /// by the packet codec to skip fields it doesn't need to inspect).
  pub fn skip_decode(msg: &[u8], off: usize) -> Result<usize, ProtoError> {
    let (first_stop, _) = Self::walk(msg, off, |_| Ok(()))?;
    Ok(first_stop)
  }

  /// Shared pointer-following walk used by both `decode` and
  /// `skip_decode`. Calls `on_label` for every literal label encountered,
  /// in order, stopping at the root. Returns the offset just past the
  /// name as it appears at `off` (for header bookkeeping) and the number
  /// of pointers followed.
  fn walk(
    msg: &[u8],
    mut off: usize,
    mut on_label: impl FnMut(&[u8]) -> Result<(), ProtoError>,
  ) -> Result<(usize, usize), ProtoError> {
    let len = msg.len();
    let mut first_stop = None;
    let mut pointers = 0usize;

    loop {
      if off >= len {
        return Err(ProtoError::BufferTooSmall("name"));
      }
      let c = msg[off];
      off += 1;

      match c & POINTER_TAG {
        0x00 => {
          if c == 0 {
            break;
          }
          let label_len = c as usize;
          if off + label_len > len {
            return Err(ProtoError::BufferTooSmall("name label"));
          }
          on_label(&msg[off..off + label_len])?;
          off += label_len;
        }
        POINTER_TAG => {
          if off >= len {
            return Err(ProtoError::BufferTooSmall("name pointer"));
          }
          let c1 = msg[off];
          off += 1;
          if first_stop.is_none() {
            first_stop = Some(off);
          }
          pointers += 1;
          if pointers > MAX_COMPRESSION_POINTERS {
            return Err(ProtoError::TooManyPointers);
          }
          let target = (((c as usize) ^ POINTER_TAG as usize) << 8) | c1 as usize;
          if target >= off - 2 {
            return Err(ProtoError::ForwardPointer);
          }
          off = target;
        }
        _ => return Err(ProtoError::InvalidLabel),
      }
    }

    let first_stop = first_stop.unwrap_or(off);
    Ok((first_stop, pointers))
  }

  /// Encodes this name at `pos` (the name's own offset in the full
  /// message being assembled) into `buf`, using `cmap` to emit a
  /// compression pointer for the longest matching suffix already written
  /// earlier in the message, if any. Returns the number of bytes written.
  ///
  /// Every suffix of this name that ends up at an offset < 0x4000 is
  /// registered in `cmap` for future calls to match against (spec.md
  /// §4.1: "owns a map from name -> offset... for the duration of one
  /// encode pass").
  pub fn encode(&self, buf: &mut Vec<u8>, pos: usize, cmap: &mut CompressionMap) -> usize {
    let match_at = self.find_compressible_suffix(cmap);
    let written_labels = match_at.unwrap_or(self.labels.len());

    let mut cursor = pos;
    for (i, label) in self.labels[..written_labels].iter().enumerate() {
      if cursor < MAX_COMPRESSION_OFFSET {
        cmap.insert(self.suffix_key_from(i), cursor as u16);
      }
      buf.push(label.len() as u8);
      buf.extend_from_slice(label);
      cursor += label.len() + 1;
    }

    match match_at {
      Some(i) => {
        let target = *cmap.get(&self.suffix_key_from(i)).expect("just matched");
        buf.push(POINTER_TAG | ((target >> 8) as u8));
        buf.push((target & 0xFF) as u8);
        cursor - pos + 2
      }
      None => {
        buf.push(0);
        cursor - pos + 1
      }
    }
  }

  /// Encodes this name without ever emitting a compression pointer. Used
  /// (a) to compute a pure upper bound on a packet's size, and (b) for
  /// the SRV target field when the enclosing packet is legacy-unicast,
  /// since some legacy resolvers mis-parse compressed SRV targets
  /// (spec.md §4.1, §4.2).
  pub fn encode_uncompressed(&self, buf: &mut Vec<u8>) -> usize {
    let mut written = 0;
    for label in &self.labels {
      buf.push(label.len() as u8);
      buf.extend_from_slice(label);
      written += label.len() + 1;
    }
    buf.push(0);
    written + 1
  }

  /// The number of bytes [`encode_uncompressed`](Self::encode_uncompressed)
  /// would write, without touching a buffer.
  #[inline]
  pub fn uncompressed_len(&self) -> usize {
    self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
  }

  /// An upper bound on the bytes [`encode`](Self::encode) would write if
  /// `cmap` is consulted but not updated — used by the packet length
  /// cache, which must stay pure (spec.md §4.3: "computed with a fresh
  /// label coder per computation to keep it pure").
  pub fn compressed_len(&self, cmap: &CompressionMap) -> usize {
    match self.find_compressible_suffix(cmap) {
      Some(i) => self.labels[..i].iter().map(|l| l.len() + 1).sum::<usize>() + 2,
      None => self.uncompressed_len(),
    }
  }

  fn find_compressible_suffix(&self, cmap: &CompressionMap) -> Option<usize> {
    for i in 0..self.labels.len() {
      if cmap.contains(&self.suffix_key_from(i)) {
        return Some(i);
      }
    }
    None
  }

  fn suffix_key_from(&self, from: usize) -> SuffixKey {
    SuffixKey(self.labels[from..].iter().map(|l| lowercase(l)).collect())
  }
}

fn lowercase(label: &[u8]) -> Box<[u8]> {
  label.iter().map(|b| b.to_ascii_lowercase()).collect()
}

/// A lowercase label-suffix key used by [`CompressionMap`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SuffixKey(Vec<Box<[u8]>>);

/// Maps a lowercased label suffix to the offset in the message currently
/// being encoded where that suffix first occurred.
///
/// Owned by one encode pass (one [`crate::packet::Packet`] encoding) and
/// reset between encodes, per spec.md §4.1.
#[derive(Debug, Default)]
pub struct CompressionMap {
  map: HashMap<SuffixKey, u16>,
}

impl CompressionMap {
  /// Returns an empty map.
  #[inline]
  pub fn new() -> Self {
    Self::default()
  }

  fn contains(&self, key: &SuffixKey) -> bool {
    self.map.contains_key(key)
  }

  fn get(&self, key: &SuffixKey) -> Option<&u16> {
    self.map.get(key)
  }

  fn insert(&mut self, key: SuffixKey, offset: u16) {
    self.map.entry(key).or_insert(offset);
  }
}

fn bump_counter(label: &[u8]) -> Vec<u8> {
  // Matches the zeroconf convention: "Name" -> "Name (2)" -> "Name (3)".
  if let Some(stripped) = label.strip_suffix(b")") {
    if let Some(open) = stripped.iter().rposition(|&b| b == b'(') {
      let digits = &stripped[open + 1..];
      if !digits.is_empty() && digits.iter().all(u8::is_ascii_digit) {
        let n: u64 = core::str::from_utf8(digits)
          .ok()
          .and_then(|s| s.parse().ok())
          .unwrap_or(1);
        let mut out = label[..open].to_vec();
        out.extend_from_slice(format!("({})", n + 1).as_bytes());
        return out;
      }
    }
  }
  let mut out = label.to_vec();
  out.extend_from_slice(b" (2)");
  out
}

fn unescape_one(chars: &mut core::iter::Peekable<impl Iterator<Item = u8>>) -> Option<u8> {
  let first = chars.next()?;
  if first.is_ascii_digit() {
    let second = chars.next()?;
    let third = chars.next()?;
    if second.is_ascii_digit() && third.is_ascii_digit() {
      let v = (first - b'0') as u32 * 100 + (second - b'0') as u32 * 10 + (third - b'0') as u32;
      return u8::try_from(v).ok();
    }
    None
  } else {
    Some(first)
  }
}

fn lossy_smolstr(bytes: &[u8]) -> smol_str::SmolStr {
  smol_str::SmolStr::from(String::from_utf8_lossy(bytes).into_owned())
}

impl fmt::Display for Name {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_root() {
      return write!(f, ".");
    }
    for label in &self.labels {
      for &b in label.iter() {
        if matches!(b, b'.' | b' ' | b'\'' | b'@' | b';' | b'(' | b')' | b'"' | b'\\') {
          write!(f, "\\{}", b as char)?;
        } else if (b' '..=b'~').contains(&b) {
          write!(f, "{}", b as char)?;
        } else {
          write!(f, "\\{:03}", b)?;
        }
      }
      write!(f, ".")?;
    }
    Ok(())
  }
}
