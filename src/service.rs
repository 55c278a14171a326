//! The service-records collaborator contract (spec §3, §6): the set of
//! records a [`crate::prober::Prober`] proposes to publish, plus the
//! rename operation conflict resolution drives.
//!
//! This crate never constructs a concrete implementation — the caller's
//! service-registration layer owns the name and record state; the
//! prober only ever reads it through this trait and, on conflict, asks
//! it to rename itself.

use smallvec_wrapper::TinyVec;

use crate::name::Name;
use crate::record::Record;

/// Everything a [`crate::prober::Prober`] needs to know about the
/// service it is claiming a name for.
///
/// Implementations are expected to be cheap to call repeatedly: the
/// prober calls [`authority_records`](Self::authority_records) once per
/// probe send and [`fqdn`]/[`hostname`](Self::hostname) on every inbound
/// packet while probing.
pub trait ServiceRecords {
  /// The service instance's fully-qualified name, e.g.
  /// `MyPrinter._ipp._tcp.local`.
  fn fqdn(&self) -> Name;

  /// The host name being claimed alongside the service, e.g.
  /// `MyPrinter.local`.
  fn hostname(&self) -> Name;

  /// Renames the service after a conflict, appending or incrementing a
  /// numeric suffix on the instance label (spec §4.5). Implementations
  /// must persist the new name so subsequent calls to
  /// [`fqdn`](Self::fqdn) reflect it.
  fn increment_name(&mut self);

  /// The full set of records this service intends to publish in the
  /// probe's authority section and, once claimed, in responses: SRV,
  /// TXT, PTR (including subtype PTRs), and address records.
  fn authority_records(&self) -> TinyVec<Record>;
}
