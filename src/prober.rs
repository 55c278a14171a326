//! C5: the prober. Drives the three-probe uniqueness check RFC 6762 §8.1
//! requires before a service may claim a name, including simultaneous-probe
//! tiebreaking (§8.2) and conflict-triggered renames (spec §4.5).
//!
//! Like [`crate::queue::ResponseQueue`], the prober owns no timer and
//! reads no clock: [`Prober::poll`] is driven by an external event loop
//! that passes in the current time and is told what to do next —
//! send a probe, wait, or report a terminal outcome.

use core::cmp::Ordering;

use smallvec_wrapper::TinyVec;

use crate::error::BuildError;
use crate::packet::{build_probe, Packet};
use crate::question::Question;
use crate::random::{uniform_delay_ms, RandomSource};
use crate::record::{canonical_concat, sort_canonical, Record, RecordType};
use crate::service::ServiceRecords;

/// Number of probes sent before a name is considered claimed (RFC 6762
/// §8.1).
const PROBE_COUNT: u8 = 3;
/// Fixed gap between consecutive probes (RFC 6762 §8.1, not randomized).
const PROBE_INTERVAL_MS: u64 = 250;
/// Upper bound of the random initial wait before the first probe.
const INITIAL_WAIT_MAX_MS: u64 = 250;
/// Backoff after losing a simultaneous-probe tiebreak, before restarting
/// with the same name (RFC 6762 §8.2).
const LOST_TIEBREAK_BACKOFF_MS: u64 = 1_000;
/// A prober that never resolves within this window fails (spec §4.5,
/// §7 [`ProbeTimeout`](crate::error::ProbeTimeout)).
const PROBE_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProberState {
  /// Constructed but not yet started.
  Idle,
  /// Waiting for `wake_at_ms`, at which point probe number `probes_sent + 1`
  /// is sent (or, if `probes_sent == PROBE_COUNT`, was never reached —
  /// `Done` is entered directly from the send path instead).
  Probing { probes_sent: u8, wake_at_ms: u64 },
  /// The name is claimed; no further action is needed.
  Done,
  /// Probing did not resolve within [`PROBE_TIMEOUT_MS`].
  Failed,
}

/// What the caller should do after a [`Prober::poll`] or
/// [`Prober::start`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProberAction {
  /// Nothing to do yet; call `poll` again no earlier than `until_ms`.
  Wait {
    /// The earliest time at which calling `poll` again can produce a new
    /// action.
    until_ms: u64,
  },
  /// Send this probe query on every interface in the service's
  /// interface-set, then call `poll` again no earlier than 250ms later.
  SendProbe(Packet),
  /// Probing completed: the name is uniquely claimed.
  Success,
  /// Probing failed to resolve within 60 seconds (spec §7
  /// [`ProbeTimeout`](crate::error::ProbeTimeout)); the caller should
  /// surface an unannounced-service error.
  Timeout,
}

/// What an inbound packet did to the prober's state, for the caller's
/// logging/telemetry. None of these except [`Conflict`](Self::Conflict)
/// and [`TiebreakLost`](Self::TiebreakLost) change when the next
/// [`ProberAction`] will fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProberEvent {
  /// The packet was irrelevant: it arrived before our first probe, named
  /// neither of our names, or (for a query) carried authorities that are
  /// byte-identical to ours.
  Ignored,
  /// A name conflict was detected (an inbound response claims one of our
  /// names, or an inbound probe query for our name carried no
  /// authorities). The service was asked to rename and probing restarts
  /// from probe 1 immediately.
  Conflict,
  /// We won a simultaneous-probe tiebreak; the opponent is expected to
  /// back off, and we continue probing unaffected.
  TiebreakWon,
  /// We lost a simultaneous-probe tiebreak; probing pauses for one
  /// second, then restarts from probe 1 with the same name.
  TiebreakLost,
  /// A simultaneous probe query for our name carried authorities
  /// identical to ours: no real conflict (same host re-probing), probing
  /// continues unaffected.
  NoConflict,
}

/// Drives the three-probe uniqueness check for one service across one
/// interface-set (spec §4.5).
///
/// The prober never touches a socket or a clock; it is fed the current
/// time and inbound packets by the caller and hands back
/// [`ProberAction`]s and [`ProberEvent`]s in return.
#[derive(Debug, Clone)]
pub struct Prober {
  state: ProberState,
  started_at_ms: u64,
  /// The authority records sent with the most recent probe, already
  /// canonically sorted, kept around for simultaneous-probe tiebreaking
  /// against an opponent's authority section (spec §4.5).
  last_authorities: TinyVec<Record>,
}

impl Default for Prober {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl Prober {
  /// A prober that has not yet started (call [`start`](Self::start)
  /// before the first [`poll`](Self::poll)).
  #[inline]
  pub fn new() -> Self {
    Self {
      state: ProberState::Idle,
      started_at_ms: 0,
      last_authorities: TinyVec::new(),
    }
  }

  /// Whether the name has been successfully claimed.
  #[inline]
  pub fn is_done(&self) -> bool {
    matches!(self.state, ProberState::Done)
  }

  /// Whether probing has failed with a timeout.
  #[inline]
  pub fn is_failed(&self) -> bool {
    matches!(self.state, ProberState::Failed)
  }

  /// Enters `WAIT_INITIAL`: waits `uniform(0, 250)` ms before the first
  /// probe (spec §4.5).
  pub fn start(&mut self, now_ms: u64, random: &mut impl RandomSource) {
    let delay = uniform_delay_ms(random.uniform(), 0, INITIAL_WAIT_MAX_MS);
    self.started_at_ms = now_ms;
    self.state = ProberState::Probing {
      probes_sent: 0,
      wake_at_ms: now_ms + delay,
    };
    tracing::debug!(delay, "mdns prober: starting, waiting before first probe");
  }

  /// Advances the state machine. Returns the action the caller should
  /// take; call again no earlier than any [`ProberAction::Wait`] it
  /// returns, and immediately after sending a probe's bytes succeed (per
  /// spec §5: "probe *N+1*'s timer is armed only from within probe *N*'s
  /// send-complete callback").
  pub fn poll(
    &mut self,
    now_ms: u64,
    service: &impl ServiceRecords,
    udp_payload_size: usize,
  ) -> Result<ProberAction, BuildError> {
    match self.state {
      ProberState::Idle => Ok(ProberAction::Wait { until_ms: now_ms }),
      ProberState::Done => Ok(ProberAction::Success),
      ProberState::Failed => Ok(ProberAction::Timeout),
      ProberState::Probing {
        probes_sent,
        wake_at_ms,
      } => {
        if now_ms.saturating_sub(self.started_at_ms) > PROBE_TIMEOUT_MS {
          self.state = ProberState::Failed;
          tracing::warn!("mdns prober: timed out after 60s without resolving");
          return Ok(ProberAction::Timeout);
        }
        if now_ms < wake_at_ms {
          return Ok(ProberAction::Wait { until_ms: wake_at_ms });
        }

        let mut authorities = service.authority_records();
        sort_canonical(&mut authorities);
        let questions = [
          Question::new(service.fqdn(), RecordType::ANY, true),
          Question::new(service.hostname(), RecordType::ANY, true),
        ];
        let packet = build_probe(0, questions, authorities.clone(), udp_payload_size)?;
        self.last_authorities = authorities;

        let probes_sent = probes_sent + 1;
        self.state = if probes_sent >= PROBE_COUNT {
          tracing::debug!("mdns prober: sent final probe, name claimed");
          ProberState::Done
        } else {
          tracing::trace!(probes_sent, "mdns prober: sent probe");
          ProberState::Probing {
            probes_sent,
            wake_at_ms: now_ms + PROBE_INTERVAL_MS,
          }
        };
        Ok(ProberAction::SendProbe(packet))
      }
    }
  }

  /// Feeds an inbound packet to the prober. Packets arriving before the
  /// first probe is sent are ignored outright (spec §4.5: "Ignore all
  /// inbound traffic until the *first* probe has been sent").
  pub fn on_inbound(
    &mut self,
    packet: &Packet,
    now_ms: u64,
    service: &mut impl ServiceRecords,
  ) -> ProberEvent {
    let probes_sent = match self.state {
      ProberState::Probing { probes_sent, .. } => probes_sent,
      _ => return ProberEvent::Ignored,
    };
    if probes_sent == 0 {
      return ProberEvent::Ignored;
    }

    let fqdn = service.fqdn();
    let hostname = service.hostname();
    let names_ours = |name: &crate::name::Name| {
      name.eq_ignore_case(&fqdn) || name.eq_ignore_case(&hostname)
    };

    if packet.header().qr {
      let conflict = packet
        .answers()
        .iter()
        .chain(packet.additionals())
        .any(|r| names_ours(r.header().name()));
      if !conflict {
        return ProberEvent::Ignored;
      }
      return self.conflict(service, now_ms);
    }

    let targets_us = packet.questions().iter().any(|q| names_ours(q.name()));
    if !targets_us {
      return ProberEvent::Ignored;
    }

    if packet.authorities().is_empty() {
      return self.conflict(service, now_ms);
    }

    let ours = canonical_concat(&self.last_authorities);
    let theirs = canonical_concat(packet.authorities());
    match ours.cmp(&theirs) {
      Ordering::Equal => ProberEvent::NoConflict,
      Ordering::Less => ProberEvent::TiebreakWon,
      Ordering::Greater => {
        self.state = ProberState::Probing {
          probes_sent: 0,
          wake_at_ms: now_ms + LOST_TIEBREAK_BACKOFF_MS,
        };
        tracing::debug!("mdns prober: lost simultaneous-probe tiebreak, backing off 1s");
        ProberEvent::TiebreakLost
      }
    }
  }

  /// Asks the service to rename, then restarts from probe 1 with no
  /// random wait (spec §4.5: "reset counters, and restart from
  /// SENDING(1) immediately").
  fn conflict(&mut self, service: &mut impl ServiceRecords, now_ms: u64) -> ProberEvent {
    service.increment_name();
    self.state = ProberState::Probing {
      probes_sent: 0,
      wake_at_ms: now_ms,
    };
    tracing::debug!("mdns prober: name conflict, renaming and restarting probing");
    ProberEvent::Conflict
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::name::Name;
  use std::net::Ipv4Addr;

  struct FixedRandom(f64);
  impl RandomSource for FixedRandom {
    fn uniform(&mut self) -> f64 {
      self.0
    }
  }

  #[derive(Clone)]
  struct FakeService {
    fqdn: Name,
    hostname: Name,
    renames: u32,
  }

  impl FakeService {
    fn new() -> Self {
      Self {
        fqdn: Name::parse("Printer._ipp._tcp.local").unwrap(),
        hostname: Name::parse("Printer.local").unwrap(),
        renames: 0,
      }
    }
  }

  impl ServiceRecords for FakeService {
    fn fqdn(&self) -> Name {
      self.fqdn.clone()
    }

    fn hostname(&self) -> Name {
      self.hostname.clone()
    }

    fn increment_name(&mut self) {
      self.renames += 1;
      self.fqdn = Name::parse(&format!("Printer ({})._ipp._tcp.local", self.renames)).unwrap();
    }

    fn authority_records(&self) -> TinyVec<Record> {
      use crate::record::{RData, RecordHeader};
      TinyVec::from_iter([Record::new(
        RecordHeader::new(self.hostname.clone(), 120),
        RData::A(Ipv4Addr::new(10, 0, 0, self.renames as u8 + 1)),
      )])
    }
  }

  fn response_naming(name: &Name) -> Packet {
    use crate::packet::Header;
    use crate::record::{RData, RecordHeader};
    let mut p = Packet::new(Header::response(0));
    p.add_answer(Record::new(
      RecordHeader::new(name.clone(), 120),
      RData::A(Ipv4Addr::new(1, 2, 3, 4)),
    ));
    p
  }

  #[test]
  fn three_probes_sent_with_correct_gaps_then_success() {
    let service = FakeService::new();
    let mut random = FixedRandom(0.0); // initial wait = 0ms
    let mut prober = Prober::new();
    prober.start(0, &mut random);

    // Initial wait of 0ms: probe 1 fires immediately.
    let a1 = prober.poll(0, &service, 1440).unwrap();
    assert!(matches!(a1, ProberAction::SendProbe(_)));

    match prober.poll(0, &service, 1440).unwrap() {
      ProberAction::Wait { until_ms } => assert_eq!(until_ms, 250),
      other => panic!("expected Wait, got {other:?}"),
    }

    let a2 = prober.poll(250, &service, 1440).unwrap();
    assert!(matches!(a2, ProberAction::SendProbe(_)));
    match prober.poll(250, &service, 1440).unwrap() {
      ProberAction::Wait { until_ms } => assert_eq!(until_ms, 500),
      other => panic!("expected Wait, got {other:?}"),
    }

    let a3 = prober.poll(500, &service, 1440).unwrap();
    assert!(matches!(a3, ProberAction::SendProbe(_)));
    assert!(prober.is_done());
    assert_eq!(
      prober.poll(500, &service, 1440).unwrap(),
      ProberAction::Success
    );
  }

  #[test]
  fn initial_wait_is_bounded_by_250ms() {
    let service = FakeService::new();
    let mut random = FixedRandom(1.0); // max initial wait
    let mut prober = Prober::new();
    prober.start(1_000, &mut random);
    match prober.poll(1_000, &service, 1440).unwrap() {
      ProberAction::Wait { until_ms } => assert_eq!(until_ms, 1_250),
      other => panic!("expected Wait, got {other:?}"),
    }
  }

  #[test]
  fn conflicting_response_renames_and_restarts_without_delay() {
    let mut service = FakeService::new();
    let mut random = FixedRandom(0.0);
    let mut prober = Prober::new();
    prober.start(0, &mut random);
    prober.poll(0, &service, 1440).unwrap(); // probe 1 sent

    let conflicting = response_naming(&service.fqdn());
    let event = prober.on_inbound(&conflicting, 300, &mut service);
    assert_eq!(event, ProberEvent::Conflict);
    assert_eq!(service.renames, 1);

    // Restart happens immediately: no initial random wait this time.
    match prober.poll(300, &service, 1440).unwrap() {
      ProberAction::SendProbe(_) => {}
      other => panic!("expected immediate SendProbe after conflict, got {other:?}"),
    }
  }

  #[test]
  fn traffic_before_first_probe_is_ignored() {
    let mut service = FakeService::new();
    let mut random = FixedRandom(1.0); // initial wait = 250ms, probe not yet sent
    let mut prober = Prober::new();
    prober.start(0, &mut random);

    let conflicting = response_naming(&service.fqdn());
    let event = prober.on_inbound(&conflicting, 10, &mut service);
    assert_eq!(event, ProberEvent::Ignored);
    assert_eq!(service.renames, 0);
  }

  #[test]
  fn losing_tiebreak_backs_off_one_second_with_same_name() {
    use crate::packet::Header;
    use crate::record::{RData, RecordHeader};

    let mut service = FakeService::new();
    let mut random = FixedRandom(0.0);
    let mut prober = Prober::new();
    prober.start(0, &mut random);
    prober.poll(0, &service, 1440).unwrap(); // our authority: 10.0.0.1

    // Opponent's authority rdata sorts before ours (10.0.0.0 < 10.0.0.1):
    // we lose, since the spec says the smaller byte sequence wins "for the
    // holder" (the opponent, here).
    let mut opponent = Packet::new(Header::query(0));
    opponent.add_question(Question::new(service.fqdn(), RecordType::ANY, true));
    opponent.add_authority(Record::new(
      RecordHeader::new(service.hostname(), 120),
      RData::A(Ipv4Addr::new(10, 0, 0, 0)),
    ));

    let event = prober.on_inbound(&opponent, 300, &mut service);
    assert_eq!(event, ProberEvent::TiebreakLost);
    assert_eq!(service.renames, 0, "same name is reused after losing");

    match prober.poll(300, &service, 1440).unwrap() {
      ProberAction::Wait { until_ms } => assert_eq!(until_ms, 1_300),
      other => panic!("expected 1s backoff wait, got {other:?}"),
    }
    match prober.poll(1_300, &service, 1440).unwrap() {
      ProberAction::SendProbe(_) => {}
      other => panic!("expected SendProbe after backoff, got {other:?}"),
    }
  }

  #[test]
  fn winning_tiebreak_continues_unaffected() {
    use crate::packet::Header;
    use crate::record::{RData, RecordHeader};

    let mut service = FakeService::new();
    let mut random = FixedRandom(0.0);
    let mut prober = Prober::new();
    prober.start(0, &mut random);
    prober.poll(0, &service, 1440).unwrap(); // our authority: 10.0.0.1

    // Opponent's authority rdata sorts after ours (10.0.0.2 > 10.0.0.1): we
    // win, since our data has the smaller byte sequence.
    let mut opponent = Packet::new(Header::query(0));
    opponent.add_question(Question::new(service.fqdn(), RecordType::ANY, true));
    opponent.add_authority(Record::new(
      RecordHeader::new(service.hostname(), 120),
      RData::A(Ipv4Addr::new(10, 0, 0, 2)),
    ));

    let event = prober.on_inbound(&opponent, 300, &mut service);
    assert_eq!(event, ProberEvent::TiebreakWon);
    match prober.poll(300, &service, 1440).unwrap() {
      ProberAction::Wait { until_ms } => assert_eq!(until_ms, 250),
      other => panic!("expected normal probe-interval wait, got {other:?}"),
    }
  }

  #[test]
  fn timeout_after_sixty_seconds_without_resolving() {
    let service = FakeService::new();
    let mut random = FixedRandom(0.0);
    let mut prober = Prober::new();
    prober.start(0, &mut random);
    // Never let the state machine actually send all three probes; just
    // advance the clock well past the 60s budget.
    let action = prober.poll(60_001, &service, 1440).unwrap();
    assert_eq!(action, ProberAction::Timeout);
    assert!(prober.is_failed());
  }
}
