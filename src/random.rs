//! The randomness collaborator contract (spec §6): `random()` returning a
//! uniform float in `[0, 1)`. This crate never seeds or owns an RNG
//! itself — every delay that RFC 6762 calls "random" is derived from one
//! caller-supplied sample per decision point, keeping the prober and
//! response queue sans-I/O.

/// A source of uniform randomness in `[0, 1)`, supplied by the caller so
/// this crate stays sans-I/O (no internal RNG state, no OS entropy
/// calls).
pub trait RandomSource {
  /// Returns a sample drawn uniformly from `[0, 1)`.
  fn uniform(&mut self) -> f64;
}

/// Scales a `[0, 1)` sample into an integer millisecond delay in
/// `[low, high]` inclusive, matching the `uniform(low, high)` notation
/// used throughout spec §4.4 and §4.5.
pub fn uniform_delay_ms(sample: f64, low: u64, high: u64) -> u64 {
  debug_assert!(low <= high);
  let span = (high - low) as f64;
  low + (sample.clamp(0.0, 1.0) * span).round() as u64
}
