//! Bounded-range value simulation.
//!
//! Every simulated quantity lives inside a [`SafeRange`].  Each tick a value
//! that is already inside its range takes a small random step
//! ([`gradual_variation`]); a value outside is pulled back by a bounded jump
//! ([`pull_toward`]).  Coupled groups (three phase currents, three phase
//! voltages) generate two members and derive the third with
//! [`reconcile_sum`] so the sum lands in a target band.
//!
//! ```text
//!        min                               max
//!   ──────┼────────────[ walk ± step ]──────┼──────
//!   x ──jump──▶ (clamped at the far bound)
//! ```
//!
//! All helpers take the RNG explicitly so tests can seed it.

pub mod meter;
pub mod transformer;

use rand::Rng;
use rand::distributions::Standard;

/// Closed interval `[min, max]` with `min < max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafeRange {
    pub min: f32,
    pub max: f32,
}

impl SafeRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Distance from `value` to the nearest bound, 0 when inside.
    pub fn distance(&self, value: f32) -> f32 {
        if value < self.min {
            self.min - value
        } else if value > self.max {
            value - self.max
        } else {
            0.0
        }
    }

    /// `[value - below, value + above]`.
    pub fn around(value: f32, below: f32, above: f32) -> Self {
        Self::new(value - below, value + above)
    }
}

/// Uniform sample in `[min, max)`.  `min == max` returns `min`.
pub fn random_in<R: Rng + ?Sized>(rng: &mut R, range: SafeRange) -> f32 {
    let unit: f32 = rng.sample(Standard);
    range.min + (range.max - range.min) * unit
}

/// Random step of at most `max_step` that keeps an in-range value in range.
///
/// The sign is chosen at random; if the step would leave the range the
/// opposite sign is used instead.
pub fn gradual_variation<R: Rng + ?Sized>(
    rng: &mut R,
    range: SafeRange,
    max_step: f32,
    value: f32,
) -> f32 {
    let step = random_in(rng, SafeRange::new(0.0, max_step));
    let mut next = if rng.gen_bool(0.5) {
        value + step
    } else {
        value - step
    };
    if next > range.max {
        next = value - step;
    }
    if next < range.min {
        next = value + step;
    }
    next
}

/// Move an out-of-range value toward `range` by a jump drawn from `jump`.
///
/// The result never passes the far bound, so the distance to the range
/// shrinks strictly on every call until the value is inside.  In-range
/// values are returned unchanged.
pub fn pull_toward<R: Rng + ?Sized>(
    rng: &mut R,
    range: SafeRange,
    jump: SafeRange,
    value: f32,
) -> f32 {
    if value < range.min {
        (value + random_in(rng, jump)).min(range.max)
    } else if value > range.max {
        (value - random_in(rng, jump)).max(range.min)
    } else {
        value
    }
}

/// Third member of a coupled group: `target - others` with `target` sampled
/// from `band`, so the group's sum lies in `band`.
pub fn reconcile_sum<R: Rng + ?Sized>(rng: &mut R, band: SafeRange, others: f32) -> f32 {
    random_in(rng, band) - others
}
