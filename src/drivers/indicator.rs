//! Four-LED indicator driver.
//!
//! Each device has a green, yellow, red and blue LED.  The safety policies
//! describe what the indicator should show as an [`IndicatorEffect`]; the
//! [`Indicator`] keeps the currently lit set and turns an effect into the
//! next [`LedMask`] written to the [`IndicatorPort`].
//!
//! | Effect      | Result                                         |
//! |-------------|------------------------------------------------|
//! | Solid(m)    | exactly `m` lit                                |
//! | Toggle(m)   | everything outside `m` off, `m` flipped        |
//! | AllOn       | all four lit                                   |
//! | AllOff      | all four dark                                  |

use core::fmt;
use core::ops::{BitAnd, BitOr, BitXor, Not};

use crate::app::ports::IndicatorPort;

/// Set of lit LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedMask(u8);

impl LedMask {
    pub const NONE: Self = Self(0);
    pub const GREEN: Self = Self(0b0001);
    pub const YELLOW: Self = Self(0b0010);
    pub const RED: Self = Self(0b0100);
    pub const BLUE: Self = Self(0b1000);
    pub const ALL: Self = Self(0b1111);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for LedMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for LedMask {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitXor for LedMask {
    type Output = Self;
    fn bitxor(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl Not for LedMask {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0 & Self::ALL.0)
    }
}

impl fmt::Display for LedMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::GREEN, 'G'),
            (Self::YELLOW, 'Y'),
            (Self::RED, 'R'),
            (Self::BLUE, 'B'),
        ];
        for (led, c) in names {
            write!(f, "{}", if self.contains(led) { c } else { '.' })?;
        }
        Ok(())
    }
}

/// What a policy wants the indicator to show this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorEffect {
    Solid(LedMask),
    /// Blink: flips on every tick the state persists.
    Toggle(LedMask),
    AllOn,
    AllOff,
}

pub struct Indicator {
    lit: LedMask,
}

impl Indicator {
    pub fn new() -> Self {
        Self { lit: LedMask::NONE }
    }

    /// Apply `effect` and push the resulting mask to the port.
    pub fn apply<P: IndicatorPort + ?Sized>(
        &mut self,
        effect: IndicatorEffect,
        port: &mut P,
    ) -> LedMask {
        self.lit = match effect {
            IndicatorEffect::Solid(mask) => mask,
            IndicatorEffect::Toggle(mask) => (self.lit & mask) ^ mask,
            IndicatorEffect::AllOn => LedMask::ALL,
            IndicatorEffect::AllOff => LedMask::NONE,
        };
        port.set_leds(self.lit);
        self.lit
    }

    pub fn lit(&self) -> LedMask {
        self.lit
    }
}

impl Default for Indicator {
    fn default() -> Self {
        Self::new()
    }
}
