//! Debounced button driver with press / held / release reporting.
//!
//! ## Input
//!
//! The driver is fed the raw button level (`true` = pressed) from the main
//! loop at its poll rate.  On a board this is a GPIO read, on the host it
//! comes from the console.
//!
//! ## Gesture reporting
//!
//! | Event              | Condition                                  |
//! |--------------------|--------------------------------------------|
//! | `Press`            | level held for the debounce window         |
//! | `Held { secs }`    | once per full second while still pressed   |
//! | `Release { secs }` | level dropped after a debounced press      |
//!
//! Devices decide what a gesture means: the meter counts `Press` as "add
//! a load" and `Held` beyond five seconds as "disconnect everything"; the
//! transformer cycles its manual fault on `Held` and injects it on
//! `Release`.

const DEBOUNCE_MS: u64 = 50;
const HELD_REPORT_MS: u64 = 1000;

/// Button events emitted after debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Press,
    Held { secs: u32 },
    Release { held_secs: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GestureState {
    Idle,
    DebounceWait { since_ms: u64 },
    Pressed { since_ms: u64, reported_secs: u32 },
}

pub struct ButtonDriver {
    state: GestureState,
}

impl ButtonDriver {
    pub fn new() -> Self {
        Self {
            state: GestureState::Idle,
        }
    }

    /// Call from the main loop with the current level.
    /// `now_ms` is the current monotonic time in milliseconds.
    pub fn tick(&mut self, now_ms: u64, pressed: bool) -> Option<ButtonEvent> {
        match self.state {
            GestureState::Idle => {
                if pressed {
                    self.state = GestureState::DebounceWait { since_ms: now_ms };
                }
                None
            }

            GestureState::DebounceWait { since_ms } => {
                if !pressed {
                    // Bounce: never reported.
                    self.state = GestureState::Idle;
                    None
                } else if now_ms.saturating_sub(since_ms) >= DEBOUNCE_MS {
                    self.state = GestureState::Pressed {
                        since_ms,
                        reported_secs: 0,
                    };
                    Some(ButtonEvent::Press)
                } else {
                    None
                }
            }

            GestureState::Pressed {
                since_ms,
                reported_secs,
            } => {
                let held_secs = (now_ms.saturating_sub(since_ms) / HELD_REPORT_MS) as u32;
                if !pressed {
                    self.state = GestureState::Idle;
                    return Some(ButtonEvent::Release { held_secs });
                }
                if held_secs > reported_secs {
                    self.state = GestureState::Pressed {
                        since_ms,
                        reported_secs: held_secs,
                    };
                    return Some(ButtonEvent::Held { secs: held_secs });
                }
                None
            }
        }
    }

    pub fn is_pressed(&self) -> bool {
        matches!(self.state, GestureState::Pressed { .. })
    }
}

impl Default for ButtonDriver {
    fn default() -> Self {
        Self::new()
    }
}
