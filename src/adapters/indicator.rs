//! Indicator adapters.
//!
//! - [`ConsoleIndicator`]: host runtime, logs the lit LEDs when they change.
//! - [`PinIndicator`]: four `embedded-hal` output pins, one per LED.

use embedded_hal::digital::OutputPin;
use log::{info, warn};

use crate::app::ports::IndicatorPort;
use crate::drivers::indicator::LedMask;

/// Logs LED changes as `G.R.`-style masks.
pub struct ConsoleIndicator {
    device: &'static str,
    last: Option<LedMask>,
}

impl ConsoleIndicator {
    pub fn new(device: &'static str) -> Self {
        Self { device, last: None }
    }
}

impl IndicatorPort for ConsoleIndicator {
    fn set_leds(&mut self, leds: LedMask) {
        if self.last != Some(leds) {
            info!("{}: LEDs [{}]", self.device, leds);
            self.last = Some(leds);
        }
    }
}

/// Drives one GPIO per LED.  Pin errors are logged and the remaining pins
/// are still written.
pub struct PinIndicator<G, Y, R, B> {
    green: G,
    yellow: Y,
    red: R,
    blue: B,
}

impl<G, Y, R, B> PinIndicator<G, Y, R, B>
where
    G: OutputPin,
    Y: OutputPin,
    R: OutputPin,
    B: OutputPin,
{
    pub fn new(green: G, yellow: Y, red: R, blue: B) -> Self {
        Self {
            green,
            yellow,
            red,
            blue,
        }
    }

    pub fn release(self) -> (G, Y, R, B) {
        (self.green, self.yellow, self.red, self.blue)
    }
}

fn drive<P: OutputPin>(pin: &mut P, on: bool, name: &str) {
    let res = if on { pin.set_high() } else { pin.set_low() };
    if let Err(e) = res {
        warn!("Indicator: {} pin write failed: {:?}", name, e);
    }
}

impl<G, Y, R, B> IndicatorPort for PinIndicator<G, Y, R, B>
where
    G: OutputPin,
    Y: OutputPin,
    R: OutputPin,
    B: OutputPin,
{
    fn set_leds(&mut self, leds: LedMask) {
        drive(&mut self.green, leds.contains(LedMask::GREEN), "green");
        drive(&mut self.yellow, leds.contains(LedMask::YELLOW), "yellow");
        drive(&mut self.red, leds.contains(LedMask::RED), "red");
        drive(&mut self.blue, leds.contains(LedMask::BLUE), "blue");
    }
}
