//! Input and output drivers: button gestures and the LED indicator.

pub mod button;
pub mod indicator;
