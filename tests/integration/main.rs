//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that drives one device end to end
//! against mock adapters.  Everything runs on the host: no sockets, no
//! GPIOs, seeded RNGs.

mod meter_tests;
mod mock_hw;
mod registration_tests;
mod transformer_tests;
