//! Actuator policies.
//!
//! Each device runs one policy **every tick after its readings are
//! simulated**.  A policy maps the tick's inputs to a discrete safety
//! state plus the [`IndicatorEffect`](crate::drivers::indicator::IndicatorEffect)
//! that shows it.  The state is recomputed from scratch every tick; the
//! only memory either policy keeps is
//!
//! - the meter's sticky overload latch, and
//! - the transformer's class-4 persistence counter.

pub mod meter;
pub mod transformer;
