//! Application core: device control loops, zero I/O.
//!
//! [`meter::MeterService`] and [`transformer::TransformerService`] own all
//! device state.  Hardware and peers are reached only through the port
//! traits in [`ports`] and the [`Link`](crate::rpc::transport::Link)
//! trait, keeping this layer testable without sockets or GPIOs.

pub mod events;
pub mod meter;
pub mod ports;
pub mod transformer;
