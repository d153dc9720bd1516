//! SparkGrid device library.
//!
//! Control logic for two cooperating grid devices, a house power meter
//! and a substation transformer, plus the adapters that run them on a
//! host.  Everything below `app/` is pure logic driven through port
//! traits, so the integration tests exercise the real control loops
//! against mocks.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod drivers;
pub mod error;
pub mod events;
pub mod registration;
pub mod rpc;
pub mod safety;
pub mod scheduler;
pub mod sim;
pub mod telemetry;
