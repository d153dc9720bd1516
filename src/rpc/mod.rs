//! Request/response subsystem.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      RPC Stack                           │
//! │                                                          │
//! │  ┌────────────┐   ┌───────────┐   ┌──────────────────┐   │
//! │  │ Link       │──▶│  Codec    │──▶│ ResourceHandler  │   │
//! │  │ (trait)    │   │ (JSON,    │   │ (Meter /         │   │
//! │  │            │   │  SenML)   │   │  Transformer)    │   │
//! │  └────────────┘   └───────────┘   └──────────────────┘   │
//! │       ▲                                   │              │
//! │       │            Notify (observers)     │              │
//! │       └───────────────────────────────────┘              │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod resources;
pub mod transport;
