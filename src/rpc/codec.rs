//! Document codec.
//!
//! Every payload is a flat JSON document in a fixed [`Payload`] buffer.
//! Measurements travel as SenML packs with values in ×100 fixed point:
//!
//! ```text
//! {"bn":"urn:dev:mac:0012…:","bu":"W","ver":1,
//!  "e":[{"n":"power","v":-154233}]}          // −1542.33 W
//! ```
//!
//! The fixed-point step happens here and only here; the control loops keep
//! `f32` readings.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::rpc::transport::Payload;

/// Scale applied to every measurement on the wire.
pub const FIXED_POINT_SCALE: f32 = 100.0;

/// Nearest integer to `value × 100`.  Non-finite values encode as 0.
pub fn to_fixed(value: f32) -> i32 {
    if value.is_finite() {
        (value * FIXED_POINT_SCALE).round() as i32
    } else {
        0
    }
}

/// Serialise `body` into a payload buffer.
pub fn encode<T: Serialize + ?Sized>(body: &T) -> Result<Payload, CodecError> {
    let bytes = serde_json::to_vec(body).map_err(|_| CodecError::Encode)?;
    Payload::from_slice(&bytes).map_err(|()| CodecError::PayloadTooLarge)
}

/// Flat JSON document.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(payload).map_err(|_| CodecError::Decode)
}

/// Decode a payload that must be a JSON object.
pub fn decode_object(payload: &[u8]) -> Result<JsonObject, CodecError> {
    match decode::<serde_json::Value>(payload)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(CodecError::Decode),
    }
}

// ───────────────────────────────────────────────────────────────
// SenML
// ───────────────────────────────────────────────────────────────

pub const SENML_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenmlRecord {
    pub n: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u: Option<String>,
    /// Fixed-point value.
    pub v: i32,
}

impl SenmlRecord {
    pub fn new(name: &str, unit: Option<&str>, value: f32) -> Self {
        Self {
            n: name.into(),
            u: unit.map(Into::into),
            v: to_fixed(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenmlPack {
    pub bn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bu: Option<String>,
    pub ver: u8,
    pub e: Vec<SenmlRecord>,
}

impl SenmlPack {
    pub fn new(base_name: &str, base_unit: Option<&str>) -> Self {
        Self {
            bn: base_name.into(),
            bu: base_unit.map(Into::into),
            ver: SENML_VERSION,
            e: Vec::new(),
        }
    }

    pub fn with(mut self, name: &str, unit: Option<&str>, value: f32) -> Self {
        self.e.push(SenmlRecord::new(name, unit, value));
        self
    }

    pub fn record(&self, name: &str) -> Option<&SenmlRecord> {
        self.e.iter().find(|r| r.n == name)
    }
}
