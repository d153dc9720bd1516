//! Exposed resources and inbound body parsing.
//!
//! | Path                    | Device      | Methods          |
//! |-------------------------|-------------|------------------|
//! | `power`, `power_obs`    | meter       | GET (+observe)   |
//! | `status`                | meter       | PUT              |
//! | `max_power`             | meter       | PUT              |
//! | `transformer_state`,    | transformer | GET (+observe)   |
//! | `transformer_state_obs` |             |                  |
//! | `transformer_settings`  | transformer | PUT              |
//!
//! Every PUT body is validated completely before anything is mutated; a
//! missing or wrongly-typed field rejects the whole request with `4.00`.

use serde::{Deserialize, Serialize};

use crate::error::ResourceError;
use crate::rpc::codec::{self, JsonObject};
use crate::rpc::transport::{Request, Response};

pub const POWER: &str = "power";
pub const POWER_OBS: &str = "power_obs";
pub const STATUS: &str = "status";
pub const MAX_POWER: &str = "max_power";
pub const TRANSFORMER_STATE: &str = "transformer_state";
pub const TRANSFORMER_STATE_OBS: &str = "transformer_state_obs";
pub const TRANSFORMER_SETTINGS: &str = "transformer_settings";

/// Server side of the link: answers one inbound request.
pub trait ResourceHandler {
    fn handle(&mut self, request: &Request) -> Response;
}

impl<H: ResourceHandler + ?Sized> ResourceHandler for &mut H {
    fn handle(&mut self, request: &Request) -> Response {
        (**self).handle(request)
    }
}

/// Reply for a rejected request.
pub fn reject(err: ResourceError) -> Response {
    Response::empty(err.code())
}

// ───────────────────────────────────────────────────────────────
// Bodies
// ───────────────────────────────────────────────────────────────

/// `PUT status` body, also sent by the transformer to the house.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: bool,
}

/// `PUT status` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousStatus {
    pub previous_status: bool,
}

pub fn parse_status(payload: &[u8]) -> Result<bool, ResourceError> {
    let body = codec::decode_object(payload)?;
    match body.get("status") {
        Some(serde_json::Value::Bool(status)) => Ok(*status),
        Some(_) => Err(ResourceError::BadRequest("status must be a boolean")),
        None => Err(ResourceError::BadRequest("missing status")),
    }
}

/// Parse a `PUT status` reply.
pub fn parse_previous_status(payload: &[u8]) -> Result<bool, ResourceError> {
    let body = codec::decode_object(payload)?;
    body.get("previous_status")
        .and_then(serde_json::Value::as_bool)
        .ok_or(ResourceError::BadRequest("missing previous_status"))
}

/// `PUT max_power` body; the value must be a positive number of watts.
pub fn parse_max_power(payload: &[u8]) -> Result<i32, ResourceError> {
    let body = codec::decode_object(payload)?;
    let value = body
        .get("max_power")
        .ok_or(ResourceError::BadRequest("missing max_power"))?
        .as_f64()
        .ok_or(ResourceError::BadRequest("max_power must be a number"))?;
    if !value.is_finite() || value < 1.0 || value > f64::from(i32::MAX) {
        return Err(ResourceError::BadRequest("max_power out of range"));
    }
    Ok(value as i32)
}

/// Per-phase offsets added to the transformer's current readings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SettingsDelta {
    pub ia: Option<f32>,
    pub ib: Option<f32>,
    pub ic: Option<f32>,
    pub va: Option<f32>,
    pub vb: Option<f32>,
    pub vc: Option<f32>,
}

impl SettingsDelta {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// `PUT transformer_settings` body: any subset of the six phase fields.
/// Unknown keys are ignored.
pub fn parse_settings(payload: &[u8]) -> Result<SettingsDelta, ResourceError> {
    let body = codec::decode_object(payload)?;
    Ok(SettingsDelta {
        ia: number_field(&body, "ia")?,
        ib: number_field(&body, "ib")?,
        ic: number_field(&body, "ic")?,
        va: number_field(&body, "va")?,
        vb: number_field(&body, "vb")?,
        vc: number_field(&body, "vc")?,
    })
}

fn number_field(body: &JsonObject, key: &'static str) -> Result<Option<f32>, ResourceError> {
    match body.get(key) {
        None => Ok(None),
        Some(v) => match v.as_f64().map(|n| n as f32) {
            Some(n) if n.is_finite() => Ok(Some(n)),
            _ => Err(ResourceError::BadRequest("phase offsets must be numbers")),
        },
    }
}
