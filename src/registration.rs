//! Boot-time registration with the device registry.
//!
//! ```text
//!   device ── POST registration {full_name, alias, type[, status, max_power]} ──▶ registry
//!   device ◀── 2.01 Created [{status, max_power}] ───────────────────────────── registry
//! ```
//!
//! Anything other than `2.01` with an acceptable body is a failed attempt
//! and the client tries again straight away.  Registration gates startup:
//! the control loop does not run until it succeeds.

use core::time::Duration;

use log::{info, warn};
use serde::Serialize;

use crate::error::RegistrationError;
use crate::rpc::codec;
use crate::rpc::transport::{Link, Request, ResponseCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    SmartPowerMeter = 1,
    SmartTransformer = 2,
}

/// Identity announced to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// SenML base name, `urn:dev:mac:…:`.
    pub full_name: String,
    pub alias: String,
    pub device_type: DeviceType,
}

/// Document POSTed to the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationDocument {
    pub full_name: String,
    pub alias: String,
    #[serde(rename = "type")]
    pub device_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_power: Option<i32>,
}

impl RegistrationDocument {
    pub fn new(identity: &DeviceIdentity) -> Self {
        Self {
            full_name: identity.full_name.clone(),
            alias: identity.alias.clone(),
            device_type: identity.device_type as u8,
            status: None,
            max_power: None,
        }
    }

    /// Attach the meter's currently known defaults.
    pub fn with_meter_defaults(mut self, status: bool, max_power: i32) -> Self {
        self.status = Some(status);
        self.max_power = Some(max_power);
        self
    }
}

/// Identity plus whatever defaults the registry handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub identity: DeviceIdentity,
    pub activated: Option<bool>,
    pub max_power: Option<i32>,
}

pub struct RegistrationClient {
    registry_peer: String,
    registry_path: String,
    timeout: Duration,
    attempts: u32,
}

impl RegistrationClient {
    pub fn new(registry_peer: &str, registry_path: &str, timeout: Duration) -> Self {
        Self {
            registry_peer: registry_peer.into(),
            registry_path: registry_path.into(),
            timeout,
            attempts: 0,
        }
    }

    /// Register, retrying until the registry accepts.  Blocks the caller.
    pub fn register<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        identity: &DeviceIdentity,
        document: &RegistrationDocument,
    ) -> RegistrationRecord {
        loop {
            match self.try_register(link, identity, document) {
                Ok(record) => return record,
                Err(e) => warn!(
                    "Registration: attempt {} failed ({}), retrying",
                    self.attempts, e
                ),
            }
        }
    }

    /// One registration attempt.
    pub fn try_register<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        identity: &DeviceIdentity,
        document: &RegistrationDocument,
    ) -> Result<RegistrationRecord, RegistrationError> {
        self.attempts += 1;
        let request = Request::post_json(&self.registry_path, document)?;
        let response = link.request(&self.registry_peer, &request, self.timeout)?;
        if response.code != ResponseCode::Created {
            return Err(RegistrationError::Rejected(response.code));
        }

        let mut record = RegistrationRecord {
            identity: identity.clone(),
            activated: None,
            max_power: None,
        };
        if !response.payload.is_empty() {
            let defaults = codec::decode_object(&response.payload)
                .map_err(|_| RegistrationError::MalformedDefaults)?;
            // Wrong-typed defaults are ignored, not fatal.
            record.activated = defaults.get("status").and_then(serde_json::Value::as_bool);
            record.max_power = defaults
                .get("max_power")
                .and_then(serde_json::Value::as_f64)
                .filter(|p| p.is_finite() && *p >= 1.0 && *p <= f64::from(i32::MAX))
                .map(|p| p as i32);
        }
        info!(
            "Registration: '{}' registered after {} attempt(s)",
            identity.alias, self.attempts
        );
        Ok(record)
    }

    /// Attempts made so far, including the successful one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
