//! Local device registry.
//!
//! Answers `POST registration` in-process: meters receive
//! `{"status": true, "max_power": 6000}`, transformers an empty `2.01`.
//! Registered devices are kept by full name, most recent document wins.

use std::collections::BTreeMap;

use log::{info, warn};
use serde::Serialize;

use crate::error::ResourceError;
use crate::registration::DeviceType;
use crate::rpc::codec::{self, JsonObject};
use crate::rpc::resources::{self, ResourceHandler};
use crate::rpc::transport::{Method, Request, Response, ResponseCode};

pub const DEFAULT_MAX_POWER_W: i32 = 6000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredDevice {
    pub alias: String,
    pub device_type: DeviceType,
}

#[derive(Serialize)]
struct MeterDefaults {
    status: bool,
    max_power: i32,
}

pub struct LocalRegistry {
    path: String,
    max_power_w: i32,
    devices: BTreeMap<String, RegisteredDevice>,
}

impl LocalRegistry {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.into(),
            max_power_w: DEFAULT_MAX_POWER_W,
            devices: BTreeMap::new(),
        }
    }

    pub fn with_max_power(mut self, max_power_w: i32) -> Self {
        self.max_power_w = max_power_w;
        self
    }

    pub fn devices(&self) -> &BTreeMap<String, RegisteredDevice> {
        &self.devices
    }

    fn register(&mut self, request: &Request) -> Result<Response, ResourceError> {
        let doc = codec::decode_object(&request.payload)?;
        let full_name = str_field(&doc, "full_name")?;
        let alias = str_field(&doc, "alias")?;
        let device_type = match doc.get("type").and_then(|v| v.as_u64()) {
            Some(1) => DeviceType::SmartPowerMeter,
            Some(2) => DeviceType::SmartTransformer,
            _ => return Err(ResourceError::BadRequest("type must be 1 or 2")),
        };

        info!("Registry: {} ({}) registered as {:?}", alias, full_name, device_type);
        self.devices.insert(
            full_name.into(),
            RegisteredDevice {
                alias: alias.into(),
                device_type,
            },
        );

        Ok(match device_type {
            DeviceType::SmartPowerMeter => Response::json(
                ResponseCode::Created,
                &MeterDefaults {
                    status: true,
                    max_power: self.max_power_w,
                },
            ),
            DeviceType::SmartTransformer => Response::empty(ResponseCode::Created),
        })
    }
}

fn str_field<'a>(doc: &'a JsonObject, key: &'static str) -> Result<&'a str, ResourceError> {
    doc.get(key)
        .and_then(|v| v.as_str())
        .ok_or(ResourceError::BadRequest(key))
}

impl ResourceHandler for LocalRegistry {
    fn handle(&mut self, request: &Request) -> Response {
        let result = if request.path != self.path {
            Err(ResourceError::NotFound)
        } else if request.method != Method::Post {
            Err(ResourceError::MethodNotAllowed)
        } else {
            self.register(request)
        };
        result.unwrap_or_else(|e| {
            warn!("Registry: {} {} rejected: {}", request.method, request.path, e);
            resources::reject(e)
        })
    }
}
