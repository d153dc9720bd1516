//! Request/response link abstraction.
//!
//! A device talks to its peers (the registry, the house meter) by sending
//! one [`Request`] and blocking until a [`Response`] arrives or the time
//! budget runs out.  Only one request is in flight per device; the control
//! loop is parked for the duration.
//!
//! Concrete implementations:
//! - [`UdpLink`](crate::adapters::udp_link::UdpLink): JSON datagrams over UDP
//! - [`LoopbackLink`](crate::adapters::loopback::LoopbackLink): in-process dispatch
//!
//! Devices are generic over `Link`, so adding a transport requires zero
//! changes to the control loops.

use core::fmt;
use core::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, LinkError};
use crate::rpc::codec;

/// Largest payload carried by a single request or response.
pub const MAX_PAYLOAD: usize = 512;

/// Fixed-capacity payload buffer.
pub type Payload = heapless::Vec<u8, MAX_PAYLOAD>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        })
    }
}

/// Response codes, numbered `class.detail` as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    Created,
    Changed,
    Content,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
}

impl ResponseCode {
    /// `(class, detail)` pair, e.g. `(2, 4)` for Changed.
    pub const fn parts(self) -> (u8, u8) {
        match self {
            Self::Created => (2, 1),
            Self::Changed => (2, 4),
            Self::Content => (2, 5),
            Self::BadRequest => (4, 0),
            Self::NotFound => (4, 4),
            Self::MethodNotAllowed => (4, 5),
            Self::InternalServerError => (5, 0),
        }
    }

    pub const fn is_success(self) -> bool {
        self.parts().0 == 2
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (class, detail) = self.parts();
        write!(f, "{class}.{detail:02}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    /// Register the sender as an observer of `path`.
    pub observe: bool,
    pub payload: Payload,
}

impl Request {
    pub fn get(path: &str) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            observe: false,
            payload: Payload::new(),
        }
    }

    pub fn observe(path: &str) -> Self {
        Self {
            observe: true,
            ..Self::get(path)
        }
    }

    pub fn put_json<T: Serialize>(path: &str, body: &T) -> Result<Self, CodecError> {
        Ok(Self {
            method: Method::Put,
            path: path.into(),
            observe: false,
            payload: codec::encode(body)?,
        })
    }

    pub fn post_json<T: Serialize>(path: &str, body: &T) -> Result<Self, CodecError> {
        Ok(Self {
            method: Method::Post,
            ..Self::put_json(path, body)?
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: ResponseCode,
    pub payload: Payload,
}

impl Response {
    pub fn empty(code: ResponseCode) -> Self {
        Self {
            code,
            payload: Payload::new(),
        }
    }

    pub fn json<T: Serialize>(code: ResponseCode, body: &T) -> Self {
        match codec::encode(body) {
            Ok(payload) => Self { code, payload },
            Err(e) => {
                log::error!("Rpc: cannot encode {code} reply: {e}");
                Self::empty(ResponseCode::InternalServerError)
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        codec::decode(&self.payload)
    }
}

/// Blocking request/response channel to named peers.
pub trait Link {
    /// Send `request` to `peer` and wait at most `timeout` for its reply.
    fn request(
        &mut self,
        peer: &str,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response, LinkError>;
}

impl<L: Link + ?Sized> Link for &mut L {
    fn request(
        &mut self,
        peer: &str,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response, LinkError> {
        (**self).request(peer, request, timeout)
    }
}
