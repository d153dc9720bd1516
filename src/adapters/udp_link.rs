//! UDP transport adapter.
//!
//! Every datagram carries one JSON [`WireFrame`]: a request, the matching
//! response (same `id`), or an observer notification.
//!
//! ## Roles
//!
//! - [`UdpLink`] implements [`Link`]: it sends a request and blocks on
//!   its own socket until the response with the same id arrives or the
//!   budget runs out.  Stray datagrams are dropped.
//! - [`UdpResourceServer`] answers inbound requests for a
//!   [`ResourceHandler`] without blocking (`poll()` returns when the
//!   socket is drained), keeps the observer list and fans notifications
//!   out to it.
//!
//! ## Observation
//!
//! A GET with `observe = true`, or any GET on a path ending in `_obs`,
//! registers the sender as an observer of that path once the handler
//! answers with a success code.  [`AppEvent::Notify`] for that resource
//! is then sent to every observer as a `Notify` frame.

use core::time::Duration;
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::error::LinkError;
use crate::rpc::resources::ResourceHandler;
use crate::rpc::transport::{Link, MAX_PAYLOAD, Method, Payload, Request, Response, ResponseCode};

/// Room for the payload plus the frame envelope.
const DATAGRAM_CAP: usize = MAX_PAYLOAD * 2 + 128;

/// Suffix of paths that register observers on GET.
pub const OBSERVE_SUFFIX: &str = "_obs";

/// Observers kept per server; the oldest is dropped to make room.
pub const MAX_OBSERVERS: usize = 16;

// ───────────────────────────────────────────────────────────────
// Wire format
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireFrame {
    Request {
        id: u32,
        method: Method,
        path: String,
        #[serde(default)]
        observe: bool,
        #[serde(default)]
        body: String,
    },
    Response {
        id: u32,
        code: ResponseCode,
        #[serde(default)]
        body: String,
    },
    Notify {
        seq: u32,
        path: String,
        body: String,
    },
}

fn body_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

fn body_payload(body: &str) -> Option<Payload> {
    Payload::from_slice(body.as_bytes()).ok()
}

pub fn encode_frame(frame: &WireFrame) -> Option<Vec<u8>> {
    serde_json::to_vec(frame).ok()
}

pub fn decode_frame(bytes: &[u8]) -> Option<WireFrame> {
    serde_json::from_slice(bytes).ok()
}

fn resolve(peer: &str) -> Result<SocketAddr, LinkError> {
    peer.to_socket_addrs()
        .map_err(|_| LinkError::UnknownPeer)?
        .next()
        .ok_or(LinkError::UnknownPeer)
}

// ───────────────────────────────────────────────────────────────
// Client
// ───────────────────────────────────────────────────────────────

pub struct UdpLink {
    socket: UdpSocket,
    next_id: u32,
}

impl UdpLink {
    /// Bind an ephemeral client socket on `bind_ip`.
    pub fn bind(bind_ip: &str) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((bind_ip, 0))?;
        info!("UdpLink: client socket on {}", socket.local_addr()?);
        Ok(Self { socket, next_id: 1 })
    }
}

impl Link for UdpLink {
    fn request(
        &mut self,
        peer: &str,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response, LinkError> {
        let addr = resolve(peer)?;
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let frame = WireFrame::Request {
            id,
            method: request.method,
            path: request.path.clone(),
            observe: request.observe,
            body: body_text(&request.payload),
        };
        let bytes = encode_frame(&frame).ok_or(LinkError::MalformedReply)?;
        self.socket.send_to(&bytes, addr).map_err(|e| {
            warn!("UdpLink: send to {} failed: {}", addr, e);
            LinkError::Io
        })?;

        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; DATAGRAM_CAP];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::Timeout);
            }
            self.socket
                .set_read_timeout(Some(remaining))
                .map_err(|_| LinkError::Io)?;
            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok(r) => r,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(LinkError::Timeout);
                }
                Err(e) => {
                    warn!("UdpLink: receive failed: {}", e);
                    return Err(LinkError::Io);
                }
            };
            match decode_frame(&buf[..len]) {
                Some(WireFrame::Response { id: got, code, body }) if got == id && from == addr => {
                    let payload = body_payload(&body).ok_or(LinkError::MalformedReply)?;
                    return Ok(Response { code, payload });
                }
                other => debug!("UdpLink: dropping stray datagram from {}: {:?}", from, other),
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Server
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
struct Observer {
    addr: SocketAddr,
    path: String,
}

pub struct UdpResourceServer {
    socket: UdpSocket,
    observers: Vec<Observer>,
    notify_seq: u32,
}

impl UdpResourceServer {
    pub fn bind(addr: &str) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        info!("UdpServer: listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            observers: Vec::new(),
            notify_seq: 0,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Answer every queued request.  Returns how many were handled.
    pub fn poll<H: ResourceHandler + ?Sized>(&mut self, handler: &mut H) -> usize {
        let mut buf = [0u8; DATAGRAM_CAP];
        let mut handled = 0;
        loop {
            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok(r) => r,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("UdpServer: receive failed: {}", e);
                    break;
                }
            };
            let Some(WireFrame::Request {
                id,
                method,
                path,
                observe,
                body,
            }) = decode_frame(&buf[..len])
            else {
                debug!("UdpServer: ignoring non-request datagram from {}", from);
                continue;
            };

            let response = match body_payload(&body) {
                Some(payload) => handler.handle(&Request {
                    method,
                    path: path.clone(),
                    observe,
                    payload,
                }),
                None => Response::empty(ResponseCode::BadRequest),
            };
            if method == Method::Get
                && (observe || path.ends_with(OBSERVE_SUFFIX))
                && response.code.is_success()
            {
                self.add_observer(from, path);
            }
            let reply = WireFrame::Response {
                id,
                code: response.code,
                body: body_text(&response.payload),
            };
            if let Some(bytes) = encode_frame(&reply) {
                if let Err(e) = self.socket.send_to(&bytes, from) {
                    warn!("UdpServer: reply to {} failed: {}", from, e);
                }
            }
            handled += 1;
        }
        handled
    }

    /// Send `payload` to every observer of `resource`.
    pub fn notify(&mut self, resource: &str, payload: &[u8]) {
        let base = resource.strip_suffix(OBSERVE_SUFFIX).unwrap_or(resource);
        self.notify_seq = self.notify_seq.wrapping_add(1);
        let seq = self.notify_seq;
        let socket = &self.socket;
        // An observer whose notification cannot be sent is forgotten.
        self.observers.retain(|obs| {
            let obs_base = obs.path.strip_suffix(OBSERVE_SUFFIX).unwrap_or(&obs.path);
            if obs_base != base {
                return true;
            }
            let frame = WireFrame::Notify {
                seq,
                path: obs.path.clone(),
                body: body_text(payload),
            };
            let Some(bytes) = encode_frame(&frame) else {
                return true;
            };
            match socket.send_to(&bytes, obs.addr) {
                Ok(_) => true,
                Err(e) => {
                    warn!("UdpServer: notify to {} failed, dropping observer: {}", obs.addr, e);
                    false
                }
            }
        });
    }

    fn add_observer(&mut self, addr: SocketAddr, path: String) {
        let obs = Observer { addr, path };
        if self.observers.contains(&obs) {
            return;
        }
        if self.observers.len() >= MAX_OBSERVERS {
            let old = self.observers.remove(0);
            info!("UdpServer: observer list full, {} no longer observes {}", old.addr, old.path);
        }
        info!("UdpServer: {} observes {}", obs.addr, obs.path);
        self.observers.push(obs);
    }
}

impl EventSink for UdpResourceServer {
    fn emit(&mut self, event: &AppEvent) {
        if let AppEvent::Notify { resource, payload } = event {
            self.notify(resource, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;
    impl ResourceHandler for Fixed {
        fn handle(&mut self, request: &Request) -> Response {
            match request.path.as_str() {
                "power" | "power_obs" => Response::json(ResponseCode::Content, &serde_json::json!({"v": 1})),
                _ => Response::empty(ResponseCode::NotFound),
            }
        }
    }

    #[test]
    fn frame_tags_are_snake_case() {
        let f = WireFrame::Response {
            id: 7,
            code: ResponseCode::Changed,
            body: String::new(),
        };
        let text = String::from_utf8(encode_frame(&f).unwrap()).unwrap();
        assert!(text.contains(r#""kind":"response""#));
        assert_eq!(decode_frame(text.as_bytes()), Some(f));
    }

    #[test]
    fn request_reaches_server_and_registers_observer() {
        let mut server = UdpResourceServer::bind("127.0.0.1:0").unwrap();
        let peer = server.local_addr().unwrap().to_string();
        let mut link = UdpLink::bind("127.0.0.1").unwrap();

        std::thread::scope(|s| {
            let srv = s.spawn(move || {
                let deadline = Instant::now() + Duration::from_secs(2);
                while server.poll(&mut Fixed) == 0 && Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(5));
                }
                server
            });
            let resp = link
                .request(&peer, &Request::get("power_obs"), Duration::from_secs(2))
                .unwrap();
            assert_eq!(resp.code, ResponseCode::Content);
            let server = srv.join().unwrap();
            assert_eq!(server.observer_count(), 1);
        });
    }

    #[test]
    fn silent_peer_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer = silent.local_addr().unwrap().to_string();
        let mut link = UdpLink::bind("127.0.0.1").unwrap();
        assert_eq!(
            link.request(&peer, &Request::get("power"), Duration::from_millis(50)),
            Err(LinkError::Timeout)
        );
    }

    #[test]
    fn observer_list_is_bounded() {
        let mut server = UdpResourceServer::bind("127.0.0.1:0").unwrap();
        for port in 0..MAX_OBSERVERS as u16 + 4 {
            let addr = SocketAddr::from(([127, 0, 0, 1], 40_000 + port));
            server.add_observer(addr, "power_obs".into());
            server.add_observer(addr, "power_obs".into());
        }
        assert_eq!(server.observer_count(), MAX_OBSERVERS);
        let first = SocketAddr::from(([127, 0, 0, 1], 40_000));
        assert!(!server.observers.iter().any(|o| o.addr == first));
    }
}
