//! In-process link.
//!
//! Routes each request straight to the [`ResourceHandler`] registered
//! under the peer's name.  Used by `sparkgrid sim` to run the registry,
//! the meter and the transformer in one process, and by the integration
//! tests.
//!
//! Handlers are shared through `Rc<RefCell<_>>`: the control loop and the
//! link both hold the meter, but never borrow it at the same time because
//! everything runs on one thread.

use core::time::Duration;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, warn};

use crate::error::LinkError;
use crate::rpc::resources::ResourceHandler;
use crate::rpc::transport::{Link, Request, Response};

pub type SharedHandler = Rc<RefCell<dyn ResourceHandler>>;

#[derive(Default)]
pub struct LoopbackLink {
    peers: HashMap<String, SharedHandler>,
}

impl LoopbackLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handler` reachable as `peer`.  Replaces any previous handler.
    pub fn attach(&mut self, peer: &str, handler: SharedHandler) {
        self.peers.insert(peer.into(), handler);
    }

    pub fn detach(&mut self, peer: &str) -> bool {
        self.peers.remove(peer).is_some()
    }
}

impl Link for LoopbackLink {
    fn request(
        &mut self,
        peer: &str,
        request: &Request,
        _timeout: Duration,
    ) -> Result<Response, LinkError> {
        let handler = self.peers.get(peer).ok_or(LinkError::UnknownPeer)?;
        // A handler calling back into itself would deadlock a real device;
        // here it shows up as a failed borrow.
        let Ok(mut handler) = handler.try_borrow_mut() else {
            warn!("Loopback: {} is busy, dropping {} {}", peer, request.method, request.path);
            return Err(LinkError::Timeout);
        };
        let response = handler.handle(request);
        debug!("Loopback: {} {} {} -> {}", peer, request.method, request.path, response.code);
        Ok(response)
    }
}
