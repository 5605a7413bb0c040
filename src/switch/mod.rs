// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Protocol dispatch on top of the secure channel.
//!
//! [`SwitchInterface`] validates every inbound message, decodes it into its
//! typed form and hands it to the handler registered for that kind. Requests
//! from the controller, and from local services through
//! [`SwitchInterface::handle_local_message`], leave a [`PendingContext`] behind
//! so that `send` can route the reply and `send_error` can quote the request.

pub use context::{ContextTable, PendingContext, Route};
pub use handlers::{ConnectionHandler, Handler};

mod context;
mod handlers;

use std::cell::{Cell, RefCell};
use std::net::SocketAddr;
use std::rc::{Rc, Weak};
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, error, info, trace, warn};

use crate::channel::{ChannelState, Connector, SecureChannel};
use crate::ofp::{self, peek_xid, validate, OfpErrorCode, OfpMessage};
use crate::reactor::Reactor;
use crate::timer::{Timer, TimerId};
use crate::{AppError, AppResult, SwitchConfig};
use handlers::EventHandlers;

/// Delivery to in-process services addressed by name.
pub trait LocalRelay {
    fn relay(&self, service: &str, message: &[u8]) -> AppResult<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct ContextSettings {
    pub lifetime: Duration,
    pub sweep_interval: Duration,
}

impl Default for ContextSettings {
    fn default() -> Self {
        ContextSettings {
            lifetime: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

struct SwitchShared {
    channel: SecureChannel,
    timer: Rc<dyn Timer>,
    contexts: RefCell<ContextTable>,
    handlers: RefCell<EventHandlers>,
    relay: RefCell<Option<Rc<dyn LocalRelay>>>,
    sweep_interval: Duration,
    sweep_timer: Cell<Option<TimerId>>,
}

impl Drop for SwitchShared {
    fn drop(&mut self) {
        if let Some(id) = self.sweep_timer.take() {
            self.timer.cancel(id);
        }
    }
}

#[derive(Clone)]
pub struct SwitchInterface {
    shared: Rc<SwitchShared>,
}

impl SwitchInterface {
    pub fn new(channel: SecureChannel, timer: Rc<dyn Timer>, settings: ContextSettings) -> Self {
        let switch = SwitchInterface {
            shared: Rc::new(SwitchShared {
                channel,
                timer,
                contexts: RefCell::new(ContextTable::new(settings.lifetime)),
                handlers: RefCell::new(EventHandlers::default()),
                relay: RefCell::new(None),
                sweep_interval: settings.sweep_interval,
                sweep_timer: Cell::new(None),
            }),
        };
        let weak = switch.downgrade();
        switch.shared.channel.set_message_handler(move |message| {
            if let Some(switch) = SwitchInterface::upgrade(&weak) {
                switch.handle_message(message);
            }
        });
        switch
    }

    /// A switch over a fresh channel, configured from `config`.
    pub fn with_config(
        reactor: Rc<Reactor>,
        timer: Rc<dyn Timer>,
        connector: Box<dyn Connector>,
        config: &SwitchConfig,
    ) -> Self {
        let channel = SecureChannel::new(
            reactor,
            timer.clone(),
            connector,
            config.reconnect_interval(),
        );
        SwitchInterface::new(
            channel,
            timer,
            ContextSettings {
                lifetime: config.context_lifetime(),
                sweep_interval: config.sweep_interval(),
            },
        )
    }

    fn downgrade(&self) -> Weak<SwitchShared> {
        Rc::downgrade(&self.shared)
    }

    fn upgrade(weak: &Weak<SwitchShared>) -> Option<SwitchInterface> {
        weak.upgrade().map(|shared| SwitchInterface { shared })
    }

    pub fn channel(&self) -> &SecureChannel {
        &self.shared.channel
    }

    pub fn state(&self) -> ChannelState {
        self.shared.channel.state()
    }

    pub fn set_local_relay(&self, relay: Rc<dyn LocalRelay>) {
        *self.shared.relay.borrow_mut() = Some(relay);
    }

    /// Bring the channel up and start the context sweep.
    pub fn initiate(&self, addr: SocketAddr) -> AppResult<()> {
        if self.shared.sweep_timer.get().is_none() {
            let weak = self.downgrade();
            let id = self.shared.timer.schedule_periodic(
                self.shared.sweep_interval,
                Box::new(move || {
                    if let Some(switch) = SwitchInterface::upgrade(&weak) {
                        switch.sweep_contexts();
                    }
                }),
            );
            self.shared.sweep_timer.set(Some(id));
        }

        let connected = self.downgrade();
        let disconnected = self.downgrade();
        let result = self.shared.channel.initiate(
            addr,
            move || {
                if let Some(switch) = SwitchInterface::upgrade(&connected) {
                    switch.invoke_connected();
                }
            },
            move || {
                if let Some(switch) = SwitchInterface::upgrade(&disconnected) {
                    switch.invoke_disconnected();
                }
            },
        );
        if let Err(e) = &result {
            error!("cannot initiate switch channel to {}: {}", addr, e);
            self.cancel_sweep();
        }
        result
    }

    /// Tear down the channel, the sweep and every pending context.
    pub fn finalize(&self) {
        self.cancel_sweep();
        self.shared.channel.finalize();
        let dropped = {
            let mut contexts = self.shared.contexts.borrow_mut();
            let dropped = contexts.len();
            contexts.clear();
            dropped
        };
        info!("switch interface finalized, {} context(s) dropped", dropped);
    }

    fn cancel_sweep(&self) {
        if let Some(id) = self.shared.sweep_timer.take() {
            self.shared.timer.cancel(id);
        }
    }

    /// Evict expired contexts now.
    pub fn sweep_contexts(&self) -> usize {
        let now = self.shared.timer.now();
        let evicted = self.shared.contexts.borrow_mut().sweep(now);
        if evicted > 0 {
            debug!("context sweep evicted {} entries", evicted);
        }
        evicted
    }

    pub fn save_context(&self, xid: u32, message: &[u8], route: Route) -> AppResult<()> {
        let now = self.shared.timer.now();
        self.shared
            .contexts
            .borrow_mut()
            .save(xid, message, route, now)
    }

    pub fn delete_context(&self, xid: u32) -> Option<PendingContext> {
        self.shared.contexts.borrow_mut().delete(xid)
    }

    pub fn context(&self, xid: u32) -> Option<PendingContext> {
        self.shared.contexts.borrow().get(xid).cloned()
    }

    pub fn context_count(&self) -> usize {
        self.shared.contexts.borrow().len()
    }

    /// Send a complete message, following the route of a pending context
    /// with the same xid if there is one.
    pub fn send(&self, message: &[u8]) -> AppResult<()> {
        let Some(xid) = peek_xid(message) else {
            return Err(AppError::MalformedProtocol(format!(
                "cannot send {} bytes without a header",
                message.len()
            )));
        };
        let route = self
            .shared
            .contexts
            .borrow()
            .get(xid)
            .map(|context| context.route.clone());
        match route {
            Some(Route::Local(service)) => {
                let relay = self.shared.relay.borrow().clone();
                let Some(relay) = relay else {
                    error!("no local relay for reply {:#010x} to {}", xid, service);
                    return Err(AppError::NoLocalRelay(service));
                };
                trace!("relaying {:#010x} to local service {}", xid, service);
                relay.relay(&service, message)
            }
            Some(Route::SecureChannel) | None => self.shared.channel.send(message),
        }
    }

    /// Send an error for transaction `xid`. `(err_type, code)` must be a known
    /// pair; otherwise nothing is sent.
    pub fn send_error(&self, xid: u32, err_type: u16, code: u16) -> AppResult<()> {
        let Some(error) = OfpErrorCode::from_pair(err_type, code) else {
            error!("unknown error type {} code {}, not sent", err_type, code);
            return Err(AppError::UnknownErrorCode { err_type, code });
        };
        self.send_error_code(xid, error)
    }

    /// Typed form of [`SwitchInterface::send_error`]. Request-echoing codes
    /// quote the saved request for `xid`, or nothing if none is saved.
    pub fn send_error_code(&self, xid: u32, error: OfpErrorCode) -> AppResult<()> {
        let request = if error.echoes_request() {
            let request = self.context(xid).map(|context| context.message);
            if request.is_none() {
                debug!("no context for {:#010x}, error sent without request data", xid);
            }
            request
        } else {
            None
        };
        let message = ofp::error(xid, error, request.as_deref().unwrap_or_default());
        self.send(&message)
    }

    /// A message from the controller, framed by the channel.
    fn handle_message(&self, message: BytesMut) {
        self.dispatch(&message, Route::SecureChannel);
    }

    /// A request from a local service. Its reply, sent through `send`, is
    /// relayed back to `service`.
    pub fn handle_local_message(&self, service: &str, message: &[u8]) -> AppResult<()> {
        let (header, msg_type) = validate(message)?;
        if !msg_type.is_dispatchable() {
            return Err(AppError::MalformedProtocol(format!(
                "{} is not a request a switch handles",
                msg_type
            )));
        }
        let decoded = OfpMessage::decode(header, msg_type, message)?;
        self.save_context(header.xid, message, Route::Local(service.to_string()))?;
        self.invoke(&decoded);
        Ok(())
    }

    /// Validate, decode and dispatch one inbound message. Malformed input is
    /// logged and dropped.
    fn dispatch(&self, message: &[u8], route: Route) {
        let (header, msg_type) = match validate(message) {
            Ok(validated) => validated,
            Err(e) => {
                warn!("dropping invalid message: {}", e);
                return;
            }
        };
        if !msg_type.is_dispatchable() {
            warn!(
                "dropping unexpected {} message, xid {:#010x}",
                msg_type, header.xid
            );
            return;
        }
        let decoded = match OfpMessage::decode(header, msg_type, message) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("dropping malformed {} message: {}", msg_type, e);
                return;
            }
        };
        if msg_type.needs_context() {
            if let Err(e) = self.save_context(header.xid, message, route) {
                warn!("{} dispatched without a fresh context: {}", msg_type, e);
            }
        }
        trace!("dispatching {} xid {:#010x}", msg_type, header.xid);
        self.invoke(&decoded);
    }
}
