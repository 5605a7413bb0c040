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

//! The switch end of the secure channel.
//!
//! A [`SecureChannel`] owns one outbound stream to the controller. It connects
//! without blocking, retries on a fixed interval while the controller is
//! unreachable, reassembles inbound frames, queues outbound messages until the
//! socket accepts them and reconnects after the peer goes away.
//!
//! Everything runs on the event loop thread. Reactor and timer callbacks hold
//! only a weak reference to the channel, so dropping the last handle releases
//! the socket and stops the retries.

pub use frame::FrameBuffer;
pub use state::ChannelState;
pub use transport::{is_transient, ConnectProgress, Connector, Stream, TcpConnector};

mod frame;
mod state;
mod transport;

use std::cell::RefCell;
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::rc::{Rc, Weak};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tracing::{debug, error, info, trace, warn};

use crate::queue::MessageQueue;
use crate::reactor::{IoCallback, Reactor};
use crate::timer::{Timer, TimerId};
use crate::{AppError, AppResult};

pub type ConnectionCallback = Box<dyn FnMut()>;
pub type MessageCallback = Box<dyn FnMut(BytesMut)>;

struct Connection {
    addr: Option<SocketAddr>,
    stream: Option<Box<dyn Stream>>,
    fd: Option<RawFd>,
    state: ChannelState,
    retry_timer: Option<TimerId>,
}

struct ChannelInner {
    connection: Connection,
    send_queue: MessageQueue,
    recv_queue: MessageQueue,
    fragment: FrameBuffer,
    /// set while `deliver_messages` owns the consumer
    delivering: bool,
    on_connected: Option<ConnectionCallback>,
    on_disconnected: Option<ConnectionCallback>,
    on_message: Option<MessageCallback>,
}

struct ChannelShared {
    reactor: Rc<Reactor>,
    timer: Rc<dyn Timer>,
    connector: Box<dyn Connector>,
    reconnect_interval: Duration,
    inner: RefCell<ChannelInner>,
}

impl Drop for ChannelShared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(id) = inner.connection.retry_timer.take() {
            self.timer.cancel(id);
        }
        if let Some(fd) = inner.connection.fd.take() {
            let _ = self.reactor.clear_interest(fd);
            let _ = self.reactor.unregister(fd);
        }
    }
}

enum ReadOutcome {
    Idle,
    Received(usize),
    Closed(AppError),
}

enum FlushOutcome {
    Drained,
    Pending,
    Failed(io::Error),
}

#[derive(Clone)]
pub struct SecureChannel {
    shared: Rc<ChannelShared>,
}

impl SecureChannel {
    pub fn new(
        reactor: Rc<Reactor>,
        timer: Rc<dyn Timer>,
        connector: Box<dyn Connector>,
        reconnect_interval: Duration,
    ) -> Self {
        SecureChannel {
            shared: Rc::new(ChannelShared {
                reactor,
                timer,
                connector,
                reconnect_interval,
                inner: RefCell::new(ChannelInner {
                    connection: Connection {
                        addr: None,
                        stream: None,
                        fd: None,
                        state: ChannelState::Init,
                        retry_timer: None,
                    },
                    send_queue: MessageQueue::new(),
                    recv_queue: MessageQueue::new(),
                    fragment: FrameBuffer::new(),
                    delivering: false,
                    on_connected: None,
                    on_disconnected: None,
                    on_message: None,
                }),
            }),
        }
    }

    fn downgrade(&self) -> Weak<ChannelShared> {
        Rc::downgrade(&self.shared)
    }

    fn upgrade(weak: &Weak<ChannelShared>) -> Option<SecureChannel> {
        weak.upgrade().map(|shared| SecureChannel { shared })
    }

    pub fn state(&self) -> ChannelState {
        self.shared.inner.borrow().connection.state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    pub fn fd(&self) -> Option<RawFd> {
        self.shared.inner.borrow().connection.fd
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.shared.inner.borrow().connection.addr
    }

    /// Messages accepted by `send` and not yet fully written.
    pub fn pending_send(&self) -> usize {
        self.shared.inner.borrow().send_queue.len()
    }

    pub fn reconnect_scheduled(&self) -> bool {
        self.shared.inner.borrow().connection.retry_timer.is_some()
    }

    /// Consumer of every complete inbound message, in arrival order.
    pub fn set_message_handler<F>(&self, handler: F)
    where
        F: FnMut(BytesMut) + 'static,
    {
        self.shared.inner.borrow_mut().on_message = Some(Box::new(handler));
    }

    /// Start connecting to `addr`. Transient failures are retried in the
    /// background; only a fatal synchronous failure is returned, after which
    /// the channel is back in `Init`.
    pub fn initiate<C, D>(&self, addr: SocketAddr, on_connected: C, on_disconnected: D) -> AppResult<()>
    where
        C: FnMut() + 'static,
        D: FnMut() + 'static,
    {
        {
            let mut inner = self.shared.inner.borrow_mut();
            if inner.connection.state != ChannelState::Init {
                return Err(AppError::IllegalState(format!(
                    "cannot initiate a channel in state {:?}",
                    inner.connection.state
                )));
            }
            inner.connection.addr = Some(addr);
            inner.on_connected = Some(Box::new(on_connected));
            inner.on_disconnected = Some(Box::new(on_disconnected));
        }
        self.transition(ChannelState::Connecting);
        info!("connecting to controller at {}", addr);
        self.attempt_connect()
    }

    fn transition(&self, target: ChannelState) -> bool {
        let mut inner = self.shared.inner.borrow_mut();
        let current = inner.connection.state;
        if !ChannelState::can_transition_to(current, target) {
            error!("illegal channel transition {:?} -> {:?}", current, target);
            return false;
        }
        trace!("channel transition {:?} -> {:?}", current, target);
        inner.connection.state = target;
        true
    }

    fn attempt_connect(&self) -> AppResult<()> {
        let Some(addr) = self.peer() else {
            return Err(AppError::IllegalState("no controller address".to_string()));
        };
        match self.shared.connector.connect(addr) {
            Ok((stream, ConnectProgress::Connected)) => {
                self.install_stream(stream);
                self.on_connect_succeeded()
            }
            Ok((stream, ConnectProgress::InProgress)) => {
                let fd = self.install_stream(stream);
                let weak = self.downgrade();
                let watcher: IoCallback = Box::new(move |_: &Reactor, _: RawFd| {
                    if let Some(channel) = SecureChannel::upgrade(&weak) {
                        channel.on_connect_ready();
                    }
                });
                let registered = self
                    .shared
                    .reactor
                    .register(fd, None, Some(watcher))
                    .and_then(|_| self.shared.reactor.set_writable(fd, true));
                if let Err(e) = registered {
                    error!("cannot watch connect to {}: {}", addr, e);
                    self.teardown();
                    return Err(e);
                }
                debug!("connect to {} in progress on descriptor {}", addr, fd);
                Ok(())
            }
            Err(e) if is_transient(&e) => {
                warn!(
                    "connect to {} failed: {}, retrying in {:?}",
                    addr, e, self.shared.reconnect_interval
                );
                self.schedule_reconnect();
                Ok(())
            }
            Err(e) => {
                error!("connect to {} failed: {}", addr, e);
                self.teardown();
                Err(e.into())
            }
        }
    }

    fn install_stream(&self, stream: Box<dyn Stream>) -> RawFd {
        let fd = stream.raw_fd();
        let mut inner = self.shared.inner.borrow_mut();
        inner.connection.stream = Some(stream);
        inner.connection.fd = Some(fd);
        fd
    }

    /// The connect watcher fired: the deferred socket error decides the outcome.
    fn on_connect_ready(&self) {
        let pending = {
            let inner = self.shared.inner.borrow();
            match inner.connection.stream.as_ref() {
                Some(stream) => stream.take_error(),
                None => return,
            }
        };
        self.release_stream();
        match pending {
            Ok(None) => {
                if let Err(e) = self.on_connect_succeeded() {
                    error!("cannot complete connect: {}", e);
                }
            }
            Ok(Some(e)) | Err(e) => {
                let addr = self.peer();
                if is_transient(&e) {
                    warn!(
                        "connect to {:?} failed: {}, retrying in {:?}",
                        addr, e, self.shared.reconnect_interval
                    );
                    self.close_stream();
                    self.schedule_reconnect();
                } else {
                    error!("connect to {:?} failed: {}", addr, e);
                    self.teardown();
                }
            }
        }
    }

    fn on_connect_succeeded(&self) -> AppResult<()> {
        if !self.transition(ChannelState::Connected) {
            self.teardown();
            return Err(AppError::IllegalState(
                "connect completed in an unexpected state".to_string(),
            ));
        }
        let Some(fd) = self.fd() else {
            return Err(AppError::IllegalState("connected without a socket".to_string()));
        };

        let reader = self.downgrade();
        let writer = self.downgrade();
        let on_read: IoCallback = Box::new(move |_: &Reactor, _: RawFd| {
            if let Some(channel) = SecureChannel::upgrade(&reader) {
                channel.on_readable();
            }
        });
        let on_write: IoCallback = Box::new(move |_: &Reactor, _: RawFd| {
            if let Some(channel) = SecureChannel::upgrade(&writer) {
                channel.flush();
            }
        });
        let registered = self
            .shared
            .reactor
            .register(fd, Some(on_read), Some(on_write));
        let armed = registered
            .and_then(|_| self.shared.reactor.set_readable(fd, true))
            .and_then(|_| {
                let backlog = self.pending_send() > 0;
                self.shared.reactor.set_writable(fd, backlog)
            });
        if let Err(e) = armed {
            error!("cannot register connected socket {}: {}", fd, e);
            self.teardown();
            return Err(e);
        }

        info!("connected to controller at {:?}", self.peer());
        self.fire_connected();
        Ok(())
    }

    /// Queue a complete message for the controller.
    pub fn send(&self, message: &[u8]) -> AppResult<()> {
        let fd = {
            let mut inner = self.shared.inner.borrow_mut();
            if inner.connection.state != ChannelState::Connected {
                warn!(
                    "dropping {} byte message, channel is {:?}",
                    message.len(),
                    inner.connection.state
                );
                return Err(AppError::NotConnected);
            }
            inner.send_queue.enqueue(BytesMut::from(message));
            if inner.send_queue.len() > 1 {
                return Ok(());
            }
            inner.connection.fd
        };
        match fd {
            Some(fd) => self.shared.reactor.set_writable(fd, true),
            None => Err(AppError::NotConnected),
        }
    }

    /// Write queued messages until the queue drains or the socket pushes back.
    pub fn flush(&self) {
        let outcome = self.write_queued();
        match outcome {
            FlushOutcome::Drained => {
                if let Some(fd) = self.fd() {
                    if let Err(e) = self.shared.reactor.set_writable(fd, false) {
                        error!("cannot disarm write interest on {}: {}", fd, e);
                    }
                }
            }
            FlushOutcome::Pending => {}
            FlushOutcome::Failed(e) => {
                warn!("write to controller failed: {}", e);
                self.handle_disconnect();
            }
        }
    }

    fn write_queued(&self) -> FlushOutcome {
        let mut guard = self.shared.inner.borrow_mut();
        let inner = &mut *guard;
        let Some(stream) = inner.connection.stream.as_mut() else {
            return FlushOutcome::Pending;
        };
        loop {
            let Some(front) = inner.send_queue.peek_mut() else {
                return FlushOutcome::Drained;
            };
            match stream.write(&front[..]) {
                Ok(written) if written == front.len() => {
                    trace!("wrote {} bytes to controller", written);
                    inner.send_queue.dequeue();
                }
                Ok(0) => return FlushOutcome::Failed(io::Error::from(ErrorKind::WriteZero)),
                Ok(written) => {
                    trace!("partial write of {} of {} bytes", written, front.len());
                    front.advance(written);
                    return FlushOutcome::Pending;
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    return FlushOutcome::Pending;
                }
                Err(e) => return FlushOutcome::Failed(e),
            }
        }
    }

    /// One read from the socket, then hand every complete frame to the consumer.
    pub fn receive(&self) {
        self.on_readable();
    }

    fn on_readable(&self) {
        match self.read_frames() {
            ReadOutcome::Idle => {}
            ReadOutcome::Received(count) => {
                trace!("framed {} message(s) from controller", count);
                self.deliver_messages();
            }
            ReadOutcome::Closed(reason) => {
                // whatever was framed before the failure still goes out
                self.deliver_messages();
                warn!("controller connection lost: {}", reason);
                self.handle_disconnect();
            }
        }
    }

    fn read_frames(&self) -> ReadOutcome {
        let mut guard = self.shared.inner.borrow_mut();
        let inner = &mut *guard;
        if !inner.recv_queue.is_empty() {
            debug!(
                "{} undelivered message(s) pending, deferring read",
                inner.recv_queue.len()
            );
            // a running delivery drains the queue itself
            if inner.delivering {
                return ReadOutcome::Idle;
            }
            return ReadOutcome::Received(0);
        }
        let Some(stream) = inner.connection.stream.as_mut() else {
            return ReadOutcome::Idle;
        };
        let spare = inner.fragment.spare();
        if spare.is_empty() {
            return ReadOutcome::Closed(AppError::MalformedProtocol(
                "fragment buffer full without a complete frame".to_string(),
            ));
        }
        match stream.read(spare) {
            Ok(0) => ReadOutcome::Closed(AppError::Io(io::Error::from(ErrorKind::UnexpectedEof))),
            Ok(read) => {
                inner.fragment.commit(read);
                match inner.fragment.drain_into(&mut inner.recv_queue) {
                    Ok(count) => ReadOutcome::Received(count),
                    Err(e) => ReadOutcome::Closed(e),
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                ReadOutcome::Idle
            }
            Err(e) => ReadOutcome::Closed(AppError::Io(e)),
        }
    }

    fn deliver_messages(&self) {
        {
            let mut inner = self.shared.inner.borrow_mut();
            if inner.delivering {
                // re-entered from the consumer; the outer loop picks up new frames
                return;
            }
            inner.delivering = true;
        }
        loop {
            let message = self.shared.inner.borrow_mut().recv_queue.dequeue();
            let Some(message) = message else {
                break;
            };
            let callback = self.shared.inner.borrow_mut().on_message.take();
            match callback {
                Some(mut callback) => {
                    callback(message);
                    let mut inner = self.shared.inner.borrow_mut();
                    if inner.on_message.is_none() {
                        inner.on_message = Some(callback);
                    }
                }
                None => debug!("no message consumer, dropping {} bytes", message.len()),
            }
        }
        self.shared.inner.borrow_mut().delivering = false;
    }

    fn handle_disconnect(&self) {
        if !self.transition(ChannelState::Disconnected) {
            return;
        }
        self.close_stream();
        warn!(
            "disconnected from controller at {:?}, reconnecting in {:?}",
            self.peer(),
            self.shared.reconnect_interval
        );
        self.fire_disconnected();
        // the callback may have finalized the channel
        if self.state() == ChannelState::Disconnected {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&self) {
        if let Some(previous) = self.shared.inner.borrow_mut().connection.retry_timer.take() {
            self.shared.timer.cancel(previous);
        }
        let weak = self.downgrade();
        let id = self.shared.timer.schedule_once(
            self.shared.reconnect_interval,
            Box::new(move || {
                if let Some(channel) = SecureChannel::upgrade(&weak) {
                    channel.reconnect();
                }
            }),
        );
        self.shared.inner.borrow_mut().connection.retry_timer = Some(id);
    }

    /// Retry the connection now. Only meaningful while `Connecting` or
    /// `Disconnected`.
    pub fn reconnect(&self) {
        self.shared.inner.borrow_mut().connection.retry_timer = None;
        if self.state() == ChannelState::Disconnected {
            self.transition(ChannelState::Connecting);
        }
        if self.state() != ChannelState::Connecting {
            debug!("reconnect skipped in state {:?}", self.state());
            return;
        }
        if let Err(e) = self.attempt_connect() {
            error!("reconnect to controller failed: {}", e);
        }
    }

    /// Detach the socket from the reactor but keep it open.
    fn release_stream(&self) {
        if let Some(fd) = self.fd() {
            let _ = self.shared.reactor.clear_interest(fd);
            if self.shared.reactor.is_registered(fd) {
                let _ = self.shared.reactor.unregister(fd);
            }
        }
    }

    /// Unregister and close the socket, dropping both queues and any partial frame.
    fn close_stream(&self) {
        self.release_stream();
        let (stream, send_dropped, recv_dropped) = {
            let mut inner = self.shared.inner.borrow_mut();
            inner.connection.fd = None;
            let send_dropped = inner.send_queue.len();
            let recv_dropped = inner.recv_queue.len();
            inner.send_queue.clear();
            inner.recv_queue.clear();
            inner.fragment.clear();
            (inner.connection.stream.take(), send_dropped, recv_dropped)
        };
        if send_dropped + recv_dropped > 0 {
            debug!(
                "purged {} outbound and {} inbound message(s)",
                send_dropped, recv_dropped
            );
        }
        drop(stream);
    }

    fn teardown(&self) {
        self.close_stream();
        if let Some(id) = self.shared.inner.borrow_mut().connection.retry_timer.take() {
            self.shared.timer.cancel(id);
        }
        if self.state() != ChannelState::Init {
            self.transition(ChannelState::Init);
        }
    }

    /// Close the channel for good: cancel retries, close the socket and
    /// discard queued messages. The channel may be initiated again afterwards.
    pub fn finalize(&self) {
        if self.state() == ChannelState::Init && self.fd().is_none() && !self.reconnect_scheduled()
        {
            return;
        }
        info!("closing channel to controller at {:?}", self.peer());
        self.teardown();
    }

    fn fire_connected(&self) {
        let callback = self.shared.inner.borrow_mut().on_connected.take();
        if let Some(mut callback) = callback {
            callback();
            let mut inner = self.shared.inner.borrow_mut();
            if inner.on_connected.is_none() {
                inner.on_connected = Some(callback);
            }
        }
    }

    fn fire_disconnected(&self) {
        let callback = self.shared.inner.borrow_mut().on_disconnected.take();
        if let Some(mut callback) = callback {
            callback();
            let mut inner = self.shared.inner.borrow_mut();
            if inner.on_disconnected.is_none() {
                inner.on_disconnected = Some(callback);
            }
        }
    }
}
