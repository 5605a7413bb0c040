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

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};

use ofswitch::channel::{ConnectProgress, Connector, SecureChannel, Stream};
use ofswitch::ofp::action::Action;
use ofswitch::ofp::{encode_message, MessageType};
use ofswitch::reactor::{PollEntry, Poller, Reactor};
use ofswitch::switch::{ContextSettings, SwitchInterface};
use ofswitch::timer::{ManualClock, Timer, TimerQueue};

pub const RECONNECT: Duration = Duration::from_secs(5);

/// Both directions of a fake connection.
#[derive(Default)]
pub struct Wire {
    /// chunks handed out by successive reads
    pub inbound: VecDeque<io::Result<Vec<u8>>>,
    pub written: Vec<u8>,
    /// bytes the peer still accepts, `None` for unlimited
    pub write_budget: Option<usize>,
    pub write_error: Option<ErrorKind>,
    pub closed: bool,
    pub connect_error: Option<io::Error>,
}

pub type SharedWire = Rc<RefCell<Wire>>;

pub fn wire() -> SharedWire {
    Rc::new(RefCell::new(Wire::default()))
}

pub struct FakeStream {
    fd: RawFd,
    wire: SharedWire,
}

impl Read for FakeStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.wire.borrow_mut();
        match wire.inbound.pop_front() {
            Some(Ok(mut chunk)) => {
                let read = chunk.len().min(buf.len());
                buf[..read].copy_from_slice(&chunk[..read]);
                if read < chunk.len() {
                    let rest = chunk.split_off(read);
                    wire.inbound.push_front(Ok(rest));
                }
                Ok(read)
            }
            Some(Err(e)) => Err(e),
            None if wire.closed => Ok(0),
            None => Err(io::Error::from(ErrorKind::WouldBlock)),
        }
    }
}

impl Write for FakeStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut wire = self.wire.borrow_mut();
        if let Some(kind) = wire.write_error {
            return Err(io::Error::from(kind));
        }
        let accepted = match wire.write_budget {
            Some(0) => return Err(io::Error::from(ErrorKind::WouldBlock)),
            Some(budget) => {
                let accepted = budget.min(buf.len());
                wire.write_budget = Some(budget - accepted);
                accepted
            }
            None => buf.len(),
        };
        wire.written.extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for FakeStream {
    fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn take_error(&self) -> io::Result<Option<io::Error>> {
        Ok(self.wire.borrow_mut().connect_error.take())
    }
}

pub enum ConnectStep {
    Refuse,
    Fail(io::Error),
    Establish(SharedWire),
    Pending(SharedWire),
}

pub struct FakeConnector {
    script: Rc<RefCell<VecDeque<ConnectStep>>>,
    attempts: Rc<Cell<usize>>,
    next_fd: Cell<RawFd>,
}

impl Connector for FakeConnector {
    fn connect(&self, _addr: SocketAddr) -> io::Result<(Box<dyn Stream>, ConnectProgress)> {
        self.attempts.set(self.attempts.get() + 1);
        let fd = self.next_fd.get();
        self.next_fd.set(fd + 1);
        match self.script.borrow_mut().pop_front() {
            None | Some(ConnectStep::Refuse) => Err(io::Error::from(ErrorKind::ConnectionRefused)),
            Some(ConnectStep::Fail(e)) => Err(e),
            Some(ConnectStep::Establish(wire)) => Ok((
                Box::new(FakeStream { fd, wire }),
                ConnectProgress::Connected,
            )),
            Some(ConnectStep::Pending(wire)) => Ok((
                Box::new(FakeStream { fd, wire }),
                ConnectProgress::InProgress,
            )),
        }
    }
}

/// Reports every requested direction ready on every round.
pub struct ReadyPoller;

impl Poller for ReadyPoller {
    fn poll(&mut self, entries: &mut [PollEntry], _timeout: Duration) -> io::Result<usize> {
        for entry in entries.iter_mut() {
            entry.readable = entry.want_read;
            entry.writable = entry.want_write;
        }
        Ok(entries.len())
    }
}

pub struct Harness {
    pub reactor: Rc<Reactor>,
    pub clock: Rc<ManualClock>,
    pub timers: Rc<TimerQueue>,
    pub script: Rc<RefCell<VecDeque<ConnectStep>>>,
    pub attempts: Rc<Cell<usize>>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Rc::new(ManualClock::new());
        Harness {
            reactor: Rc::new(Reactor::new(Box::new(ReadyPoller), 64)),
            timers: Rc::new(TimerQueue::new(clock.clone())),
            clock,
            script: Rc::new(RefCell::new(VecDeque::new())),
            attempts: Rc::new(Cell::new(0)),
        }
    }

    pub fn expect(&self, step: ConnectStep) {
        self.script.borrow_mut().push_back(step);
    }

    pub fn connector(&self) -> Box<dyn Connector> {
        Box::new(FakeConnector {
            script: self.script.clone(),
            attempts: self.attempts.clone(),
            next_fd: Cell::new(10),
        })
    }

    pub fn timer(&self) -> Rc<dyn Timer> {
        self.timers.clone()
    }

    pub fn channel(&self) -> SecureChannel {
        SecureChannel::new(self.reactor.clone(), self.timer(), self.connector(), RECONNECT)
    }

    pub fn switch(&self) -> SwitchInterface {
        SwitchInterface::new(self.channel(), self.timer(), ContextSettings::default())
    }

    /// A few poll rounds, firing due timers after each.
    pub fn pump(&self) {
        for _ in 0..4 {
            self.reactor.run_once(Duration::ZERO).unwrap();
            self.timers.fire_due();
        }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
        self.timers.fire_due();
    }
}

pub fn controller() -> SocketAddr {
    "127.0.0.1:6633".parse().unwrap()
}

pub fn flow_mod(xid: u32, actions: &[Action]) -> BytesMut {
    let mut body = BytesMut::new();
    body.put_bytes(0, 40); // match everything
    body.put_u64(0xfeed);
    body.put_u16(0); // add
    body.put_u16(0);
    body.put_u16(0);
    body.put_u16(0x8000);
    body.put_u32(0xffff_ffff);
    body.put_u16(0xffff);
    body.put_u16(0);
    for action in actions {
        action.encode(&mut body);
    }
    encode_message(MessageType::FlowMod, xid, &body).unwrap()
}

pub fn echo_request(xid: u32, body: &[u8]) -> BytesMut {
    encode_message(MessageType::EchoRequest, xid, body).unwrap()
}
