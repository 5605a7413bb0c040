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

use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};

use socket2::{Domain, Protocol, Socket, Type};

/// A connected (or connecting) non-blocking byte stream.
pub trait Stream: Read + Write {
    fn raw_fd(&self) -> RawFd;
    /// The deferred error of an asynchronous connect (`SO_ERROR`).
    fn take_error(&self) -> io::Result<Option<io::Error>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectProgress {
    Connected,
    /// completion is reported by writability
    InProgress,
}

/// Opens the outbound stream to the controller.
pub trait Connector {
    fn connect(&self, addr: SocketAddr) -> io::Result<(Box<dyn Stream>, ConnectProgress)>;
}

impl Stream for Socket {
    fn raw_fd(&self) -> RawFd {
        self.as_raw_fd()
    }

    fn take_error(&self) -> io::Result<Option<io::Error>> {
        Socket::take_error(self)
    }
}

/// Non-blocking TCP with Nagle disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&self, addr: SocketAddr) -> io::Result<(Box<dyn Stream>, ConnectProgress)> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        socket.set_nodelay(true)?;
        match socket.connect(&addr.into()) {
            Ok(()) => Ok((Box::new(socket), ConnectProgress::Connected)),
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {
                Ok((Box::new(socket), ConnectProgress::InProgress))
            }
            Err(e) => Err(e),
        }
    }
}

/// Connect failures worth retrying after the backoff interval.
pub fn is_transient(error: &io::Error) -> bool {
    if let Some(code) = error.raw_os_error() {
        return matches!(
            code,
            libc::EINTR
                | libc::EAGAIN
                | libc::ECONNREFUSED
                | libc::ENETUNREACH
                | libc::EHOSTUNREACH
                | libc::ETIMEDOUT
        );
    }
    matches!(
        error.kind(),
        ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::ConnectionRefused
            | ErrorKind::TimedOut
    )
}
