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

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// One descriptor in a readiness poll. The reactor fills in the `want_*`
/// flags from its interest sets; the poller fills in the result flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollEntry {
    pub fd: RawFd,
    pub want_read: bool,
    pub want_write: bool,
    pub readable: bool,
    pub writable: bool,
}

impl PollEntry {
    pub fn new(fd: RawFd, want_read: bool, want_write: bool) -> Self {
        PollEntry {
            fd,
            want_read,
            want_write,
            readable: false,
            writable: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.readable || self.writable
    }
}

/// The blocking readiness primitive behind the reactor.
pub trait Poller {
    /// Wait at most `timeout` for any entry to become ready and record the
    /// result in each entry. Returns the number of ready entries.
    fn poll(&mut self, entries: &mut [PollEntry], timeout: Duration) -> io::Result<usize>;
}

/// `poll(2)` with a poll set whose capacity is fixed at construction.
pub struct LibcPoller {
    fds: Vec<libc::pollfd>,
}

impl LibcPoller {
    pub fn new(max_fds: usize) -> Self {
        LibcPoller {
            fds: Vec::with_capacity(max_fds),
        }
    }
}

fn timeout_millis(timeout: Duration) -> libc::c_int {
    // round up so a sub-millisecond wait does not turn into a busy loop
    let millis = timeout.as_micros().div_ceil(1000);
    millis.min(libc::c_int::MAX as u128) as libc::c_int
}

impl Poller for LibcPoller {
    fn poll(&mut self, entries: &mut [PollEntry], timeout: Duration) -> io::Result<usize> {
        if entries.len() > self.fds.capacity() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} descriptors exceed poll capacity {}",
                    entries.len(),
                    self.fds.capacity()
                ),
            ));
        }
        self.fds.clear();
        for entry in entries.iter() {
            let mut events = 0;
            if entry.want_read {
                events |= libc::POLLIN;
            }
            if entry.want_write {
                events |= libc::POLLOUT;
            }
            self.fds.push(libc::pollfd {
                fd: entry.fd,
                events,
                revents: 0,
            });
        }

        // SAFETY: `fds` holds `fds.len()` initialised pollfd structs that stay
        // alive and unaliased for the duration of the call.
        let ret = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_millis(timeout),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                // a signal landed mid-wait, report an empty round
                for entry in entries.iter_mut() {
                    entry.readable = false;
                    entry.writable = false;
                }
                return Ok(0);
            }
            return Err(err);
        }

        for (entry, pollfd) in entries.iter_mut().zip(self.fds.iter()) {
            // errors and hangups are surfaced to whichever side is listening,
            // the handler then sees the failure on its next read or write
            let failed = pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0;
            entry.readable = entry.want_read && (pollfd.revents & libc::POLLIN != 0 || failed);
            entry.writable = entry.want_write && (pollfd.revents & libc::POLLOUT != 0 || failed);
        }
        Ok(ret as usize)
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn test_timeout_rounds_up() {
        assert_eq!(timeout_millis(Duration::from_micros(1)), 1);
        assert_eq!(timeout_millis(Duration::from_millis(5)), 5);
        assert_eq!(timeout_millis(Duration::ZERO), 0);
    }

    #[test]
    fn test_poll_socket_pair() {
        let (mut left, right) = UnixStream::pair().unwrap();
        let mut poller = LibcPoller::new(8);

        let mut entries = [PollEntry::new(right.as_raw_fd(), true, false)];
        let ready = poller.poll(&mut entries, Duration::ZERO).unwrap();
        assert_eq!(ready, 0);
        assert!(!entries[0].readable);

        left.write_all(b"ping").unwrap();
        let mut entries = [
            PollEntry::new(right.as_raw_fd(), true, false),
            PollEntry::new(left.as_raw_fd(), false, true),
        ];
        let ready = poller.poll(&mut entries, Duration::from_millis(100)).unwrap();
        assert_eq!(ready, 2);
        assert!(entries[0].readable);
        assert!(!entries[0].writable);
        assert!(entries[1].writable);
    }

    #[test]
    fn test_capacity_is_fixed() {
        let mut poller = LibcPoller::new(1);
        let mut entries = [PollEntry::new(0, true, false), PollEntry::new(1, true, false)];
        assert!(poller.poll(&mut entries, Duration::ZERO).is_err());
    }
}
