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

//! Single threaded I/O event reactor.
//!
//! The reactor keeps one registration per file descriptor, each carrying an
//! optional read callback and an optional write callback together with the
//! current read/write interest. [`Reactor::run_once`] waits for readiness
//! through an injected [`Poller`] and then invokes the callbacks of the ready
//! descriptors, writes before reads.
//!
//! Callbacks receive the reactor itself, so they may change interest,
//! unregister their own descriptor or register new ones while the dispatch
//! pass is running. Every registration carries a generation number; when a
//! descriptor number is closed and reused inside one pass, the stale readiness
//! is dropped instead of being delivered to the new owner.
//!
//! The reactor is not `Send`. The only cross-thread entry point is the
//! [`ExternalHandle`], which installs a one-shot callback executed at the start
//! of the next [`Reactor::run_once`].

pub use poller::{LibcPoller, PollEntry, Poller};

mod poller;

use std::cell::RefCell;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::{AppError, AppResult};

/// Default process-wide descriptor limit, the classic `FD_SETSIZE`.
pub const DEFAULT_MAX_FDS: usize = 1024;

pub type IoCallback = Box<dyn FnMut(&Reactor, RawFd)>;
pub type ExternalCallback = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

struct FdRegistration {
    fd: RawFd,
    generation: u64,
    on_read: Option<IoCallback>,
    on_write: Option<IoCallback>,
    // the callbacks are moved out while they run, these record installation
    has_read: bool,
    has_write: bool,
    read_interest: bool,
    write_interest: bool,
}

impl FdRegistration {
    fn interest(&self, direction: Direction) -> bool {
        match direction {
            Direction::Read => self.read_interest,
            Direction::Write => self.write_interest,
        }
    }

    fn slot(&mut self, direction: Direction) -> &mut Option<IoCallback> {
        match direction {
            Direction::Read => &mut self.on_read,
            Direction::Write => &mut self.on_write,
        }
    }
}

#[derive(Default)]
struct Registry {
    entries: Vec<FdRegistration>,
    /// one past the highest registered descriptor
    high_water: RawFd,
    next_generation: u64,
}

impl Registry {
    fn position(&self, fd: RawFd) -> Option<usize> {
        self.entries.iter().position(|entry| entry.fd == fd)
    }

    fn get_mut(&mut self, fd: RawFd) -> Option<&mut FdRegistration> {
        self.entries.iter_mut().find(|entry| entry.fd == fd)
    }

    fn recompute_high_water(&mut self) {
        self.high_water = self
            .entries
            .iter()
            .map(|entry| entry.fd + 1)
            .max()
            .unwrap_or(0);
    }
}

/// Cross-thread handle used to hand a one-shot callback to the reactor thread.
#[derive(Clone, Default)]
pub struct ExternalHandle {
    slot: Arc<Mutex<Option<ExternalCallback>>>,
}

impl ExternalHandle {
    /// Install a callback to run on the reactor thread at the start of the
    /// next poll round. Fails while a previously installed callback has not
    /// run yet.
    pub fn set_external_callback<F>(&self, callback: F) -> AppResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(AppError::ExternalCallbackPending);
        }
        *slot = Some(Box::new(callback));
        Ok(())
    }

    fn take(&self) -> Option<ExternalCallback> {
        self.slot.lock().take()
    }
}

pub struct Reactor {
    registry: RefCell<Registry>,
    poller: RefCell<Box<dyn Poller>>,
    poll_set: RefCell<Vec<PollEntry>>,
    max_fds: usize,
    external: ExternalHandle,
}

impl Reactor {
    pub fn new(poller: Box<dyn Poller>, max_fds: usize) -> Self {
        Reactor {
            registry: RefCell::new(Registry::default()),
            poller: RefCell::new(poller),
            poll_set: RefCell::new(Vec::with_capacity(max_fds)),
            max_fds,
            external: ExternalHandle::default(),
        }
    }

    /// Reactor backed by `poll(2)`.
    pub fn with_libc_poller(max_fds: usize) -> Self {
        Reactor::new(Box::new(LibcPoller::new(max_fds)), max_fds)
    }

    pub fn max_fds(&self) -> usize {
        self.max_fds
    }

    pub fn register(
        &self,
        fd: RawFd,
        on_read: Option<IoCallback>,
        on_write: Option<IoCallback>,
    ) -> AppResult<()> {
        if fd < 0 || fd as usize >= self.max_fds {
            error!("cannot register descriptor {}: outside 0..{}", fd, self.max_fds);
            return Err(AppError::DescriptorOutOfRange {
                fd,
                max: self.max_fds,
            });
        }
        let mut registry = self.registry.borrow_mut();
        if registry.position(fd).is_some() {
            error!("descriptor {} is already registered", fd);
            return Err(AppError::AlreadyRegistered(fd));
        }

        let generation = registry.next_generation;
        registry.next_generation += 1;
        registry.entries.push(FdRegistration {
            fd,
            generation,
            has_read: on_read.is_some(),
            has_write: on_write.is_some(),
            on_read,
            on_write,
            read_interest: false,
            write_interest: false,
        });
        registry.high_water = registry.high_water.max(fd + 1);
        trace!("registered descriptor {} generation {}", fd, generation);
        Ok(())
    }

    pub fn unregister(&self, fd: RawFd) -> AppResult<()> {
        let mut registry = self.registry.borrow_mut();
        let Some(index) = registry.position(fd) else {
            error!("cannot unregister descriptor {}: not registered", fd);
            return Err(AppError::NotRegistered(fd));
        };
        let entry = &registry.entries[index];
        if entry.read_interest || entry.write_interest {
            error!(
                "descriptor {} unregistered with live interest (read: {}, write: {})",
                fd, entry.read_interest, entry.write_interest
            );
        }
        // the last entry takes over the freed slot
        let removed = registry.entries.swap_remove(index);
        registry.recompute_high_water();
        trace!(
            "unregistered descriptor {} generation {}",
            fd,
            removed.generation
        );
        // drop the callbacks outside the borrow, they may own reactor users
        drop(registry);
        drop(removed);
        Ok(())
    }

    pub fn set_readable(&self, fd: RawFd, enabled: bool) -> AppResult<()> {
        self.set_interest(fd, Direction::Read, enabled)
    }

    pub fn set_writable(&self, fd: RawFd, enabled: bool) -> AppResult<()> {
        self.set_interest(fd, Direction::Write, enabled)
    }

    /// Drop both interests, whichever callbacks are installed.
    pub fn clear_interest(&self, fd: RawFd) -> AppResult<()> {
        let mut registry = self.registry.borrow_mut();
        let Some(entry) = registry.get_mut(fd) else {
            return Err(AppError::NotRegistered(fd));
        };
        entry.read_interest = false;
        entry.write_interest = false;
        Ok(())
    }

    fn set_interest(&self, fd: RawFd, direction: Direction, enabled: bool) -> AppResult<()> {
        let mut registry = self.registry.borrow_mut();
        let Some(entry) = registry.get_mut(fd) else {
            error!("cannot change {:?} interest of unregistered descriptor {}", direction, fd);
            return Err(AppError::NotRegistered(fd));
        };
        match direction {
            Direction::Read => {
                if !entry.has_read {
                    error!("descriptor {} has no read callback", fd);
                    return Err(AppError::IllegalState(format!(
                        "descriptor {} has no read callback",
                        fd
                    )));
                }
                entry.read_interest = enabled;
            }
            Direction::Write => {
                if !entry.has_write {
                    error!("descriptor {} has no write callback", fd);
                    return Err(AppError::IllegalState(format!(
                        "descriptor {} has no write callback",
                        fd
                    )));
                }
                entry.write_interest = enabled;
            }
        }
        Ok(())
    }

    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.registry.borrow().position(fd).is_some()
    }

    pub fn is_readable(&self, fd: RawFd) -> bool {
        let mut registry = self.registry.borrow_mut();
        registry.get_mut(fd).is_some_and(|entry| entry.read_interest)
    }

    pub fn is_writable(&self, fd: RawFd) -> bool {
        let mut registry = self.registry.borrow_mut();
        registry.get_mut(fd).is_some_and(|entry| entry.write_interest)
    }

    pub fn registered_count(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    pub fn high_water(&self) -> RawFd {
        self.registry.borrow().high_water
    }

    pub fn external_handle(&self) -> ExternalHandle {
        self.external.clone()
    }

    /// Run one poll round: the pending external callback, one readiness wait
    /// of at most `timeout`, then dispatch. Returns the number of callbacks
    /// invoked. An interrupted wait is not an error, any other poll failure
    /// is and should stop the driving loop.
    pub fn run_once(&self, timeout: Duration) -> AppResult<usize> {
        if let Some(callback) = self.external.take() {
            callback();
        }

        let mut poll_set = self.poll_set.take();
        let mut generations = Vec::with_capacity(poll_set.capacity());
        poll_set.clear();
        {
            let registry = self.registry.borrow();
            for entry in registry.entries.iter() {
                if entry.read_interest || entry.write_interest {
                    poll_set.push(PollEntry::new(
                        entry.fd,
                        entry.read_interest,
                        entry.write_interest,
                    ));
                    generations.push(entry.generation);
                }
            }
        }

        let polled = self.poller.borrow_mut().poll(&mut poll_set, timeout);
        let result = match polled {
            Ok(0) => Ok(0),
            Ok(_) => {
                let mut dispatched = 0;
                for (entry, generation) in poll_set.iter().zip(generations.iter()) {
                    // drain pending output before admitting new input
                    if entry.writable && self.dispatch(entry.fd, *generation, Direction::Write) {
                        dispatched += 1;
                    }
                    if entry.readable && self.dispatch(entry.fd, *generation, Direction::Read) {
                        dispatched += 1;
                    }
                }
                Ok(dispatched)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                trace!("readiness wait interrupted");
                Ok(0)
            }
            Err(e) => {
                error!("readiness wait failed: {}", e);
                Err(AppError::Io(e))
            }
        };

        *self.poll_set.borrow_mut() = poll_set;
        result
    }

    fn dispatch(&self, fd: RawFd, generation: u64, direction: Direction) -> bool {
        let callback = {
            let mut registry = self.registry.borrow_mut();
            match registry.get_mut(fd) {
                Some(entry) if entry.generation != generation => {
                    trace!(
                        "descriptor {} was reused during dispatch, skipping {:?}",
                        fd,
                        direction
                    );
                    None
                }
                Some(entry) if entry.interest(direction) => entry.slot(direction).take(),
                _ => None,
            }
        };
        let Some(mut callback) = callback else {
            return false;
        };

        callback(self, fd);

        let mut registry = self.registry.borrow_mut();
        if let Some(entry) = registry.get_mut(fd) {
            if entry.generation == generation {
                let slot = entry.slot(direction);
                if slot.is_none() {
                    *slot = Some(callback);
                    return true;
                }
            }
        }
        // the registration went away inside the callback
        drop(registry);
        drop(callback);
        true
    }
}
