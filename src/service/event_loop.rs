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

use std::rc::Rc;
use std::time::Duration;

use tracing::{info, trace};

use super::{AppResult, Shutdown};
use crate::reactor::Reactor;
use crate::timer::TimerQueue;

/// Drives the reactor and the timers on the current thread.
pub struct EventLoop {
    reactor: Rc<Reactor>,
    timers: Rc<TimerQueue>,
    max_wait: Duration,
}

impl EventLoop {
    pub fn new(reactor: Rc<Reactor>, timers: Rc<TimerQueue>, max_wait: Duration) -> Self {
        EventLoop {
            reactor,
            timers,
            max_wait,
        }
    }

    pub fn reactor(&self) -> &Rc<Reactor> {
        &self.reactor
    }

    pub fn timers(&self) -> &Rc<TimerQueue> {
        &self.timers
    }

    /// One readiness wait, bounded by the next timer and `max_wait`, then
    /// every due timer. Returns the number of callbacks run.
    pub fn run_once(&self) -> AppResult<usize> {
        let timeout = self
            .timers
            .time_until_next()
            .map_or(self.max_wait, |due| due.min(self.max_wait));
        let dispatched = self.reactor.run_once(timeout)?;
        let fired = self.timers.fire_due();
        if dispatched + fired > 0 {
            trace!("loop round: {} io callbacks, {} timers", dispatched, fired);
        }
        Ok(dispatched + fired)
    }

    /// Loop until `shutdown` is triggered or the readiness wait fails.
    pub fn run(&self, shutdown: &Shutdown) -> AppResult<()> {
        info!("event loop started");
        while !shutdown.is_shutdown() {
            self.run_once()?;
        }
        info!("event loop stopped");
        Ok(())
    }
}
