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

//! One-shot and periodic timers for the single threaded event loop.
//!
//! Nothing here runs on its own: the event loop asks [`TimerQueue`] how long
//! it may block, and calls [`TimerQueue::fire_due`] after every poll round.

pub use clock::{Clock, ManualClock, SystemClock};

mod clock;

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::trace;

pub type OneShotCallback = Box<dyn FnOnce()>;
pub type PeriodicCallback = Box<dyn FnMut()>;

const MIN_PERIOD: Duration = Duration::from_millis(1);
/// Stand-in deadline for delays that do not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(from: Instant, delay: Duration) -> Instant {
    from.checked_add(delay)
        .or_else(|| from.checked_add(FAR_FUTURE))
        .unwrap_or(from)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Scheduling surface consumed by the channel and the switch interface.
pub trait Timer {
    fn schedule_once(&self, delay: Duration, callback: OneShotCallback) -> TimerId;
    fn schedule_periodic(&self, interval: Duration, callback: PeriodicCallback) -> TimerId;
    /// Returns false when the timer already fired (one-shot) or was cancelled.
    fn cancel(&self, id: TimerId) -> bool;
    fn now(&self) -> Instant;
}

enum TimerTask {
    Once(OneShotCallback),
    Periodic {
        interval: Duration,
        callback: PeriodicCallback,
    },
}

struct TimerEntry {
    deadline: Instant,
    // moved out while a periodic callback runs
    task: Option<TimerTask>,
}

#[derive(Default)]
struct Inner {
    deadlines: BinaryHeap<Reverse<(Instant, u64)>>,
    entries: HashMap<u64, TimerEntry>,
    next_id: u64,
}

impl Inner {
    fn insert(&mut self, deadline: Instant, task: TimerTask) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.deadlines.push(Reverse((deadline, id)));
        self.entries.insert(
            id,
            TimerEntry {
                deadline,
                task: Some(task),
            },
        );
        TimerId(id)
    }

    /// Drop heap tops that no longer match a live entry.
    fn discard_stale(&mut self) {
        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            match self.entries.get(&id) {
                Some(entry) if entry.deadline == deadline => break,
                _ => {
                    self.deadlines.pop();
                }
            }
        }
    }
}

pub struct TimerQueue {
    clock: Rc<dyn Clock>,
    inner: RefCell<Inner>,
}

impl TimerQueue {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        TimerQueue {
            clock,
            inner: RefCell::new(Inner::default()),
        }
    }

    pub fn with_system_clock() -> Self {
        TimerQueue::new(Rc::new(SystemClock))
    }

    pub fn pending(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let mut inner = self.inner.borrow_mut();
        inner.discard_stale();
        inner.deadlines.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// How long the event loop may block before the next timer is due.
    pub fn time_until_next(&self) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(self.clock.now()))
    }

    /// Run every timer whose deadline has passed. Returns how many fired.
    pub fn fire_due(&self) -> usize {
        let mut fired = 0;
        loop {
            let now = self.clock.now();
            let (id, deadline, task) = {
                let mut inner = self.inner.borrow_mut();
                inner.discard_stale();
                let Some(Reverse((deadline, id))) = inner.deadlines.peek().copied() else {
                    break;
                };
                if deadline > now {
                    break;
                }
                inner.deadlines.pop();
                let is_once = matches!(
                    inner.entries.get(&id),
                    Some(TimerEntry {
                        task: Some(TimerTask::Once(_)),
                        ..
                    })
                );
                let task = if is_once {
                    inner.entries.remove(&id).and_then(|entry| entry.task)
                } else {
                    inner.entries.get_mut(&id).and_then(|entry| entry.task.take())
                };
                (id, deadline, task)
            };

            match task {
                Some(TimerTask::Once(callback)) => {
                    trace!("one-shot timer {} fired", id);
                    callback();
                }
                Some(TimerTask::Periodic {
                    interval,
                    mut callback,
                }) => {
                    trace!("periodic timer {} fired", id);
                    callback();
                    let mut guard = self.inner.borrow_mut();
                    let inner = &mut *guard;
                    // cancelled from inside its own callback
                    if let Some(entry) = inner.entries.get_mut(&id) {
                        let mut next = deadline_after(deadline, interval);
                        if next <= now {
                            next = deadline_after(now, interval);
                        }
                        entry.deadline = next;
                        entry.task = Some(TimerTask::Periodic { interval, callback });
                        inner.deadlines.push(Reverse((next, id)));
                    }
                }
                None => continue,
            }
            fired += 1;
        }
        fired
    }
}

impl Timer for TimerQueue {
    fn schedule_once(&self, delay: Duration, callback: OneShotCallback) -> TimerId {
        let deadline = deadline_after(self.clock.now(), delay);
        self.inner
            .borrow_mut()
            .insert(deadline, TimerTask::Once(callback))
    }

    fn schedule_periodic(&self, interval: Duration, callback: PeriodicCallback) -> TimerId {
        let interval = interval.max(MIN_PERIOD);
        let deadline = deadline_after(self.clock.now(), interval);
        self.inner
            .borrow_mut()
            .insert(deadline, TimerTask::Periodic { interval, callback })
    }

    fn cancel(&self, id: TimerId) -> bool {
        // the stale heap slot is skipped lazily
        self.inner.borrow_mut().entries.remove(&id.0).is_some()
    }

    fn now(&self) -> Instant {
        self.clock.now()
    }
}
