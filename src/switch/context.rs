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

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::{AppError, AppResult};

/// Where the reply to a pending request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    SecureChannel,
    /// a named in-process service, reached through the local relay
    Local(String),
}

/// A request awaiting its reply, or an error that references it.
#[derive(Debug, Clone)]
pub struct PendingContext {
    pub xid: u32,
    pub message: Bytes,
    pub route: Route,
    pub created_at: Instant,
}

impl PendingContext {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

/// Pending requests keyed by transaction id.
///
/// Replies are correlated by xid alone: two originators that pick the same
/// xid for overlapping requests cannot both be tracked, the second `save`
/// fails.
#[derive(Debug)]
pub struct ContextTable {
    entries: HashMap<u32, PendingContext>,
    lifetime: Duration,
}

impl ContextTable {
    pub fn new(lifetime: Duration) -> Self {
        ContextTable {
            entries: HashMap::new(),
            lifetime,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Store a copy of `message` under `xid`. An existing entry is left
    /// untouched and the call fails.
    pub fn save(&mut self, xid: u32, message: &[u8], route: Route, now: Instant) -> AppResult<()> {
        if self.entries.contains_key(&xid) {
            warn!("transaction {:#010x} already has a pending context", xid);
            return Err(AppError::DuplicateTransaction(xid));
        }
        trace!("saving context {:#010x} routed to {:?}", xid, route);
        self.entries.insert(
            xid,
            PendingContext {
                xid,
                message: Bytes::copy_from_slice(message),
                route,
                created_at: now,
            },
        );
        Ok(())
    }

    pub fn delete(&mut self, xid: u32) -> Option<PendingContext> {
        self.entries.remove(&xid)
    }

    pub fn get(&self, xid: u32) -> Option<&PendingContext> {
        self.entries.get(&xid)
    }

    pub fn contains(&self, xid: u32) -> bool {
        self.entries.contains_key(&xid)
    }

    /// Evict every context older than the lifetime. Returns the number evicted.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let lifetime = self.lifetime;
        self.entries.retain(|xid, context| {
            let keep = context.age(now) <= lifetime;
            if !keep {
                debug!("context {:#010x} expired after {:?}", xid, context.age(now));
            }
            keep
        });
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const LIFETIME: Duration = Duration::from_secs(5);

    #[test]
    fn test_duplicate_save_keeps_first() {
        let now = Instant::now();
        let mut table = ContextTable::new(LIFETIME);
        table.save(9, b"first", Route::SecureChannel, now).unwrap();

        let second = table.save(9, b"second", Route::Local("dpctl".into()), now);
        assert!(matches!(second, Err(AppError::DuplicateTransaction(9))));

        let context = table.get(9).unwrap();
        assert_eq!(&context.message[..], b"first");
        assert_eq!(context.route, Route::SecureChannel);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let mut table = ContextTable::new(LIFETIME);
        assert!(table.delete(1).is_none());
        table
            .save(1, b"x", Route::SecureChannel, Instant::now())
            .unwrap();
        assert!(table.delete(1).is_some());
        assert!(table.delete(1).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_sweep_evicts_only_expired() {
        let start = Instant::now();
        let mut table = ContextTable::new(LIFETIME);
        table.save(1, b"old", Route::SecureChannel, start).unwrap();
        table
            .save(2, b"young", Route::SecureChannel, start + Duration::from_secs(3))
            .unwrap();

        // exactly at the lifetime nothing expires yet
        assert_eq!(table.sweep(start + LIFETIME), 0);

        assert_eq!(table.sweep(start + Duration::from_secs(6)), 1);
        assert!(!table.contains(1));
        assert!(table.contains(2));

        assert_eq!(table.sweep(start + Duration::from_secs(9)), 1);
        assert!(table.is_empty());
    }
}
