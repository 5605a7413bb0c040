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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::AppResult;

/// Cloneable stop flag for the event loop. Any clone may trigger it, from
/// any thread; the loop notices on its next iteration.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    is_shutdown: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Shutdown {
        Shutdown::default()
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Acquire)
    }

    /// Returns whether this call was the first trigger.
    pub fn trigger(&self) -> bool {
        !self.is_shutdown.swap(true, Ordering::AcqRel)
    }

    /// Trigger on SIGINT or SIGTERM. A second signal exits at once.
    pub fn install_signal_handler(&self) -> AppResult<()> {
        let shutdown = self.clone();
        ctrlc::set_handler(move || {
            if !shutdown.trigger() {
                warn!("received second signal, exiting immediately");
                std::process::exit(1);
            }
            info!("received shutdown signal, stopping event loop");
        })?;
        Ok(())
    }
}
