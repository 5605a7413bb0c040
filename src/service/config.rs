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

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

/// Environment variables prefixed with this override file values,
/// e.g. `OFSWITCH__CONTROLLER__PORT=6653`.
pub const ENV_PREFIX: &str = "OFSWITCH";

/// Upper bound for every interval and lifetime setting, one day.
pub const MAX_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ControllerConfig {
    pub ip: String,
    pub port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            ip: "127.0.0.1".to_string(),
            port: 6633,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ChannelConfig {
    /// Delay before a failed or dropped connection is retried.
    pub reconnect_interval_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            reconnect_interval_secs: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ContextConfig {
    /// How long a pending transaction context survives.
    pub lifetime_secs: u64,
    /// How often the context table is swept for expired entries.
    pub sweep_interval_secs: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            lifetime_secs: 5,
            sweep_interval_secs: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EventLoopConfig {
    /// Upper bound of a single readiness wait.
    pub max_wait_ms: u64,
    /// Highest descriptor number (exclusive) the reactor accepts.
    pub max_fds: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        EventLoopConfig {
            max_wait_ms: 1000,
            max_fds: crate::reactor::DEFAULT_MAX_FDS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub file_logging: bool,
    pub dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            file_logging: false,
            dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SwitchConfig {
    pub controller: ControllerConfig,
    pub channel: ChannelConfig,
    pub context: ContextConfig,
    pub event_loop: EventLoopConfig,
    pub log: LogConfig,
}

impl SwitchConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<SwitchConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let switch_config: SwitchConfig = config.try_deserialize()?;
        switch_config.validate()?;
        Ok(switch_config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.controller_addr()?;
        if self.channel.reconnect_interval_secs == 0 {
            return Err(AppError::InvalidValue(
                "channel.reconnect_interval_secs must be positive".to_string(),
            ));
        }
        if self.context.sweep_interval_secs == 0 {
            return Err(AppError::InvalidValue(
                "context.sweep_interval_secs must be positive".to_string(),
            ));
        }
        for (name, secs) in [
            ("channel.reconnect_interval_secs", self.channel.reconnect_interval_secs),
            ("context.sweep_interval_secs", self.context.sweep_interval_secs),
            ("context.lifetime_secs", self.context.lifetime_secs),
        ] {
            if secs > MAX_INTERVAL_SECS {
                return Err(AppError::InvalidValue(format!(
                    "{} must not exceed {}, got {}",
                    name, MAX_INTERVAL_SECS, secs
                )));
            }
        }
        if self.event_loop.max_fds == 0 {
            return Err(AppError::InvalidValue(
                "event_loop.max_fds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn controller_addr(&self) -> AppResult<SocketAddr> {
        let ip: IpAddr = self.controller.ip.parse().map_err(|_| {
            AppError::InvalidValue(format!("controller ip: {}", self.controller.ip))
        })?;
        Ok(SocketAddr::new(ip, self.controller.port))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.channel.reconnect_interval_secs)
    }

    pub fn context_lifetime(&self) -> Duration {
        Duration::from_secs(self.context.lifetime_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.context.sweep_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.event_loop.max_wait_ms)
    }
}
