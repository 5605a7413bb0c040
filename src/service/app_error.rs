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

use std::os::unix::io::RawFd;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("malformed protocol : {0}")]
    MalformedProtocol(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("tracing setup error: {0}")]
    TracingSetup(String),

    #[error("signal handler error: {0}")]
    SignalHandler(#[from] ctrlc::Error),

    /// reactor errors
    #[error("descriptor {0} is already registered")]
    AlreadyRegistered(RawFd),

    #[error("descriptor {0} is not registered")]
    NotRegistered(RawFd),

    #[error("descriptor {fd} is outside 0..{max}")]
    DescriptorOutOfRange { fd: RawFd, max: usize },

    #[error("external callback is already installed")]
    ExternalCallbackPending,

    /// channel errors
    #[error("secure channel is not connected")]
    NotConnected,

    /// switch interface errors
    #[error("transaction {0:#010x} already has a pending context")]
    DuplicateTransaction(u32),

    #[error("unknown error type/code pair: type={err_type:#06x} code={code:#06x}")]
    UnknownErrorCode { err_type: u16, code: u16 },

    #[error("no local relay installed for service {0}")]
    NoLocalRelay(String),

    /// marker error, the buffer does not yet hold a complete frame
    #[error("incomplete frame")]
    Incomplete,
}
