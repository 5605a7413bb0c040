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

pub mod channel;
pub mod ofp;
pub mod queue;
pub mod reactor;
pub mod service;
pub mod switch;
pub mod timer;

pub use channel::{ChannelState, SecureChannel, TcpConnector};
pub use queue::MessageQueue;
pub use reactor::{LibcPoller, Reactor};
pub use service::{
    setup_local_tracing, setup_tracing, verbosity_level, AppError, AppResult, EventLoop, Shutdown,
    SwitchConfig,
};
pub use switch::{LocalRelay, Route, SwitchInterface};
pub use timer::{Timer, TimerQueue};
