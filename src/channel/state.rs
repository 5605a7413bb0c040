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

/// Connection lifecycle of a secure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No socket, nothing scheduled.
    ///
    /// transition: initiate => Connecting
    Init,

    /// A connect is in flight or a retry is scheduled after a transient failure.
    ///
    /// action: retry with a fixed backoff on refused/unreachable/timed out
    /// transition: connect completes => Connected
    ///             fatal connect error => Init
    Connecting,

    /// Socket registered for reads; writes enabled while the send queue is not empty.
    ///
    /// transition: peer closes or I/O fails => Disconnected
    ///             finalize => Init
    Connected,

    /// The peer went away; a reconnect is scheduled.
    ///
    /// transition: reconnect timer fires => Connecting
    ///             connect completes => Connected
    ///             finalize => Init
    Disconnected,
}

impl ChannelState {
    pub const fn can_transition_to(current: ChannelState, target: ChannelState) -> bool {
        match (current, target) {
            (ChannelState::Init, ChannelState::Connecting) => true,
            (ChannelState::Connecting, ChannelState::Connected) => true,
            (ChannelState::Connecting, ChannelState::Init) => true,
            (ChannelState::Connected, ChannelState::Disconnected) => true,
            (ChannelState::Connected, ChannelState::Init) => true,
            (ChannelState::Disconnected, ChannelState::Connecting) => true,
            (ChannelState::Disconnected, ChannelState::Connected) => true,
            (ChannelState::Disconnected, ChannelState::Init) => true,
            _ => false,
        }
    }
}
