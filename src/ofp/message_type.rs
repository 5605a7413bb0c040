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

use std::fmt;

use crate::AppError;

/// OpenFlow 1.0 message type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /* Immutable messages. */
    Hello = 0,
    Error = 1,
    EchoRequest = 2,
    EchoReply = 3,
    Vendor = 4,

    /* Switch configuration messages. */
    FeaturesRequest = 5,
    FeaturesReply = 6,
    GetConfigRequest = 7,
    GetConfigReply = 8,
    SetConfig = 9,

    /* Asynchronous messages. */
    PacketIn = 10,
    FlowRemoved = 11,
    PortStatus = 12,

    /* Controller command messages. */
    PacketOut = 13,
    FlowMod = 14,
    PortMod = 15,

    /* Statistics messages. */
    StatsRequest = 16,
    StatsReply = 17,

    /* Barrier messages. */
    BarrierRequest = 18,
    BarrierReply = 19,

    /* Queue Configuration messages. */
    QueueGetConfigRequest = 20,
    QueueGetConfigReply = 21,
}

impl MessageType {
    /// Kinds a switch expects to receive and dispatches to a handler.
    pub fn is_dispatchable(&self) -> bool {
        matches!(
            self,
            MessageType::Hello
                | MessageType::Error
                | MessageType::EchoRequest
                | MessageType::EchoReply
                | MessageType::Vendor
                | MessageType::FeaturesRequest
                | MessageType::GetConfigRequest
                | MessageType::SetConfig
                | MessageType::PacketOut
                | MessageType::FlowMod
                | MessageType::PortMod
                | MessageType::StatsRequest
                | MessageType::BarrierRequest
                | MessageType::QueueGetConfigRequest
        )
    }

    /// Requests whose reply, or an error about them, is correlated later.
    pub fn needs_context(&self) -> bool {
        self.is_dispatchable()
            && !matches!(
                self,
                MessageType::Hello | MessageType::Error | MessageType::EchoReply
            )
    }
}

impl TryFrom<u8> for MessageType {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self, AppError> {
        let msg_type = match value {
            0 => MessageType::Hello,
            1 => MessageType::Error,
            2 => MessageType::EchoRequest,
            3 => MessageType::EchoReply,
            4 => MessageType::Vendor,
            5 => MessageType::FeaturesRequest,
            6 => MessageType::FeaturesReply,
            7 => MessageType::GetConfigRequest,
            8 => MessageType::GetConfigReply,
            9 => MessageType::SetConfig,
            10 => MessageType::PacketIn,
            11 => MessageType::FlowRemoved,
            12 => MessageType::PortStatus,
            13 => MessageType::PacketOut,
            14 => MessageType::FlowMod,
            15 => MessageType::PortMod,
            16 => MessageType::StatsRequest,
            17 => MessageType::StatsReply,
            18 => MessageType::BarrierRequest,
            19 => MessageType::BarrierReply,
            20 => MessageType::QueueGetConfigRequest,
            21 => MessageType::QueueGetConfigReply,
            _ => {
                return Err(AppError::MalformedProtocol(format!(
                    "unknown message type {}",
                    value
                )))
            }
        };
        Ok(msg_type)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for code in 0u8..=21 {
            let msg_type = MessageType::try_from(code).unwrap();
            assert_eq!(msg_type as u8, code);
        }
        assert!(MessageType::try_from(22).is_err());
    }

    #[test]
    fn test_dispatchable_kinds() {
        assert!(MessageType::FlowMod.is_dispatchable());
        assert!(!MessageType::PacketIn.is_dispatchable());
        assert!(!MessageType::FeaturesReply.is_dispatchable());
        assert!(MessageType::BarrierRequest.needs_context());
        assert!(!MessageType::Hello.needs_context());
        assert!(!MessageType::EchoReply.needs_context());
    }
}
