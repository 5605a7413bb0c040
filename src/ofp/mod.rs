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

//! OpenFlow 1.0 wire protocol.
//!
//! Every message starts with an 8 byte [`OfpHeader`] whose big endian length
//! field is authoritative for both framing and validation. This module covers
//! the parts of the protocol the switch side of a secure channel needs:
//!
//! - message type codes and the header codec
//! - typed decoding of the messages a controller sends to a switch
//! - action list decoding with per record bound checks
//! - the closed error taxonomy and error reply construction
//! - builders for the few messages the channel layer itself emits

pub use action::{decode_actions, Action, ActionEntry};
pub use builder::{
    barrier_reply, echo_reply, echo_request, encode_message, error, hello, XidGenerator,
};
pub use error_code::{
    BadActionCode, BadRequestCode, ErrorType, FlowModFailedCode, HelloFailedCode, OfpErrorCode,
    PortModFailedCode, QueueOpFailedCode, ERROR_DATA_ECHO_LEN,
};
pub use header::{peek_length, peek_xid, OfpHeader};
pub use message_type::MessageType;
pub use messages::{
    validate, BareRequest, Echo, ErrorMsg, FlowMod, Hello, Match, OfpMessage, PacketOut, PortMod,
    QueueGetConfigRequest, SetConfig, StatsRequest, Vendor,
};

pub mod action;
mod builder;
mod error_code;
mod header;
mod message_type;
pub mod messages;

pub const OFP_VERSION: u8 = 0x01;
pub const HEADER_LEN: usize = 8;
/// The length field is 16 bits wide.
pub const MAX_MESSAGE_LEN: usize = u16::MAX as usize;
