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

use bytes::{BufMut, BytesMut};

use super::error_code::{OfpErrorCode, ERROR_DATA_ECHO_LEN};
use super::{MessageType, OfpHeader, HEADER_LEN, MAX_MESSAGE_LEN};
use crate::{AppError, AppResult};

/// Header plus `body` as one wire message.
pub fn encode_message(msg_type: MessageType, xid: u32, body: &[u8]) -> AppResult<BytesMut> {
    let length = HEADER_LEN + body.len();
    if length > MAX_MESSAGE_LEN {
        return Err(AppError::InvalidValue(format!(
            "{} body of {} bytes does not fit in a message",
            msg_type,
            body.len()
        )));
    }
    let mut writer = BytesMut::with_capacity(length);
    OfpHeader::new(msg_type, length as u16, xid).write_to(&mut writer);
    writer.put_slice(body);
    Ok(writer)
}

fn header_only(msg_type: MessageType, xid: u32) -> BytesMut {
    let mut writer = BytesMut::with_capacity(HEADER_LEN);
    OfpHeader::new(msg_type, HEADER_LEN as u16, xid).write_to(&mut writer);
    writer
}

pub fn hello(xid: u32) -> BytesMut {
    header_only(MessageType::Hello, xid)
}

pub fn barrier_reply(xid: u32) -> BytesMut {
    header_only(MessageType::BarrierReply, xid)
}

pub fn echo_request(xid: u32, body: &[u8]) -> AppResult<BytesMut> {
    encode_message(MessageType::EchoRequest, xid, body)
}

/// Echo reply carrying the request body back unchanged.
pub fn echo_reply(xid: u32, body: &[u8]) -> AppResult<BytesMut> {
    encode_message(MessageType::EchoReply, xid, body)
}

/// An error message. `data` is cut to the echo limit for request-echoing
/// codes; hello failures carry their fixed description instead.
pub fn error(xid: u32, error: OfpErrorCode, data: &[u8]) -> BytesMut {
    let payload: &[u8] = match error.description() {
        Some(description) => description.as_bytes(),
        None => &data[..data.len().min(ERROR_DATA_ECHO_LEN)],
    };
    let length = HEADER_LEN + 4 + payload.len();
    let mut writer = BytesMut::with_capacity(length);
    OfpHeader::new(MessageType::Error, length as u16, xid).write_to(&mut writer);
    writer.put_u16(error.error_type() as u16);
    writer.put_u16(error.code());
    writer.put_slice(payload);
    writer
}

/// Transaction ids for messages the switch originates.
#[derive(Debug)]
pub struct XidGenerator {
    next: u32,
}

impl XidGenerator {
    /// Start from a random id so restarts do not replay old ids.
    pub fn new() -> Self {
        XidGenerator {
            next: rand::random(),
        }
    }

    pub fn starting_at(first: u32) -> Self {
        XidGenerator { next: first }
    }

    pub fn next_xid(&mut self) -> u32 {
        let xid = self.next;
        self.next = self.next.wrapping_add(1);
        xid
    }
}

impl Default for XidGenerator {
    fn default() -> Self {
        XidGenerator::new()
    }
}
