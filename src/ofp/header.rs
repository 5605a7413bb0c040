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

use bytes::{Buf, BufMut, BytesMut};

use super::{MessageType, HEADER_LEN, OFP_VERSION};
use crate::{AppError, AppResult};

/// The fixed 8 byte header that starts every message:
///
/// ```text
/// version: u8 | type: u8 | length: u16 (BE) | xid: u32 (BE)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfpHeader {
    pub version: u8,
    pub msg_type: u8,
    /// total message length including this header
    pub length: u16,
    pub xid: u32,
}

impl OfpHeader {
    pub fn new(msg_type: MessageType, length: u16, xid: u32) -> Self {
        OfpHeader {
            version: OFP_VERSION,
            msg_type: msg_type as u8,
            length,
            xid,
        }
    }

    pub fn read_from(buffer: &[u8]) -> AppResult<OfpHeader> {
        if buffer.len() < HEADER_LEN {
            return Err(AppError::MalformedProtocol(format!(
                "{} bytes cannot hold a message header",
                buffer.len()
            )));
        }
        let mut cursor = &buffer[..HEADER_LEN];
        Ok(OfpHeader {
            version: cursor.get_u8(),
            msg_type: cursor.get_u8(),
            length: cursor.get_u16(),
            xid: cursor.get_u32(),
        })
    }

    pub fn write_to(&self, writer: &mut BytesMut) {
        writer.put_u8(self.version);
        writer.put_u8(self.msg_type);
        writer.put_u16(self.length);
        writer.put_u32(self.xid);
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::try_from(self.msg_type).ok()
    }
}

/// Transaction id of a raw message, if it is long enough to carry one.
pub fn peek_xid(message: &[u8]) -> Option<u32> {
    OfpHeader::read_from(message).ok().map(|header| header.xid)
}

/// Declared total length of a raw message.
pub fn peek_length(message: &[u8]) -> Option<u16> {
    OfpHeader::read_from(message).ok().map(|header| header.length)
}
