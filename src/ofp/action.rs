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

//! Action list codec.
//!
//! An action list is a run of variable length records, each starting with
//! `type: u16 | len: u16`. `len` covers the whole record, is at least 8 and a
//! multiple of 8. Records are decoded into [`ActionEntry`] values that keep
//! both the typed fields and a copy of the raw record.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{AppError, AppResult};

pub const ACTION_HEADER_LEN: usize = 4;
pub const ACTION_ALIGN: usize = 8;

pub const OFPAT_OUTPUT: u16 = 0;
pub const OFPAT_SET_VLAN_VID: u16 = 1;
pub const OFPAT_SET_VLAN_PCP: u16 = 2;
pub const OFPAT_STRIP_VLAN: u16 = 3;
pub const OFPAT_SET_DL_SRC: u16 = 4;
pub const OFPAT_SET_DL_DST: u16 = 5;
pub const OFPAT_SET_NW_SRC: u16 = 6;
pub const OFPAT_SET_NW_DST: u16 = 7;
pub const OFPAT_SET_NW_TOS: u16 = 8;
pub const OFPAT_SET_TP_SRC: u16 = 9;
pub const OFPAT_SET_TP_DST: u16 = 10;
pub const OFPAT_ENQUEUE: u16 = 11;
pub const OFPAT_VENDOR: u16 = 0xffff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Output { port: u16, max_len: u16 },
    SetVlanVid(u16),
    SetVlanPcp(u8),
    StripVlan,
    SetDlSrc([u8; 6]),
    SetDlDst([u8; 6]),
    SetNwSrc(u32),
    SetNwDst(u32),
    SetNwTos(u8),
    SetTpSrc(u16),
    SetTpDst(u16),
    Enqueue { port: u16, queue_id: u32 },
    Vendor { vendor: u32 },
    /// type this switch does not know; the raw record is still kept
    Unknown { action_type: u16 },
}

impl Action {
    pub fn action_type(&self) -> u16 {
        match self {
            Action::Output { .. } => OFPAT_OUTPUT,
            Action::SetVlanVid(_) => OFPAT_SET_VLAN_VID,
            Action::SetVlanPcp(_) => OFPAT_SET_VLAN_PCP,
            Action::StripVlan => OFPAT_STRIP_VLAN,
            Action::SetDlSrc(_) => OFPAT_SET_DL_SRC,
            Action::SetDlDst(_) => OFPAT_SET_DL_DST,
            Action::SetNwSrc(_) => OFPAT_SET_NW_SRC,
            Action::SetNwDst(_) => OFPAT_SET_NW_DST,
            Action::SetNwTos(_) => OFPAT_SET_NW_TOS,
            Action::SetTpSrc(_) => OFPAT_SET_TP_SRC,
            Action::SetTpDst(_) => OFPAT_SET_TP_DST,
            Action::Enqueue { .. } => OFPAT_ENQUEUE,
            Action::Vendor { .. } => OFPAT_VENDOR,
            Action::Unknown { action_type } => *action_type,
        }
    }

    /// Smallest record length the type can be encoded in.
    fn min_len(action_type: u16) -> usize {
        match action_type {
            OFPAT_SET_DL_SRC | OFPAT_SET_DL_DST | OFPAT_ENQUEUE => 16,
            _ => 8,
        }
    }

    /// Write the action as a complete record. Vendor and unknown actions
    /// carry no body here and are padded to the minimum length.
    pub fn encode(&self, writer: &mut BytesMut) {
        let len = Action::min_len(self.action_type());
        writer.put_u16(self.action_type());
        writer.put_u16(len as u16);
        match self {
            Action::Output { port, max_len } => {
                writer.put_u16(*port);
                writer.put_u16(*max_len);
            }
            Action::SetVlanVid(vid) | Action::SetTpSrc(vid) | Action::SetTpDst(vid) => {
                writer.put_u16(*vid);
                writer.put_bytes(0, 2);
            }
            Action::SetVlanPcp(value) | Action::SetNwTos(value) => {
                writer.put_u8(*value);
                writer.put_bytes(0, 3);
            }
            Action::StripVlan | Action::Unknown { .. } => writer.put_bytes(0, 4),
            Action::SetDlSrc(addr) | Action::SetDlDst(addr) => {
                writer.put_slice(addr);
                writer.put_bytes(0, 6);
            }
            Action::SetNwSrc(addr) | Action::SetNwDst(addr) => writer.put_u32(*addr),
            Action::Enqueue { port, queue_id } => {
                writer.put_u16(*port);
                writer.put_bytes(0, 6);
                writer.put_u32(*queue_id);
            }
            Action::Vendor { vendor } => writer.put_u32(*vendor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEntry {
    pub action_type: u16,
    pub len: u16,
    pub action: Action,
    /// the complete record, header included
    pub raw: Bytes,
}

fn decode_action(action_type: u16, mut body: &[u8]) -> Action {
    match action_type {
        OFPAT_OUTPUT => Action::Output {
            port: body.get_u16(),
            max_len: body.get_u16(),
        },
        OFPAT_SET_VLAN_VID => Action::SetVlanVid(body.get_u16()),
        OFPAT_SET_VLAN_PCP => Action::SetVlanPcp(body.get_u8()),
        OFPAT_STRIP_VLAN => Action::StripVlan,
        OFPAT_SET_DL_SRC | OFPAT_SET_DL_DST => {
            let mut addr = [0u8; 6];
            body.copy_to_slice(&mut addr);
            if action_type == OFPAT_SET_DL_SRC {
                Action::SetDlSrc(addr)
            } else {
                Action::SetDlDst(addr)
            }
        }
        OFPAT_SET_NW_SRC => Action::SetNwSrc(body.get_u32()),
        OFPAT_SET_NW_DST => Action::SetNwDst(body.get_u32()),
        OFPAT_SET_NW_TOS => Action::SetNwTos(body.get_u8()),
        OFPAT_SET_TP_SRC => Action::SetTpSrc(body.get_u16()),
        OFPAT_SET_TP_DST => Action::SetTpDst(body.get_u16()),
        OFPAT_ENQUEUE => {
            let port = body.get_u16();
            body.advance(6);
            Action::Enqueue {
                port,
                queue_id: body.get_u32(),
            }
        }
        OFPAT_VENDOR => Action::Vendor {
            vendor: body.get_u32(),
        },
        other => Action::Unknown { action_type: other },
    }
}

/// Walk an action list of exactly `buffer.len()` bytes.
///
/// Every record length is checked against the remaining budget before the
/// record is copied; a record that claims more than is left, less than the
/// minimum, or a non aligned size makes the whole list malformed.
pub fn decode_actions(buffer: &[u8]) -> AppResult<Vec<ActionEntry>> {
    let mut actions = Vec::new();
    let mut offset = 0;
    while offset < buffer.len() {
        let remaining = buffer.len() - offset;
        if remaining < ACTION_HEADER_LEN {
            return Err(AppError::MalformedProtocol(format!(
                "{} trailing bytes cannot hold an action header",
                remaining
            )));
        }
        let mut header = &buffer[offset..offset + ACTION_HEADER_LEN];
        let action_type = header.get_u16();
        let len = header.get_u16();
        let record_len = len as usize;

        if record_len < ACTION_ALIGN || record_len % ACTION_ALIGN != 0 {
            return Err(AppError::MalformedProtocol(format!(
                "action type {} has invalid length {}",
                action_type, len
            )));
        }
        if record_len > remaining {
            return Err(AppError::MalformedProtocol(format!(
                "action type {} claims {} bytes but only {} remain",
                action_type, len, remaining
            )));
        }
        if record_len < Action::min_len(action_type) {
            return Err(AppError::MalformedProtocol(format!(
                "action type {} too short: {} bytes",
                action_type, len
            )));
        }

        let record = &buffer[offset..offset + record_len];
        actions.push(ActionEntry {
            action_type,
            len,
            action: decode_action(action_type, &record[ACTION_HEADER_LEN..]),
            raw: Bytes::copy_from_slice(record),
        });
        offset += record_len;
    }
    Ok(actions)
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    fn encode_all(actions: &[Action]) -> BytesMut {
        let mut writer = BytesMut::new();
        for action in actions {
            action.encode(&mut writer);
        }
        writer
    }

    #[test]
    fn test_decode_mixed_list() {
        let actions = vec![
            Action::Output {
                port: 3,
                max_len: 128,
            },
            Action::SetDlDst([0, 1, 2, 3, 4, 5]),
            Action::Enqueue {
                port: 2,
                queue_id: 7,
            },
            Action::SetNwSrc(0x0a000001),
        ];
        let buffer = encode_all(&actions);
        assert_eq!(buffer.len(), 8 + 16 + 16 + 8);

        let decoded = decode_actions(&buffer).unwrap();
        assert_eq!(decoded.len(), 4);
        for (entry, expected) in decoded.iter().zip(actions.iter()) {
            assert_eq!(&entry.action, expected);
            assert_eq!(entry.action_type, expected.action_type());
            assert_eq!(entry.raw.len(), entry.len as usize);
        }
        assert_eq!(&decoded[1].raw[..], &buffer[8..24]);
    }

    #[test]
    fn test_unknown_type_keeps_raw_record() {
        let mut buffer = BytesMut::new();
        buffer.put_u16(0x0042);
        buffer.put_u16(16);
        buffer.put_slice(&[9u8; 12]);
        let decoded = decode_actions(&buffer).unwrap();
        assert_eq!(
            decoded[0].action,
            Action::Unknown {
                action_type: 0x0042
            }
        );
        assert_eq!(decoded[0].raw.len(), 16);
    }

    #[test]
    fn test_empty_list() {
        assert!(decode_actions(&[]).unwrap().is_empty());
    }

    #[rstest]
    #[case::longer_than_budget(OFPAT_OUTPUT, 16, 8)]
    #[case::zero_length(OFPAT_OUTPUT, 0, 8)]
    #[case::not_aligned(OFPAT_OUTPUT, 12, 16)]
    #[case::too_short_for_type(OFPAT_SET_DL_SRC, 8, 8)]
    fn test_bad_record_length(#[case] action_type: u16, #[case] len: u16, #[case] budget: usize) {
        let mut buffer = BytesMut::new();
        buffer.put_u16(action_type);
        buffer.put_u16(len);
        buffer.resize(budget, 0);
        assert!(matches!(
            decode_actions(&buffer),
            Err(AppError::MalformedProtocol(_))
        ));
    }

    #[test]
    fn test_trailing_fragment() {
        let mut buffer = encode_all(&[Action::StripVlan]);
        buffer.put_slice(&[0, 0]);
        assert!(decode_actions(&buffer).is_err());
    }
}
