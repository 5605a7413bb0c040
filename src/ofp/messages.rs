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

//! Typed views of the messages a switch receives.
//!
//! Decoding converts every fixed field from network byte order and copies
//! trailing variable sections (action lists, opaque bodies) into owned
//! values, so a decoded message does not borrow the frame it came from.

use bytes::{Buf, Bytes};

use super::action::{decode_actions, ActionEntry};
use super::{MessageType, OfpHeader, HEADER_LEN};
use crate::{AppError, AppResult};

pub const ERROR_MSG_LEN: usize = 12;
pub const VENDOR_MSG_LEN: usize = 12;
pub const SWITCH_CONFIG_LEN: usize = 12;
pub const PACKET_OUT_LEN: usize = 16;
pub const MATCH_LEN: usize = 40;
pub const FLOW_MOD_LEN: usize = 72;
pub const PORT_MOD_LEN: usize = 32;
pub const STATS_REQUEST_LEN: usize = 12;
pub const QUEUE_GET_CONFIG_REQUEST_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub header: OfpHeader,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub header: OfpHeader,
    pub err_type: u16,
    pub code: u16,
    pub data: Bytes,
}

/// Echo request or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Echo {
    pub header: OfpHeader,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vendor {
    pub header: OfpHeader,
    pub vendor: u32,
    pub body: Bytes,
}

/// A request made of the header alone: features, get-config and barrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BareRequest {
    pub header: OfpHeader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetConfig {
    pub header: OfpHeader,
    pub flags: u16,
    pub miss_send_len: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    pub header: OfpHeader,
    pub buffer_id: u32,
    pub in_port: u16,
    pub actions: Vec<ActionEntry>,
    /// packet payload, empty when `buffer_id` refers to a buffered packet
    pub data: Bytes,
}

/// Flow match fields, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Match {
    pub wildcards: u32,
    pub in_port: u16,
    pub dl_src: [u8; 6],
    pub dl_dst: [u8; 6],
    pub dl_vlan: u16,
    pub dl_vlan_pcp: u8,
    pub dl_type: u16,
    pub nw_tos: u8,
    pub nw_proto: u8,
    pub nw_src: u32,
    pub nw_dst: u32,
    pub tp_src: u16,
    pub tp_dst: u16,
}

impl Match {
    fn read_from(cursor: &mut &[u8]) -> Match {
        let wildcards = cursor.get_u32();
        let in_port = cursor.get_u16();
        let mut dl_src = [0u8; 6];
        cursor.copy_to_slice(&mut dl_src);
        let mut dl_dst = [0u8; 6];
        cursor.copy_to_slice(&mut dl_dst);
        let dl_vlan = cursor.get_u16();
        let dl_vlan_pcp = cursor.get_u8();
        cursor.advance(1);
        let dl_type = cursor.get_u16();
        let nw_tos = cursor.get_u8();
        let nw_proto = cursor.get_u8();
        cursor.advance(2);
        Match {
            wildcards,
            in_port,
            dl_src,
            dl_dst,
            dl_vlan,
            dl_vlan_pcp,
            dl_type,
            nw_tos,
            nw_proto,
            nw_src: cursor.get_u32(),
            nw_dst: cursor.get_u32(),
            tp_src: cursor.get_u16(),
            tp_dst: cursor.get_u16(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    pub header: OfpHeader,
    pub match_fields: Match,
    pub cookie: u64,
    pub command: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub buffer_id: u32,
    pub out_port: u16,
    pub flags: u16,
    pub actions: Vec<ActionEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMod {
    pub header: OfpHeader,
    pub port_no: u16,
    pub hw_addr: [u8; 6],
    pub config: u32,
    pub mask: u32,
    pub advertise: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsRequest {
    pub header: OfpHeader,
    pub stats_type: u16,
    pub flags: u16,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueGetConfigRequest {
    pub header: OfpHeader,
    pub port: u16,
}

/// Every message kind the switch dispatches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfpMessage {
    Hello(Hello),
    Error(ErrorMsg),
    EchoRequest(Echo),
    EchoReply(Echo),
    Vendor(Vendor),
    FeaturesRequest(BareRequest),
    GetConfigRequest(BareRequest),
    SetConfig(SetConfig),
    PacketOut(PacketOut),
    FlowMod(FlowMod),
    PortMod(PortMod),
    StatsRequest(StatsRequest),
    BarrierRequest(BareRequest),
    QueueGetConfigRequest(QueueGetConfigRequest),
}

/// Structural checks every inbound message must pass before dispatch:
/// a whole header, a declared length equal to the buffer length and a
/// known message type.
pub fn validate(message: &[u8]) -> AppResult<(OfpHeader, MessageType)> {
    let header = OfpHeader::read_from(message)?;
    if header.length as usize != message.len() {
        return Err(AppError::MalformedProtocol(format!(
            "declared length {} does not match buffer length {}",
            header.length,
            message.len()
        )));
    }
    let msg_type = MessageType::try_from(header.msg_type)?;
    Ok((header, msg_type))
}

fn ensure_len(message: &[u8], min: usize, msg_type: MessageType) -> AppResult<()> {
    if message.len() < min {
        return Err(AppError::MalformedProtocol(format!(
            "{} of {} bytes is shorter than {}",
            msg_type,
            message.len(),
            min
        )));
    }
    Ok(())
}

impl OfpMessage {
    /// Decode a message that already passed [`validate`].
    pub fn decode(header: OfpHeader, msg_type: MessageType, message: &[u8]) -> AppResult<Self> {
        let mut body = &message[HEADER_LEN..];
        let decoded = match msg_type {
            MessageType::Hello => OfpMessage::Hello(Hello {
                header,
                body: Bytes::copy_from_slice(body),
            }),
            MessageType::Error => {
                ensure_len(message, ERROR_MSG_LEN, msg_type)?;
                OfpMessage::Error(ErrorMsg {
                    header,
                    err_type: body.get_u16(),
                    code: body.get_u16(),
                    data: Bytes::copy_from_slice(body),
                })
            }
            MessageType::EchoRequest => OfpMessage::EchoRequest(Echo {
                header,
                body: Bytes::copy_from_slice(body),
            }),
            MessageType::EchoReply => OfpMessage::EchoReply(Echo {
                header,
                body: Bytes::copy_from_slice(body),
            }),
            MessageType::Vendor => {
                ensure_len(message, VENDOR_MSG_LEN, msg_type)?;
                OfpMessage::Vendor(Vendor {
                    header,
                    vendor: body.get_u32(),
                    body: Bytes::copy_from_slice(body),
                })
            }
            MessageType::FeaturesRequest => OfpMessage::FeaturesRequest(BareRequest { header }),
            MessageType::GetConfigRequest => OfpMessage::GetConfigRequest(BareRequest { header }),
            MessageType::BarrierRequest => OfpMessage::BarrierRequest(BareRequest { header }),
            MessageType::SetConfig => {
                ensure_len(message, SWITCH_CONFIG_LEN, msg_type)?;
                OfpMessage::SetConfig(SetConfig {
                    header,
                    flags: body.get_u16(),
                    miss_send_len: body.get_u16(),
                })
            }
            MessageType::PacketOut => {
                ensure_len(message, PACKET_OUT_LEN, msg_type)?;
                let buffer_id = body.get_u32();
                let in_port = body.get_u16();
                let actions_len = body.get_u16() as usize;
                if actions_len > body.len() {
                    return Err(AppError::MalformedProtocol(format!(
                        "packet out declares {} action bytes but carries {}",
                        actions_len,
                        body.len()
                    )));
                }
                let actions = decode_actions(&body[..actions_len])?;
                OfpMessage::PacketOut(PacketOut {
                    header,
                    buffer_id,
                    in_port,
                    actions,
                    data: Bytes::copy_from_slice(&body[actions_len..]),
                })
            }
            MessageType::FlowMod => {
                ensure_len(message, FLOW_MOD_LEN, msg_type)?;
                let match_fields = Match::read_from(&mut body);
                let cookie = body.get_u64();
                let command = body.get_u16();
                let idle_timeout = body.get_u16();
                let hard_timeout = body.get_u16();
                let priority = body.get_u16();
                let buffer_id = body.get_u32();
                let out_port = body.get_u16();
                let flags = body.get_u16();
                OfpMessage::FlowMod(FlowMod {
                    header,
                    match_fields,
                    cookie,
                    command,
                    idle_timeout,
                    hard_timeout,
                    priority,
                    buffer_id,
                    out_port,
                    flags,
                    actions: decode_actions(body)?,
                })
            }
            MessageType::PortMod => {
                ensure_len(message, PORT_MOD_LEN, msg_type)?;
                let port_no = body.get_u16();
                let mut hw_addr = [0u8; 6];
                body.copy_to_slice(&mut hw_addr);
                OfpMessage::PortMod(PortMod {
                    header,
                    port_no,
                    hw_addr,
                    config: body.get_u32(),
                    mask: body.get_u32(),
                    advertise: body.get_u32(),
                })
            }
            MessageType::StatsRequest => {
                ensure_len(message, STATS_REQUEST_LEN, msg_type)?;
                OfpMessage::StatsRequest(StatsRequest {
                    header,
                    stats_type: body.get_u16(),
                    flags: body.get_u16(),
                    body: Bytes::copy_from_slice(body),
                })
            }
            MessageType::QueueGetConfigRequest => {
                ensure_len(message, QUEUE_GET_CONFIG_REQUEST_LEN, msg_type)?;
                OfpMessage::QueueGetConfigRequest(QueueGetConfigRequest {
                    header,
                    port: body.get_u16(),
                })
            }
            other => {
                return Err(AppError::MalformedProtocol(format!(
                    "{} is not a message a switch accepts",
                    other
                )))
            }
        };
        Ok(decoded)
    }

    /// [`validate`] followed by [`OfpMessage::decode`].
    pub fn parse(message: &[u8]) -> AppResult<Self> {
        let (header, msg_type) = validate(message)?;
        OfpMessage::decode(header, msg_type, message)
    }

    pub fn header(&self) -> &OfpHeader {
        match self {
            OfpMessage::Hello(m) => &m.header,
            OfpMessage::Error(m) => &m.header,
            OfpMessage::EchoRequest(m) | OfpMessage::EchoReply(m) => &m.header,
            OfpMessage::Vendor(m) => &m.header,
            OfpMessage::FeaturesRequest(m)
            | OfpMessage::GetConfigRequest(m)
            | OfpMessage::BarrierRequest(m) => &m.header,
            OfpMessage::SetConfig(m) => &m.header,
            OfpMessage::PacketOut(m) => &m.header,
            OfpMessage::FlowMod(m) => &m.header,
            OfpMessage::PortMod(m) => &m.header,
            OfpMessage::StatsRequest(m) => &m.header,
            OfpMessage::QueueGetConfigRequest(m) => &m.header,
        }
    }
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::ofp::action::Action;
    use crate::ofp::encode_message;

    fn flow_mod_body(actions: &[Action]) -> BytesMut {
        let mut body = BytesMut::new();
        body.put_u32(0x003f_fff0); // wildcards
        body.put_u16(1); // in_port
        body.put_slice(&[0xaa; 6]);
        body.put_slice(&[0xbb; 6]);
        body.put_u16(0xffff);
        body.put_u8(0);
        body.put_u8(0);
        body.put_u16(0x0800);
        body.put_u8(0);
        body.put_u8(6);
        body.put_u16(0);
        body.put_u32(0x0a000001);
        body.put_u32(0x0a000002);
        body.put_u16(80);
        body.put_u16(8080);
        body.put_u64(0x1122334455667788);
        body.put_u16(0); // OFPFC_ADD
        body.put_u16(10);
        body.put_u16(30);
        body.put_u16(0x8000);
        body.put_u32(0xffff_ffff);
        body.put_u16(0xffff);
        body.put_u16(1);
        for action in actions {
            action.encode(&mut body);
        }
        body
    }

    #[test]
    fn test_validate() {
        let message = encode_message(MessageType::BarrierRequest, 9, &[]).unwrap();
        let (header, msg_type) = validate(&message).unwrap();
        assert_eq!(header.xid, 9);
        assert_eq!(msg_type, MessageType::BarrierRequest);

        // declared length disagrees with the buffer
        let mut longer = message.clone();
        longer.put_u8(0);
        assert!(validate(&longer).is_err());

        // unknown type
        let mut unknown = message.clone();
        unknown[1] = 99;
        assert!(validate(&unknown).is_err());

        assert!(validate(&message[..4]).is_err());
    }

    #[test]
    fn test_decode_flow_mod() {
        let actions = [
            Action::SetVlanVid(10),
            Action::SetTpDst(443),
            Action::Output {
                port: 2,
                max_len: 0,
            },
        ];
        let body = flow_mod_body(&actions);
        let message = encode_message(MessageType::FlowMod, 77, &body).unwrap();
        assert_eq!(message.len(), FLOW_MOD_LEN + 24);

        let OfpMessage::FlowMod(flow_mod) = OfpMessage::parse(&message).unwrap() else {
            panic!("expected a flow mod");
        };
        assert_eq!(flow_mod.header.xid, 77);
        assert_eq!(flow_mod.match_fields.in_port, 1);
        assert_eq!(flow_mod.match_fields.dl_type, 0x0800);
        assert_eq!(flow_mod.match_fields.nw_proto, 6);
        assert_eq!(flow_mod.match_fields.tp_dst, 8080);
        assert_eq!(flow_mod.cookie, 0x1122334455667788);
        assert_eq!(flow_mod.hard_timeout, 30);
        assert_eq!(flow_mod.priority, 0x8000);
        assert_eq!(flow_mod.out_port, 0xffff);
        assert_eq!(flow_mod.actions.len(), 3);
        assert_eq!(flow_mod.actions[1].action, Action::SetTpDst(443));
    }

    #[test]
    fn test_flow_mod_with_overlong_action_is_malformed() {
        let mut body = flow_mod_body(&[]);
        body.put_u16(0);
        body.put_u16(64); // claims far more than is left
        body.put_u32(0);
        let message = encode_message(MessageType::FlowMod, 1, &body).unwrap();
        assert!(matches!(
            OfpMessage::parse(&message),
            Err(AppError::MalformedProtocol(_))
        ));
    }

    #[test]
    fn test_decode_packet_out() {
        let mut body = BytesMut::new();
        body.put_u32(0xffff_ffff);
        body.put_u16(3);
        body.put_u16(8);
        Action::Output {
            port: 1,
            max_len: 0,
        }
        .encode(&mut body);
        body.put_slice(b"frame");
        let message = encode_message(MessageType::PacketOut, 5, &body).unwrap();

        let OfpMessage::PacketOut(packet_out) = OfpMessage::parse(&message).unwrap() else {
            panic!("expected a packet out");
        };
        assert_eq!(packet_out.in_port, 3);
        assert_eq!(packet_out.actions.len(), 1);
        assert_eq!(&packet_out.data[..], b"frame");
    }

    #[test]
    fn test_packet_out_actions_len_beyond_body() {
        let mut body = BytesMut::new();
        body.put_u32(1);
        body.put_u16(3);
        body.put_u16(16);
        body.put_slice(&[0; 8]);
        let message = encode_message(MessageType::PacketOut, 5, &body).unwrap();
        assert!(OfpMessage::parse(&message).is_err());
    }

    #[test]
    fn test_decode_port_mod_and_short_port_mod() {
        let mut body = BytesMut::new();
        body.put_u16(4);
        body.put_slice(&[1, 2, 3, 4, 5, 6]);
        body.put_u32(1);
        body.put_u32(1);
        body.put_u32(0x20);
        body.put_u32(0);
        let message = encode_message(MessageType::PortMod, 3, &body).unwrap();
        let OfpMessage::PortMod(port_mod) = OfpMessage::parse(&message).unwrap() else {
            panic!("expected a port mod");
        };
        assert_eq!(port_mod.port_no, 4);
        assert_eq!(port_mod.hw_addr, [1, 2, 3, 4, 5, 6]);
        assert_eq!(port_mod.advertise, 0x20);

        let short = encode_message(MessageType::PortMod, 3, &body[..10]).unwrap();
        assert!(OfpMessage::parse(&short).is_err());
    }

    #[test]
    fn test_reply_kinds_are_not_accepted() {
        let message = encode_message(MessageType::FeaturesReply, 3, &[0; 24]).unwrap();
        assert!(OfpMessage::parse(&message).is_err());
    }
}
