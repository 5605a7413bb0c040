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

mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use rstest::rstest;

use common::*;
use ofswitch::ofp::action::Action;
use ofswitch::ofp::{
    self, encode_message, BadRequestCode, HelloFailedCode, MessageType, OfpErrorCode,
};
use ofswitch::{AppError, AppResult, ChannelState, LocalRelay, Route, SwitchInterface};

fn connected_switch(harness: &Harness) -> (SwitchInterface, SharedWire) {
    let wire = wire();
    harness.expect(ConnectStep::Establish(wire.clone()));
    let switch = harness.switch();
    switch.initiate(controller()).unwrap();
    assert_eq!(switch.state(), ChannelState::Connected);
    (switch, wire)
}

fn deliver(harness: &Harness, wire: &SharedWire, bytes: &[u8]) {
    wire.borrow_mut().inbound.push_back(Ok(bytes.to_vec()));
    harness.pump();
}

fn take_written(wire: &SharedWire) -> Vec<u8> {
    std::mem::take(&mut wire.borrow_mut().written)
}

#[derive(Default)]
struct RecordingRelay {
    relayed: RefCell<Vec<(String, Vec<u8>)>>,
}

impl LocalRelay for RecordingRelay {
    fn relay(&self, service: &str, message: &[u8]) -> AppResult<()> {
        self.relayed
            .borrow_mut()
            .push((service.to_string(), message.to_vec()));
        Ok(())
    }
}

#[test]
fn test_split_flow_mod_dispatched_once() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    let calls = Rc::new(RefCell::new(Vec::new()));
    let seen = calls.clone();
    switch.on_flow_mod(move |_, flow_mod| {
        seen.borrow_mut()
            .push((flow_mod.header.xid, flow_mod.actions.len(), flow_mod.cookie));
    });

    let message = flow_mod(
        0x42,
        &[
            Action::Output {
                port: 3,
                max_len: 0,
            },
            Action::SetDlSrc([1, 2, 3, 4, 5, 6]),
            Action::SetNwTos(0x10),
        ],
    );
    // header plus part of the body, then the rest
    let (first, rest) = message.split_at(20);
    wire.borrow_mut().inbound.push_back(Ok(first.to_vec()));
    harness.pump();
    assert!(calls.borrow().is_empty());
    wire.borrow_mut().inbound.push_back(Ok(rest.to_vec()));
    harness.pump();

    assert_eq!(*calls.borrow(), vec![(0x42, 3, 0xfeed)]);
}

#[test]
fn test_actions_handed_over_decoded() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    let actions = Rc::new(RefCell::new(Vec::new()));
    let sink = actions.clone();
    switch.on_flow_mod(move |_, flow_mod| {
        sink.borrow_mut()
            .extend(flow_mod.actions.iter().map(|entry| (entry.len, entry.action.clone())));
    });

    deliver(
        &harness,
        &wire,
        &flow_mod(
            1,
            &[
                Action::SetDlDst([9; 6]),
                Action::Enqueue {
                    port: 2,
                    queue_id: 7,
                },
            ],
        ),
    );
    assert_eq!(
        *actions.borrow(),
        vec![
            (16, Action::SetDlDst([9; 6])),
            (
                16,
                Action::Enqueue {
                    port: 2,
                    queue_id: 7
                }
            ),
        ]
    );
}

#[test]
fn test_bad_action_length_dropped() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    let called = Rc::new(Cell::new(false));
    let flag = called.clone();
    switch.on_flow_mod(move |_, _| flag.set(true));

    let mut message = flow_mod(5, &[Action::SetNwTos(1)]).to_vec();
    // the record claims 16 bytes but only 8 remain
    message[ofp::messages::FLOW_MOD_LEN + 3] = 16;
    deliver(&harness, &wire, &message);

    assert!(!called.get());
    assert!(switch.context(5).is_none());
    assert_eq!(switch.state(), ChannelState::Connected);
}

#[test]
fn test_invalid_message_does_not_disturb_channel() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    let echoes = Rc::new(Cell::new(0));
    let counter = echoes.clone();
    switch.on_echo_request(move |_, _| counter.set(counter.get() + 1));

    let mut unknown = encode_message(MessageType::BarrierRequest, 1, &[]).unwrap();
    unknown[1] = 99;
    let mut stream = unknown.to_vec();
    // a reply type a controller never sends to a switch
    stream.extend_from_slice(&encode_message(MessageType::FeaturesReply, 2, &[0; 24]).unwrap());
    stream.extend_from_slice(&echo_request(3, b"ping"));
    deliver(&harness, &wire, &stream);

    assert_eq!(echoes.get(), 1);
    assert_eq!(switch.state(), ChannelState::Connected);
    assert!(switch.context(1).is_none());
    assert!(switch.context(2).is_none());
}

#[test]
fn test_unset_slot_is_acknowledged() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    deliver(
        &harness,
        &wire,
        &encode_message(MessageType::BarrierRequest, 8, &[]).unwrap(),
    );
    assert!(take_written(&wire).is_empty());
    // the request is still remembered for a later reply or error
    assert!(switch.context(8).is_some());
}

#[test]
fn test_send_error_echoes_request() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    let request = flow_mod(
        0x77,
        &[
            Action::Output {
                port: 1,
                max_len: 0,
            },
            Action::StripVlan,
            Action::SetTpDst(22),
        ],
    );
    deliver(&harness, &wire, &request);
    assert!(request.len() > ofp::ERROR_DATA_ECHO_LEN);

    switch
        .send_error(0x77, 1, BadRequestCode::BadVersion as u16)
        .unwrap();
    harness.pump();

    let written = take_written(&wire);
    let expected = ofp::error(
        0x77,
        OfpErrorCode::BadRequest(BadRequestCode::BadVersion),
        &request,
    );
    assert_eq!(written, expected.to_vec());
    assert_eq!(&written[12..], &request[..ofp::ERROR_DATA_ECHO_LEN]);
}

#[test]
fn test_send_error_short_request_echoed_whole() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    let request = echo_request(4, b"abc");
    switch
        .save_context(4, &request, Route::SecureChannel)
        .unwrap();

    switch.send_error(4, 1, 0).unwrap();
    harness.pump();
    assert_eq!(&take_written(&wire)[12..], &request[..]);
}

#[test]
fn test_send_error_without_context_has_empty_body() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    switch.send_error(11, 1, 0).unwrap();
    harness.pump();

    let written = take_written(&wire);
    assert_eq!(written.len(), 12);
    assert_eq!(&written[2..4], &[0u8, 12]);
}

#[rstest]
#[case(0xffff, 0)]
#[case(0, 2)]
#[case(1, 9)]
#[case(6, 0)]
fn test_send_error_rejects_unknown_pair(#[case] err_type: u16, #[case] code: u16) {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    let result = switch.send_error(1, err_type, code);
    assert!(matches!(result, Err(AppError::UnknownErrorCode { .. })));
    harness.pump();
    assert!(take_written(&wire).is_empty());
    assert_eq!(switch.channel().pending_send(), 0);
}

#[test]
fn test_hello_failed_carries_description() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    switch
        .send_error_code(3, OfpErrorCode::HelloFailed(HelloFailedCode::Eperm))
        .unwrap();
    harness.pump();
    assert_eq!(&take_written(&wire)[12..], b"Permissions error");
}

#[test]
fn test_duplicate_xid_keeps_first_context() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    let requests = Rc::new(Cell::new(0));
    let counter = requests.clone();
    switch.on_stats_request(move |_, _| counter.set(counter.get() + 1));

    let first = encode_message(MessageType::StatsRequest, 9, &[0, 1, 0, 0]).unwrap();
    let second = encode_message(MessageType::StatsRequest, 9, &[0, 2, 0, 0]).unwrap();
    deliver(&harness, &wire, &first);
    deliver(&harness, &wire, &second);

    assert_eq!(requests.get(), 2);
    assert_eq!(&switch.context(9).unwrap().message[..], &first[..]);
    assert!(matches!(
        switch.save_context(9, &second, Route::SecureChannel),
        Err(AppError::DuplicateTransaction(9))
    ));
    assert_eq!(switch.context_count(), 1);
}

#[test]
fn test_contexts_age_out() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    deliver(
        &harness,
        &wire,
        &encode_message(MessageType::FeaturesRequest, 21, &[]).unwrap(),
    );
    assert!(switch.context(21).is_some());

    harness.advance(Duration::from_secs(5));
    assert!(switch.context(21).is_some());

    harness.advance(Duration::from_secs(5));
    assert!(switch.context(21).is_none());

    // an error for the expired request goes out without the request body
    switch.send_error(21, 1, 1).unwrap();
    harness.pump();
    assert_eq!(take_written(&wire).len(), 12);
}

#[test]
fn test_delete_absent_context_is_noop() {
    let harness = Harness::new();
    let switch = harness.switch();
    assert!(switch.delete_context(123).is_none());
    switch
        .save_context(123, b"12345678", Route::SecureChannel)
        .unwrap();
    assert!(switch.delete_context(123).is_some());
    assert!(switch.delete_context(123).is_none());
}

#[test]
fn test_reply_routed_to_local_service() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    let relay = Rc::new(RecordingRelay::default());
    switch.set_local_relay(relay.clone());
    switch.on_echo_request(|switch, echo| {
        let reply = ofp::echo_reply(echo.header.xid, &echo.body).unwrap();
        switch.send(&reply).unwrap();
    });

    switch
        .handle_local_message("dpctl", &echo_request(0x99, b"hi"))
        .unwrap();
    harness.pump();

    let relayed = relay.relayed.borrow();
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].0, "dpctl");
    assert_eq!(
        relayed[0].1,
        ofp::echo_reply(0x99, b"hi").unwrap().to_vec()
    );
    assert!(take_written(&wire).is_empty());
    assert_eq!(
        switch.context(0x99).unwrap().route,
        Route::Local("dpctl".to_string())
    );
}

#[test]
fn test_controller_reply_uses_channel() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    switch.on_echo_request(|switch, echo| {
        let reply = ofp::echo_reply(echo.header.xid, &echo.body).unwrap();
        switch.send(&reply).unwrap();
        switch.delete_context(echo.header.xid);
    });
    deliver(&harness, &wire, &echo_request(5, b"keepalive"));
    harness.pump();

    assert_eq!(
        take_written(&wire),
        ofp::echo_reply(5, b"keepalive").unwrap().to_vec()
    );
    assert_eq!(switch.context_count(), 0);
}

#[test]
fn test_local_route_without_relay_fails() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    switch
        .handle_local_message(
            "dpctl",
            &encode_message(MessageType::BarrierRequest, 6, &[]).unwrap(),
        )
        .unwrap();

    let result = switch.send(&ofp::barrier_reply(6));
    assert!(matches!(result, Err(AppError::NoLocalRelay(service)) if service == "dpctl"));
    harness.pump();
    assert!(take_written(&wire).is_empty());
}

#[test]
fn test_local_message_validated() {
    let harness = Harness::new();
    let switch = harness.switch();
    let mut message = echo_request(1, b"x").to_vec();
    message.push(0);
    assert!(switch.handle_local_message("dpctl", &message).is_err());
    assert_eq!(switch.context_count(), 0);
}

#[test]
fn test_connection_handlers() {
    let harness = Harness::new();
    let wire = wire();
    harness.expect(ConnectStep::Establish(wire.clone()));
    let switch = harness.switch();
    let events = Rc::new(RefCell::new(Vec::new()));
    let connected = events.clone();
    let disconnected = events.clone();
    switch.on_connected(move |switch| {
        connected.borrow_mut().push("up");
        switch.send(&ofp::hello(1)).unwrap();
    });
    switch.on_disconnected(move |_| disconnected.borrow_mut().push("down"));

    switch.initiate(controller()).unwrap();
    harness.pump();
    assert_eq!(take_written(&wire), ofp::hello(1).to_vec());

    wire.borrow_mut().closed = true;
    harness.pump();
    assert_eq!(*events.borrow(), vec!["up", "down"]);
    assert_eq!(switch.state(), ChannelState::Disconnected);
}

#[test]
fn test_finalize_drops_contexts_and_timers() {
    let harness = Harness::new();
    let (switch, wire) = connected_switch(&harness);
    deliver(
        &harness,
        &wire,
        &encode_message(MessageType::GetConfigRequest, 2, &[]).unwrap(),
    );
    assert_eq!(switch.context_count(), 1);
    assert_eq!(harness.timers.pending(), 1);

    switch.finalize();
    assert_eq!(switch.context_count(), 0);
    assert_eq!(switch.state(), ChannelState::Init);
    assert_eq!(harness.timers.pending(), 0);
}
