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

use tracing::debug;

use super::SwitchInterface;
use crate::ofp::{
    BareRequest, Echo, ErrorMsg, FlowMod, Hello, OfpMessage, PacketOut, PortMod,
    QueueGetConfigRequest, SetConfig, StatsRequest, Vendor,
};

/// Callback for one decoded message kind. The message is dropped as soon as
/// the callback returns.
pub type Handler<T> = Box<dyn FnMut(&SwitchInterface, &T)>;
pub type ConnectionHandler = Box<dyn FnMut(&SwitchInterface)>;

/// Generates the handler table, one slot per kind, with a setter and an
/// invoker for each slot.
macro_rules! define_handler_slots {
    ($($slot:ident, $setter:ident, $invoke:ident, $msg:ty;)*) => {
        #[derive(Default)]
        pub(crate) struct EventHandlers {
            $($slot: Option<Handler<$msg>>,)*
            connected: Option<ConnectionHandler>,
            disconnected: Option<ConnectionHandler>,
        }

        impl SwitchInterface {
            $(
                pub fn $setter<F>(&self, handler: F)
                where
                    F: FnMut(&SwitchInterface, &$msg) + 'static,
                {
                    self.shared.handlers.borrow_mut().$slot = Some(Box::new(handler));
                }

                fn $invoke(&self, message: &$msg) -> bool {
                    let handler = self.shared.handlers.borrow_mut().$slot.take();
                    let Some(mut handler) = handler else {
                        debug!("no {} handler, xid {:#010x} acknowledged", stringify!($slot), message.header.xid);
                        return false;
                    };
                    handler(self, message);
                    // a handler may replace itself while it runs
                    let mut handlers = self.shared.handlers.borrow_mut();
                    if handlers.$slot.is_none() {
                        handlers.$slot = Some(handler);
                    }
                    true
                }
            )*
        }
    };
}

define_handler_slots! {
    hello, on_hello, invoke_hello, Hello;
    error, on_error, invoke_error, ErrorMsg;
    echo_request, on_echo_request, invoke_echo_request, Echo;
    echo_reply, on_echo_reply, invoke_echo_reply, Echo;
    vendor, on_vendor, invoke_vendor, Vendor;
    features_request, on_features_request, invoke_features_request, BareRequest;
    get_config_request, on_get_config_request, invoke_get_config_request, BareRequest;
    set_config, on_set_config, invoke_set_config, SetConfig;
    packet_out, on_packet_out, invoke_packet_out, PacketOut;
    flow_mod, on_flow_mod, invoke_flow_mod, FlowMod;
    port_mod, on_port_mod, invoke_port_mod, PortMod;
    stats_request, on_stats_request, invoke_stats_request, StatsRequest;
    barrier_request, on_barrier_request, invoke_barrier_request, BareRequest;
    queue_get_config_request, on_queue_get_config_request, invoke_queue_get_config_request, QueueGetConfigRequest;
}

impl SwitchInterface {
    pub fn on_connected<F>(&self, handler: F)
    where
        F: FnMut(&SwitchInterface) + 'static,
    {
        self.shared.handlers.borrow_mut().connected = Some(Box::new(handler));
    }

    pub fn on_disconnected<F>(&self, handler: F)
    where
        F: FnMut(&SwitchInterface) + 'static,
    {
        self.shared.handlers.borrow_mut().disconnected = Some(Box::new(handler));
    }

    /// Empty every slot.
    pub fn clear_handlers(&self) {
        *self.shared.handlers.borrow_mut() = EventHandlers::default();
    }

    pub(super) fn invoke_connected(&self) {
        let handler = self.shared.handlers.borrow_mut().connected.take();
        let Some(mut handler) = handler else {
            debug!("no connected handler");
            return;
        };
        handler(self);
        let mut handlers = self.shared.handlers.borrow_mut();
        if handlers.connected.is_none() {
            handlers.connected = Some(handler);
        }
    }

    pub(super) fn invoke_disconnected(&self) {
        let handler = self.shared.handlers.borrow_mut().disconnected.take();
        let Some(mut handler) = handler else {
            debug!("no disconnected handler");
            return;
        };
        handler(self);
        let mut handlers = self.shared.handlers.borrow_mut();
        if handlers.disconnected.is_none() {
            handlers.disconnected = Some(handler);
        }
    }

    /// Hand a decoded message to its slot. Returns whether a handler ran.
    pub(super) fn invoke(&self, message: &OfpMessage) -> bool {
        match message {
            OfpMessage::Hello(m) => self.invoke_hello(m),
            OfpMessage::Error(m) => self.invoke_error(m),
            OfpMessage::EchoRequest(m) => self.invoke_echo_request(m),
            OfpMessage::EchoReply(m) => self.invoke_echo_reply(m),
            OfpMessage::Vendor(m) => self.invoke_vendor(m),
            OfpMessage::FeaturesRequest(m) => self.invoke_features_request(m),
            OfpMessage::GetConfigRequest(m) => self.invoke_get_config_request(m),
            OfpMessage::SetConfig(m) => self.invoke_set_config(m),
            OfpMessage::PacketOut(m) => self.invoke_packet_out(m),
            OfpMessage::FlowMod(m) => self.invoke_flow_mod(m),
            OfpMessage::PortMod(m) => self.invoke_port_mod(m),
            OfpMessage::StatsRequest(m) => self.invoke_stats_request(m),
            OfpMessage::BarrierRequest(m) => self.invoke_barrier_request(m),
            OfpMessage::QueueGetConfigRequest(m) => self.invoke_queue_get_config_request(m),
        }
    }
}
