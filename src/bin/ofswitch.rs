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

use std::cell::RefCell;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;
use tracing::{error, info, warn};

use ofswitch::ofp::{
    self, BadRequestCode, HelloFailedCode, OfpErrorCode, OfpHeader, XidGenerator, OFP_VERSION,
};
use ofswitch::service::{setup_local_tracing, setup_tracing, verbosity_level};
use ofswitch::{
    AppResult, EventLoop, Reactor, Shutdown, SwitchConfig, SwitchInterface,
    TcpConnector, Timer, TimerQueue,
};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    /// controller address, overrides the config file
    #[arg(long, value_name = "IP:PORT")]
    pub controller: Option<SocketAddr>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Parser)]
pub enum Command {
    PrintConfig,
}

/// Requests this switch has no datapath for.
fn reject(switch: &SwitchInterface, header: &OfpHeader) {
    let error = OfpErrorCode::BadRequest(BadRequestCode::BadType);
    if let Err(e) = switch.send_error_code(header.xid, error) {
        warn!("cannot reject xid {:#010x}: {}", header.xid, e);
    }
    switch.delete_context(header.xid);
}

fn reply(switch: &SwitchInterface, xid: u32, message: AppResult<bytes::BytesMut>) {
    match message.and_then(|message| switch.send(&message)) {
        Ok(()) => {}
        Err(e) => warn!("cannot reply to xid {:#010x}: {}", xid, e),
    }
    switch.delete_context(xid);
}

fn install_handlers(switch: &SwitchInterface) {
    let xids = Rc::new(RefCell::new(XidGenerator::new()));
    switch.on_connected(move |switch| {
        let hello = ofp::hello(xids.borrow_mut().next_xid());
        if let Err(e) = switch.send(&hello) {
            error!("cannot greet controller: {}", e);
        }
    });
    switch.on_disconnected(|_| warn!("controller went away"));

    switch.on_hello(|switch, hello| {
        if hello.header.version != OFP_VERSION {
            warn!("controller speaks version {:#04x}", hello.header.version);
            let error = OfpErrorCode::HelloFailed(HelloFailedCode::Incompatible);
            if let Err(e) = switch.send_error_code(hello.header.xid, error) {
                warn!("cannot send hello failure: {}", e);
            }
            return;
        }
        info!("controller hello, xid {:#010x}", hello.header.xid);
    });
    switch.on_error(|_, error| {
        warn!(
            "controller error type {} code {} for xid {:#010x}",
            error.err_type, error.code, error.header.xid
        );
    });
    switch.on_echo_request(|switch, echo| {
        reply(switch, echo.header.xid, ofp::echo_reply(echo.header.xid, &echo.body));
    });
    switch.on_barrier_request(|switch, barrier| {
        reply(switch, barrier.header.xid, Ok(ofp::barrier_reply(barrier.header.xid)));
    });

    switch.on_vendor(|switch, m| reject(switch, &m.header));
    switch.on_features_request(|switch, m| reject(switch, &m.header));
    switch.on_get_config_request(|switch, m| reject(switch, &m.header));
    switch.on_set_config(|switch, m| reject(switch, &m.header));
    switch.on_packet_out(|switch, m| reject(switch, &m.header));
    switch.on_flow_mod(|switch, m| reject(switch, &m.header));
    switch.on_port_mod(|switch, m| reject(switch, &m.header));
    switch.on_stats_request(|switch, m| reject(switch, &m.header));
    switch.on_queue_get_config_request(|switch, m| reject(switch, &m.header));
}

fn main() -> AppResult<()> {
    let commandline: CommandLine = CommandLine::parse();

    let config_path = commandline.conf.as_ref().map_or_else(
        || {
            let mut path = PathBuf::from("./");
            path.push("conf.toml");
            path
        },
        PathBuf::from,
    );
    let mut config = SwitchConfig::set_up_config(config_path)?;
    if let Some(controller) = commandline.controller {
        config.controller.ip = controller.ip().to_string();
        config.controller.port = controller.port();
    }

    if let Some(Command::PrintConfig) = commandline.command {
        println!("{:#?}", config);
        return Ok(());
    }

    let level = verbosity_level(commandline.verbose);
    let _guard = if config.log.file_logging {
        Some(setup_tracing(&config.log.dir, level)?)
    } else {
        setup_local_tracing(level)?;
        None
    };

    let reactor = Rc::new(Reactor::with_libc_poller(config.event_loop.max_fds));
    let timers = Rc::new(TimerQueue::with_system_clock());
    let timer: Rc<dyn Timer> = timers.clone();
    let switch = SwitchInterface::with_config(
        reactor.clone(),
        timer,
        Box::new(TcpConnector),
        &config,
    );
    install_handlers(&switch);

    let controller = config.controller_addr()?;
    switch.initiate(controller)?;
    info!("switch started, controller {}", controller);

    let shutdown = Shutdown::new();
    shutdown.install_signal_handler()?;
    let event_loop = EventLoop::new(reactor, timers, config.max_wait());
    let result = event_loop.run(&shutdown);
    switch.finalize();
    info!("switch stopped");
    result
}
