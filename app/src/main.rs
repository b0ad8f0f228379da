use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod bridge;
mod clock;
mod config;
mod device;
mod rt;
mod sim;
mod traffic;
mod web;

use bridge::{Bridge, OutboundMsg, RxQueue};
use device::DeviceServer;
use rt::{ReqTarget, RtCore, RtShared, RtThread};
use sim::channel::{NullChannel, SimChannel};
use sim::link::SimLink;
use sim::session::SimSession;
use web::WebServer;

#[derive(Parser, Debug, Clone)]
#[command(name = "airlink", about = "Flight simulator bridge")]
struct Cli {
    /// Config file path (default: ~/.config/airlink/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP/WebSocket bind address (overrides config)
    #[arg(long)]
    web_bind: Option<SocketAddr>,

    /// UDP device server bind address (overrides config)
    #[arg(long)]
    device_bind: Option<SocketAddr>,

    /// Static content root served over HTTP (overrides config)
    #[arg(long)]
    html_root: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("airlink=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("airlink {}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let config = config::load(&config_path);

    let web_bind = match cli.web_bind {
        Some(bind) => bind,
        None => config
            .web
            .bind
            .parse()
            .context("invalid web bind address in config")?,
    };
    let device_bind = match cli.device_bind {
        Some(bind) => bind,
        None => config
            .device
            .bind
            .parse()
            .context("invalid device bind address in config")?,
    };
    let html_root = cli
        .html_root
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.web.html_root));

    // Single fan-out bus plus the inbound command queue.
    let (bus_tx, _) = broadcast::channel::<OutboundMsg>(1024);
    let rx_queue = Arc::new(RxQueue::new());

    // The vendor telemetry backend plugs in here.
    let channel: Box<dyn SimChannel> = Box::new(NullChannel);
    let link = SimLink::<ReqTarget>::new(channel);
    let mut session = SimSession::new(link, config.sim.app_name.clone());

    let now = clock::steady_now_ms();
    if !config.sim.allow_reconnect {
        session.allow_reconnect(false, now);
    }

    let server = DeviceServer::new(device_bind);
    let bridge = Bridge::new(bus_tx.clone());
    let mut core = RtCore::new(session, server, bridge, Arc::clone(&rx_queue));

    if config.device.autostart {
        core.server.start();
    }
    if config.sim.autostart {
        core.session.initialize(now);
    }

    let shared = Arc::new(RtShared::new(core));

    let web = WebServer::new(web_bind, html_root, bus_tx.clone(), Arc::clone(&rx_queue));
    web.start();

    let mut thread = RtThread::start(Arc::clone(&shared));

    command_loop(&shared);

    info!("shutting down...");
    thread.stop(&shared);
    web.stop();
    drop(bus_tx);

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI command loop
// ---------------------------------------------------------------------------

/// Line-oriented admin loop. Commands that touch the mutation domain take
/// cmd mode for their duration.
fn command_loop(shared: &Arc<RtShared>) {
    for line in std::io::stdin().lines() {
        let Ok(line) = line else {
            return;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (cmd, args) = match line.split_once(' ') {
            Some((cmd, args)) => (cmd, args.trim()),
            None => (line, ""),
        };

        match cmd {
            "stop" | "exit" | "quit" => return,

            "help" => {
                info!("Available commands:");
                info!(" - stop - stops app");
                info!(" - kickall - kicks all clients");
                info!(" - kick <id> - kicks the client");
                info!(" - status - prints slot status");
                info!(" - device <subcmd> - sends message to connected devices");
            }

            "status" => {
                let core = shared.enter_cmd_mode();
                core.server.print_status();
            }

            "kickall" => {
                let mut core = shared.enter_cmd_mode();
                core.admin_kick_all();
            }

            "kick" => {
                let id = match args.parse() {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::error!("kick: invalid slot id '{args}': {e}");
                        continue;
                    }
                };
                let mut core = shared.enter_cmd_mode();
                core.admin_kick(id);
            }

            "device" => {
                if args.starts_with("dev") {
                    let mut core = shared.enter_cmd_mode();
                    core.admin_reboot_devices();
                }
            }

            _ => {}
        }
    }
}
