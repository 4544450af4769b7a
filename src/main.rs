use clap::Parser;
use log::{error, info, warn, LevelFilter};
use nidps::configuration::config::Config;
use nidps::controller::controller_handler::Controller;
use nidps::web_interface::WebServer;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "nidps")]
#[command(version = "0.1.0")]
#[command(about = "SDN intrusion detection and prevention controller")]
struct Args {
    /// TOML configuration file, defaults apply when omitted
    #[arg(env = "NIDPS_CONFIG")]
    config_file: Option<PathBuf>,

    /// Overrides controller.log_level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Overrides api.port
    #[arg(long)]
    api_port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match &args.config_file {
        Some(path) => Config::from_file(path).unwrap_or_else(|e| {
            eprintln!("Unable to import configuration from {}: {}", path.display(), e);
            std::process::exit(1);
        }),
        None => Config::default(),
    };
    if let Some(port) = args.api_port {
        config.api.port = port;
    }

    let level_name = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.controller.log_level.clone());
    let level = LevelFilter::from_str(&level_name).unwrap_or(LevelFilter::Info);
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_target(false)
        .init();

    println!(
        "
███╗   ██╗██╗██████╗ ██████╗ ███████╗
████╗  ██║██║██╔══██╗██╔══██╗██╔════╝
██╔██╗ ██║██║██║  ██║██████╔╝███████╗
██║╚██╗██║██║██║  ██║██╔═══╝ ╚════██║
██║ ╚████║██║██████╔╝██║     ███████║
╚═╝  ╚═══╝╚═╝╚═════╝ ╚═╝     ╚══════╝
=====================================
 SDN intrusion detection & prevention
=====================================
"
    );

    match &args.config_file {
        Some(path) => info!("Configuration imported from {}", path.display()),
        None => info!("No configuration file given, using defaults"),
    }
    let controller = match Controller::from_config(config.clone()) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    let (events, events_rx) = mpsc::channel(config.controller.max_inflight_events * 4);
    let control_loop = tokio::spawn(controller.clone().run(events_rx));
    let ingestion = controller.spawn_alert_ingestion(events.clone());

    if config.api.enabled {
        let server = WebServer::new(controller.api_state());
        let api = config.api.clone();
        tokio::spawn(async move {
            if let Err(e) = server.start(&api.bind_address, api.port).await {
                error!("Inventory API stopped: {}", e);
            }
        });
    }

    info!("Controller ready, waiting for switch sessions");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");

    if let Some(handle) = ingestion {
        handle.abort();
    }
    drop(events);
    if let Err(e) = control_loop.await {
        error!("Error joining at the end of execution: {:?}", e);
    }
}
