// src/main.rs
//! GPS Relay - receive GPS fixes and fan them out to subscribers

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use gps_relay::{
    config::RelayConfig,
    forward::Forwarder,
    gps::serial::{list_serial_ports, open_serial},
    ingest::ingest,
    logging,
    publisher::Publisher,
    server::{self, AppState},
    sink::LogSink,
};
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const DEFAULT_SERIAL_PORT: &str = "/dev/ttyS0";

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(long, global = true, help = "Path to a JSON config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Write the effective configuration back to the config file")]
    save_config: bool,
    #[arg(short, long, action = ArgAction::Count, global = true, help = "More log output (-v debug, -vv trace)")]
    verbose: u8,
    #[arg(short, long, global = true, help = "No log output")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the HTTP/websocket relay server")]
    Serve(ServeArgs),
    #[command(about = "Read a local GPS receiver and post its fixes to a relay server")]
    Forward(ForwardArgs),
    #[command(name = "list-ports", about = "List available serial ports")]
    ListPorts,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(short, long, help = "Port for HTTP server")]
    port: Option<u16>,
    #[arg(short = 'f', long, help = "HTML file to serve on /map")]
    web_file: Option<PathBuf>,
    #[arg(long, help = "Also read fixes directly from this serial port")]
    serial_port: Option<String>,
    #[arg(long, help = "Serial baud rate")]
    baudrate: Option<u32>,
}

#[derive(Args)]
struct ForwardArgs {
    #[arg(long, help = "Serial port of the GPS receiver")]
    serial_port: Option<String>,
    #[arg(long, help = "Serial baud rate")]
    baudrate: Option<u32>,
    #[arg(short, long, help = "Relay server URL")]
    server: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let verbosity = if cli.quiet { -1 } else { cli.verbose.min(i8::MAX as u8) as i8 };
    logging::init(verbosity);

    let mut config = match &cli.config {
        Some(path) => RelayConfig::load_from(path),
        None => RelayConfig::load(),
    }
    .context("loading configuration")?;

    match cli.command {
        Commands::Serve(args) => {
            if let Some(port) = args.port {
                config.http_port = port;
            }
            if args.web_file.is_some() {
                config.web_file = args.web_file;
            }
            if let Some(port) = args.serial_port {
                config.update_serial(port, args.baudrate.unwrap_or(config.serial_baudrate));
            }
            save_if_requested(&cli.config, cli.save_config, &config)?;
            serve(config).await
        }
        Commands::Forward(args) => {
            if let Some(server) = args.server {
                config.server_url = server;
            }
            let port = args
                .serial_port
                .or_else(|| config.serial_port.clone())
                .unwrap_or_else(|| DEFAULT_SERIAL_PORT.to_string());
            config.update_serial(port, args.baudrate.unwrap_or(config.serial_baudrate));
            save_if_requested(&cli.config, cli.save_config, &config)?;
            forward(config).await
        }
        Commands::ListPorts => {
            list_serial_ports()?;
            Ok(())
        }
    }
}

fn save_if_requested(path: &Option<PathBuf>, save: bool, config: &RelayConfig) -> anyhow::Result<()> {
    if !save {
        return Ok(());
    }
    match path {
        Some(path) => config.save_to(path),
        None => config.save(),
    }
    .context("saving configuration")
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutting down");
        token.cancel();
    });
    shutdown
}

async fn serve(config: RelayConfig) -> anyhow::Result<()> {
    let shutdown = shutdown_on_ctrl_c();

    let publisher = Publisher::new(config.publisher_config(), shutdown.clone());
    let publisher_task = publisher.spawn()?;
    publisher.add_receiver(Arc::new(LogSink::new()));
    let state = AppState::new(publisher.clone(), config.web_file.clone(), shutdown.clone());

    if let Some(port) = &config.serial_port {
        let serial = open_serial(port, config.serial_baudrate)?;
        let publisher = publisher.clone();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            match ingest(serial, &publisher, cancel).await {
                Ok(stats) => info!(
                    sentences = stats.sentences,
                    published = stats.published,
                    "serial ingestion finished"
                ),
                Err(e) => error!(error = %e, "serial ingestion failed"),
            }
        });
    }

    let addr = config.bind_addr()?;
    server::serve(addr, state)
        .await
        .with_context(|| format!("serving on {}", addr))?;

    shutdown.cancel();
    publisher_task.await?;
    Ok(())
}

async fn forward(config: RelayConfig) -> anyhow::Result<()> {
    let shutdown = shutdown_on_ctrl_c();
    let port = config.serial_port.as_deref().unwrap_or(DEFAULT_SERIAL_PORT);

    let serial = open_serial(port, config.serial_baudrate)?;
    let forwarder = Forwarder::new(&config.server_url, config.forward_timeout())?;
    let forwarded = forwarder.run(serial, shutdown).await?;
    info!(forwarded, "forwarding finished");
    Ok(())
}
