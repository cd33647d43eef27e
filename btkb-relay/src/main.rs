//! btkb-relay entry point.
//!
//! ```text
//! btkb-relay                     Run in the foreground
//! btkb-relay --config <path>     Load a custom config TOML
//! btkb-relay --fifo <path>       Override the command FIFO path
//! btkb-relay --socket <path>     Override the session socket path
//! btkb-relay --gen-config        Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use btkb_relay::config::RelayConfig;
use btkb_relay::service::RelayService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "btkb-relay", about = "Relay FIFO key commands to a HID keyboard session")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "btkb-relay.toml")]
    config: PathBuf,

    /// Command FIFO path (overrides the config file).
    #[arg(long)]
    fifo: Option<PathBuf>,

    /// Session socket path (overrides the config file).
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&RelayConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = RelayConfig::load(&cli.config);
    if let Some(fifo) = cli.fifo {
        config.fifo.path = fifo;
    }
    if let Some(socket) = cli.socket {
        config.session.socket_path = socket;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("btkb-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("command FIFO: {}", config.fifo.path.display());
    info!("session socket: {}", config.session.socket_path.display());

    let service = RelayService::new(config);
    match service.run().await {
        Ok(stats) => {
            info!(
                "relayed {} line(s), discarded {}",
                stats.lines_relayed, stats.lines_discarded
            );
            Ok(())
        }
        Err(e) => {
            error!("relay stopped with error: {e}");
            Err(e.into())
        }
    }
}
