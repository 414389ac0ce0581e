use crate::app::YomuServer;
use crate::config::ServerConfig;
use crate::handlers::{build_router, Services, WebContext};
use crate::logging::{init_logging, LogConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "yomu-server.yaml";

/// Command-line interface for the yomu server
#[derive(Parser, Debug)]
#[command(name = "yomu-server")]
#[command(about = "HTTP, SSE and WebSocket server for a manga library", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP API and the broadcast endpoint until interrupted
    Serve {
        /// Settings file (YAML, or JSON by extension). Missing means defaults.
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "YOMU_CONFIG")]
        config: PathBuf,

        #[arg(long)]
        http_port: Option<u16>,

        #[arg(long)]
        ws_port: Option<u16>,

        /// Directory holding the web client
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Print the route table in match order
    Routes,
    /// Settings file helpers
    Config {
        #[command(subcommand)]
        sub: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a settings file with every default spelled out
    Init {
        #[arg(default_value = DEFAULT_CONFIG_PATH)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long, default_value_t = false)]
        force: bool,
    },
}

/// Settings for `serve`: file, then environment, then flags.
pub fn resolve_config(
    path: &Path,
    http_port: Option<u16>,
    ws_port: Option<u16>,
    static_dir: Option<PathBuf>,
) -> anyhow::Result<ServerConfig> {
    let mut config = ServerConfig::load(path)?;
    config.apply_env();
    if let Some(port) = http_port {
        config.http_port = port;
    }
    if let Some(port) = ws_port {
        config.ws_port = port;
    }
    if static_dir.is_some() {
        config.static_dir = static_dir;
    }
    Ok(config)
}

pub fn run_cli() -> anyhow::Result<()> {
    run(Cli::parse())
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve {
            config,
            http_port,
            ws_port,
            static_dir,
        } => {
            let _log_guard = init_logging(&LogConfig::from_env())?;
            let config = resolve_config(&config, http_port, ws_port, static_dir)?;
            serve(&config)
        }
        Commands::Routes => {
            for line in route_table()? {
                println!("{line}");
            }
            Ok(())
        }
        Commands::Config {
            sub: ConfigCommand::Init { path, force },
        } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            ServerConfig::default().save(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

/// The composed route table, one line per route and method.
pub fn route_table() -> anyhow::Result<Vec<String>> {
    let config = ServerConfig {
        fetch_workers: 1,
        ..ServerConfig::default()
    };
    let services = Services::reference(&config)?;
    Ok(build_router(&services, &WebContext::default())?.describe())
}

fn serve(config: &ServerConfig) -> anyhow::Result<()> {
    let handle = YomuServer::start(config, Services::reference(config)?)?;
    info!(http = %handle.http_addr(), ws = %handle.ws_addr(), "yomu-server started");
    wait_for_signal()?;
    handle.stop()
}

/// Block until SIGINT or SIGTERM.
#[cfg(unix)]
fn wait_for_signal() -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    let mut signals = signal_hook::iterator::Signals::new([SIGINT, SIGTERM])?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Shutdown requested");
    }
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_signal() -> anyhow::Result<()> {
    loop {
        std::thread::park();
    }
}
