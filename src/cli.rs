use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use idrelay_core::config::IdentityConfig;
use idrelay_http::server::ServerConfig;
use tracing::{debug, info};

use crate::{IdrelayError, IdrelayResult};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the identity configuration file (JSON)
    #[arg(short, long, env = "IDRELAY_CONFIG", default_value = "idrelay.json")]
    pub config: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the HTTP and WebSocket API (default)
    Serve {
        /// Host address to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
    /// Print the effective configuration and exit
    Config,
}

impl Cli {
    /// The subcommand to run; `serve` with its defaults when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or_else(|| {
            let defaults = ServerConfig::default();
            Command::Serve {
                host: defaults.host,
                port: defaults.port,
            }
        })
    }
}

/// Loads the configuration at `path`, falling back to defaults when the
/// file does not exist.
pub fn load_config(path: &Path) -> IdrelayResult<IdentityConfig> {
    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return Ok(IdentityConfig::default());
    }
    let config = IdentityConfig::from_file(path)?;
    info!("Config loaded from {}", path.display());
    Ok(config)
}

pub async fn run(cli: Cli) -> IdrelayResult<()> {
    let identity = load_config(&cli.config)?;
    debug!("config: {:?}", identity);

    match cli.command() {
        Command::Config => {
            let rendered = serde_json::to_string_pretty(&identity)
                .map_err(|e| IdrelayError::Internal(format!("Failed to render config: {}", e)))?;
            println!("{}", rendered);
            Ok(())
        }
        Command::Serve { host, port } => {
            let server = ServerConfig { host, port };
            idrelay_http::start_with_config(server, identity)
                .await
                .map_err(|e| IdrelayError::Server(e.to_string()))
        }
    }
}
