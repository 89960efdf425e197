//! rwsplit Proxy Binary
//!
//! Starts the read/write-splitting proxy.

use clap::Parser;
use rwsplit::config::ConfigBuilder;
use rwsplit::{Config, Server};
use tracing_subscriber::{fmt, EnvFilter};

/// rwsplit Proxy
#[derive(Parser, Debug)]
#[command(name = "rwsplit-proxy")]
#[command(about = "Read/write-splitting proxy for RESP key-value stores")]
#[command(version)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address (host:port)
    #[arg(short, long)]
    listen: Option<String>,

    /// Primary (write) backend address
    #[arg(short, long)]
    primary: Option<String>,

    /// Replica (read) backend address
    #[arg(short, long)]
    replica: Option<String>,

    /// Password sent to the primary with AUTH
    #[arg(long)]
    primary_password: Option<String>,

    /// Password sent to the replica with AUTH
    #[arg(long)]
    replica_password: Option<String>,

    /// Database index selected on both backends
    #[arg(long)]
    db: Option<u32>,

    /// Comma-separated read-only commands routed to the replica
    #[arg(long, value_delimiter = ',')]
    read_only: Option<Vec<String>>,

    /// Maximum concurrent client connections
    #[arg(short, long)]
    max_connections: Option<usize>,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rwsplit=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("rwsplit proxy v{}", rwsplit::VERSION);

    let config = match build_config(args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Primary: {:?}", config.primary);
    tracing::info!("Replica: {:?}", config.replica);
    tracing::debug!("Read-only commands: {:?}", config.read_only_commands);

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

/// Defaults, then the config file, then command-line flags
fn build_config(args: Args) -> rwsplit::Result<Config> {
    let base = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let mut primary = base.primary.clone();
    let mut replica = base.replica.clone();
    if let Some(addr) = args.primary {
        primary.addr = addr;
    }
    if let Some(addr) = args.replica {
        replica.addr = addr;
    }
    if let Some(password) = args.primary_password {
        primary.password = Some(password);
    }
    if let Some(password) = args.replica_password {
        replica.password = Some(password);
    }
    if let Some(db) = args.db {
        primary.db = db;
        replica.db = db;
    }

    let mut builder = ConfigBuilder::from_config(base)
        .primary(primary)
        .replica(replica);
    if let Some(listen) = args.listen {
        builder = builder.listen_addr(listen);
    }
    if let Some(read_only) = args.read_only {
        builder = builder.read_only_commands(read_only);
    }
    if let Some(max) = args.max_connections {
        builder = builder.max_connections(max);
    }

    let config = builder.build();
    config.validate()?;
    Ok(config)
}
