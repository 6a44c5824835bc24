use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Snapcache memoized commentary cache
#[derive(Debug, Parser)]
#[command(name = "snapcache", about = "Single-flight cache for generated exam commentary")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "snapcache.toml", env = "SNAPCACHE_CONFIG", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the HTTP API and run the reconciler when enabled (default)
    Serve {
        /// Override the listen address
        #[arg(long, env = "SNAPCACHE_LISTEN")]
        listen: Option<SocketAddr>,
    },
    /// Run a single reconciliation pass and exit
    Sweep,
}
