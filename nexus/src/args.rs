//! Command-line arguments (spec.md §6: "CLI / env... loaded at startup").

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// The multi-protocol AI inference gateway.
#[derive(Debug, Parser)]
#[command(name = "nexus", version, about)]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "NEXUS_CONFIG", default_value = "nexus.toml")]
    pub config: PathBuf,

    /// Override the listen address from the config file.
    #[arg(short, long, env = "NEXUS_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,

    /// Log filter string, e.g. `"info"` or `"llm=debug,rate_limit=debug"`.
    #[arg(long, env = "NEXUS_LOG", default_value = "info")]
    pub log: String,
}
