//! # pointsync agent
//!
//! One-shot synchronization run against the remote tag store:
//!
//! 1. Load the source inventory (points and samples) from a JSON file
//! 2. Authenticate via the SCRAM handshake
//! 3. Resolve the site → equipment → point hierarchy
//! 4. Write history samples against the resolved entities
//!
//! Retry and scheduling policy belongs to whatever invokes the agent; a
//! failed run exits non-zero with the failing stage in the log output.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod inventory;
mod runtime;

pub use config::AgentConfig;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting pointsync agent"
    );

    let config = AgentConfig::from_env()?;
    runtime::run(&config)
}
