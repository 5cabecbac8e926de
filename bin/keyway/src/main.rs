//! keyway
//!
//! Derives passkey account addresses, builds and signs user operations and
//! drives them through an ERC-4337 relay.

mod commands;
mod config;

use clap::Parser;
use keyway_core::logger::init_logger;
use tracing::debug;

use crate::config::{Command, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::parse();
    init_logger(&config.log_level, config.log_format)?;

    debug!(
        chain_id = config.chain_id,
        entry_point = %config.entry_point(),
        entry_point_version = ?config.entry_point_version,
        "starting keyway"
    );

    match &config.command {
        Command::Address(args) => commands::address(&config, args).await,
        Command::Send(args) => commands::send(&config, args).await,
        Command::EncodeWebauthn(args) => commands::encode_webauthn_signature(args),
        Command::Receipt { hash } => commands::receipt(&config, *hash).await,
        Command::EntryPoints => commands::entry_points(&config).await,
        Command::GasPrice => commands::gas_price(&config).await,
    }
}
