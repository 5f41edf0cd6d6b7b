// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bridge_gateway::config::{self, GatewayConfig};
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve { config } => run_serve(config.as_deref()).await,
        Commands::ShowConfig { config } => run_show_config(config.as_deref()),
        Commands::Token { config } => run_token(config.as_deref()),
    }
}

async fn run_serve(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = config::load(config_path).context("loading gateway config")?;
    let token_path = resolve_token_path(&config);
    let (stored, freshly_minted) =
        bridge_gateway::auth::load_or_bootstrap(&token_path).context("loading bearer token")?;
    if let Some(raw) = freshly_minted {
        println!("Generated a new bearer token (shown once):\n  {raw}");
    }

    let adapters: Vec<Arc<dyn bridge_adapter::Adapter>> =
        vec![Arc::new(bridge_claude_adapter::ClaudeAdapter::new())];

    let state = bridge_gateway::build_state(&config, adapters, Arc::new(stored));
    bridge_gateway::serve(&config, state).await.context("gateway exited with an error")
}

fn run_show_config(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = config::load(config_path).context("loading gateway config")?;
    println!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

fn run_token(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = config::load(config_path).context("loading gateway config")?;
    let token_path = resolve_token_path(&config);
    let (_, freshly_minted) =
        bridge_gateway::auth::load_or_bootstrap(&token_path).context("loading bearer token")?;
    match freshly_minted {
        Some(raw) => println!("Generated a new bearer token (shown once):\n  {raw}"),
        None => println!(
            "A bearer token already exists at {}.\nIt cannot be displayed again; delete the file to regenerate.",
            token_path.display()
        ),
    }
    Ok(())
}

fn resolve_token_path(config: &GatewayConfig) -> PathBuf {
    config.auth_token_file.clone().unwrap_or_else(default_token_path)
}

fn default_token_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("agentbridged")
        .join("token.yaml")
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
