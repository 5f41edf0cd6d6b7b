// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "agentbridged",
    about = "Local agent bridge daemon: adapters, canonical event protocol, WebSocket multiplexer, and approval gating",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway: discover sessions, serve the WebSocket and hook
    /// HTTP endpoints, and gate risky tool calls behind approval.
    Serve {
        /// Path to the gateway config file (overrides auto-discovery).
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration and exit.
    ShowConfig {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Print the bearer token used by WebSocket clients, generating one on
    /// first run. Printed once; the stored file only ever holds a hash.
    Token {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}
