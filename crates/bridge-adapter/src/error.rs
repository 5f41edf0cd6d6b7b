// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session {0} already exists")]
    AlreadyExists(String),
    #[error("failed to spawn agent process: {0}")]
    SpawnFailed(String),
    #[error("session {0} has no running process to send input to")]
    NotRunning(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed session record: {0}")]
    Malformed(String),
    #[error("operation not supported by this adapter: {0}")]
    Unsupported(String),
    #[error("failed to start filesystem watch: {0}")]
    Watch(String),
}
