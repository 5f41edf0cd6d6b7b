// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Spawns the agent CLI with flags that request streaming-JSON output on
//! stdout, for both fresh sessions and resumes.

use std::process::Stdio;

use tokio::process::{Child, Command};

pub const DEFAULT_CLI_BINARY: &str = "claude";

pub fn start_args(prompt: &str, model: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--print".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
    ];
    if let Some(model) = model {
        args.push("--model".to_string());
        args.push(model.to_string());
    }
    args.push(prompt.to_string());
    args
}

pub fn resume_args(session_id: &str, prompt: &str) -> Vec<String> {
    vec![
        "--resume".to_string(),
        session_id.to_string(),
        "--print".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
        prompt.to_string(),
    ]
}

pub fn spawn(binary: &str, project_path: &str, args: &[String]) -> std::io::Result<Child> {
    Command::new(binary)
        .args(args)
        .current_dir(project_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}
