// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Pure tool classifiers used by adapters to normalise tool calls before
//! emitting `tool:executing` and by the approval manager to decide whether
//! a call needs a human.
//!
//! `assess_risk` is deterministic: same `(name, input)` always yields the
//! same [`RiskLevel`]. The rule order matters — see the doc comment on
//! [`assess_risk`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Risk level, ordered `Low < Medium < High < Critical` so a configured
/// threshold can be compared with `<` as the spec requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Coarse bucket for a tool, independent of risk — used for UI grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Shell,
    FileWrite,
    FileRead,
    Search,
    Network,
    Other,
}

const HIGH_RISK_BASH_SUBSTRINGS: &[&str] =
    &["rm", "sudo", "chmod", "chown", "kill", "mkfs", "dd"];
const MEDIUM_RISK_BASH_SUBSTRINGS: &[&str] =
    &["npm", "pip", "brew", "apt", "yarn", "pnpm", "cargo"];

fn bash_command(input: &Value) -> Option<&str> {
    input.get("command").and_then(Value::as_str)
}

/// Rule order (first match wins), per the spec:
///
/// 1. `Bash` with a command containing `rm`/`sudo`/`chmod`/`chown`/`kill`/
///    `mkfs`/`dd` as a literal substring → `high`.
/// 2. `Bash` with a command containing a package manager invocation as a
///    literal substring → `medium`.
/// 3. `Write` or `Edit` → `medium`.
/// 4. everything else → `low`.
///
/// Substring, not word, matching: `docker swarm deploy` is `high` because
/// it contains `rm` (the tail of "swarm"), matching the spec's literal
/// wording over a friendlier word-boundary reading.
pub fn assess_risk(tool_name: &str, input: &Value) -> RiskLevel {
    if tool_name == "Bash" {
        if let Some(cmd) = bash_command(input) {
            if HIGH_RISK_BASH_SUBSTRINGS.iter().any(|w| cmd.contains(w)) {
                return RiskLevel::High;
            }
            if MEDIUM_RISK_BASH_SUBSTRINGS.iter().any(|w| cmd.contains(w)) {
                return RiskLevel::Medium;
            }
        }
        return RiskLevel::Low;
    }
    if tool_name == "Write" || tool_name == "Edit" {
        return RiskLevel::Medium;
    }
    RiskLevel::Low
}

pub fn categorize_tool(name: &str) -> ToolCategory {
    match name {
        "Bash" => ToolCategory::Shell,
        "Write" | "Edit" | "NotebookEdit" => ToolCategory::FileWrite,
        "Read" | "Glob" => ToolCategory::FileRead,
        "Grep" => ToolCategory::Search,
        "WebFetch" | "WebSearch" => ToolCategory::Network,
        _ => ToolCategory::Other,
    }
}

/// Human-readable one-liner for a tool call, used in approval previews and
/// log lines. Falls back to the tool name alone when there's no argument
/// worth surfacing.
pub fn describe_tool_call(name: &str, input: &Value) -> String {
    match name {
        "Bash" => match bash_command(input) {
            Some(cmd) => format!("Bash: {cmd}"),
            None => "Bash".to_string(),
        },
        "Write" | "Edit" => {
            let path = input.get("file_path").and_then(Value::as_str).unwrap_or("?");
            format!("{name} {path}")
        }
        "Read" => {
            let path = input.get("file_path").and_then(Value::as_str).unwrap_or("?");
            format!("Read {path}")
        }
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bash_rm_is_high_risk() {
        assert_eq!(
            assess_risk("Bash", &json!({"command": "rm -rf /tmp/foo"})),
            RiskLevel::High
        );
    }

    #[test]
    fn bash_sudo_is_high_risk() {
        assert_eq!(
            assess_risk("Bash", &json!({"command": "sudo apt install x"})),
            RiskLevel::High
        );
    }

    #[test]
    fn high_risk_rule_wins_over_medium_when_both_present() {
        // "sudo npm install" contains both a high-risk and medium-risk word —
        // rule 1 must win (tie-break order in the spec).
        assert_eq!(
            assess_risk("Bash", &json!({"command": "sudo npm install -g x"})),
            RiskLevel::High
        );
    }

    #[test]
    fn bash_npm_is_medium_risk() {
        assert_eq!(
            assess_risk("Bash", &json!({"command": "npm install"})),
            RiskLevel::Medium
        );
    }

    #[test]
    fn bash_cargo_is_medium_risk() {
        assert_eq!(
            assess_risk("Bash", &json!({"command": "cargo build --release"})),
            RiskLevel::Medium
        );
    }

    #[test]
    fn bash_plain_ls_is_low_risk() {
        assert_eq!(assess_risk("Bash", &json!({"command": "ls -la"})), RiskLevel::Low);
    }

    #[test]
    fn bash_matches_high_risk_word_as_a_substring_of_something_else() {
        // "swarm" ends in "rm" — substring matching per the spec, not word
        // matching, so this classifies as high risk.
        assert_eq!(
            assess_risk("Bash", &json!({"command": "docker swarm deploy"})),
            RiskLevel::High
        );
    }

    #[test]
    fn write_is_medium_risk() {
        assert_eq!(
            assess_risk("Write", &json!({"file_path": "/tmp/x"})),
            RiskLevel::Medium
        );
    }

    #[test]
    fn edit_is_medium_risk() {
        assert_eq!(
            assess_risk("Edit", &json!({"file_path": "/tmp/x"})),
            RiskLevel::Medium
        );
    }

    #[test]
    fn unknown_tool_is_low_risk() {
        assert_eq!(assess_risk("Glob", &json!({})), RiskLevel::Low);
    }

    #[test]
    fn assess_risk_is_pure() {
        let input = json!({"command": "rm -rf /"});
        assert_eq!(assess_risk("Bash", &input), assess_risk("Bash", &input));
    }

    #[test]
    fn risk_level_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn describe_bash_includes_command() {
        let d = describe_tool_call("Bash", &json!({"command": "ls"}));
        assert_eq!(d, "Bash: ls");
    }

    #[test]
    fn describe_write_includes_path() {
        let d = describe_tool_call("Write", &json!({"file_path": "/tmp/foo.ts"}));
        assert_eq!(d, "Write /tmp/foo.ts");
    }

    #[test]
    fn categorize_bash_is_shell() {
        assert_eq!(categorize_tool("Bash"), ToolCategory::Shell);
    }

    #[test]
    fn categorize_write_is_file_write() {
        assert_eq!(categorize_tool("Write"), ToolCategory::FileWrite);
    }
}
