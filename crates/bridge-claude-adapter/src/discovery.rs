// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Read-only enumeration of session logs under `${AGENT_HOME}/projects/`.
//! Every candidate that can't be read cleanly is skipped rather than
//! failing the whole scan — one corrupt log must not hide every other
//! session.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bridge_adapter::DiscoveredSession;
use serde_json::Value;

use crate::path::decode_project_path;
use crate::record::extract_text;
use crate::tags::strip_system_tags;

const METADATA_HEAD_WINDOW: usize = 50;
const TAIL_WINDOW: usize = 30;
const SESSION_NAME_MAX: usize = 100;
const LAST_MESSAGE_MAX: usize = 200;

fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max).collect();
    format!("{truncated}...")
}

/// Non-empty lines of a file, in order. I/O errors (including ENOENT —
/// the log can vanish between directory listing and read) return an
/// empty vec rather than an error, so the caller simply skips the
/// candidate.
fn read_nonempty_lines(path: &Path) -> Vec<String> {
    let Ok(file) = fs::File::open(path) else { return Vec::new() };
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter(|l| !l.trim().is_empty())
        .collect()
}

fn record_cwd(line: &str) -> Option<String> {
    let value: Value = serde_json::from_str(line).ok()?;
    value.get("cwd").and_then(Value::as_str).map(str::to_string)
}

fn first_user_session_name(lines: &[String]) -> Option<String> {
    for line in lines {
        let Ok(value) = serde_json::from_str::<Value>(line) else { continue };
        if value.get("type").and_then(Value::as_str) != Some("user") {
            continue;
        }
        let content = value.pointer("/message/content").cloned().unwrap_or(Value::Null);
        let cleaned = strip_system_tags(&extract_text(&content));
        if !cleaned.is_empty() {
            return Some(truncate_with_ellipsis(&cleaned, SESSION_NAME_MAX));
        }
    }
    None
}

struct TailSummary {
    last_message: Option<String>,
    model_id: Option<String>,
}

fn newest_assistant_summary(lines: &[String]) -> TailSummary {
    let window_start = lines.len().saturating_sub(TAIL_WINDOW);
    for line in lines[window_start..].iter().rev() {
        let Ok(value) = serde_json::from_str::<Value>(line) else { continue };
        if value.get("type").and_then(Value::as_str) != Some("assistant") {
            continue;
        }
        let model_id = value.pointer("/message/model").and_then(Value::as_str).map(str::to_string);
        let content = value.pointer("/message/content").cloned().unwrap_or(Value::Null);
        let text = extract_text(&content);
        if !text.trim().is_empty() {
            return TailSummary { last_message: Some(truncate_with_ellipsis(&text, LAST_MESSAGE_MAX)), model_id };
        }
        if model_id.is_some() {
            return TailSummary { last_message: None, model_id };
        }
    }
    TailSummary { last_message: None, model_id: None }
}

/// Enumerate every `.jsonl` session log under `projects_root`, newest
/// first by file modification time. Read-only; never mutates the
/// filesystem.
pub fn discover_sessions(projects_root: &Path) -> Vec<DiscoveredSession> {
    let Ok(project_dirs) = fs::read_dir(projects_root) else { return Vec::new() };

    let mut sessions = Vec::new();
    for project_dir in project_dirs.filter_map(Result::ok) {
        let Ok(file_type) = project_dir.file_type() else { continue };
        if !file_type.is_dir() {
            continue;
        }
        let dir_name = project_dir.file_name();
        let dir_name = dir_name.to_string_lossy();
        let decoded_project_path = decode_project_path(&dir_name);

        let Ok(entries) = fs::read_dir(project_dir.path()) else { continue };
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(session) = read_session_candidate(&path, decoded_project_path.as_deref()) {
                sessions.push(session);
            }
        }
    }

    sessions.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    sessions
}

fn read_session_candidate(path: &Path, decoded_project_path: Option<&str>) -> Option<DiscoveredSession> {
    let id = path.file_stem()?.to_str()?.to_string();
    let modified_at = fs::metadata(path).and_then(|m| m.modified()).unwrap_or(SystemTime::UNIX_EPOCH);

    let lines = read_nonempty_lines(path);
    let head: Vec<String> = lines.iter().take(METADATA_HEAD_WINDOW).cloned().collect();

    let project_path = head
        .iter()
        .find_map(|l| record_cwd(l))
        .or_else(|| decoded_project_path.map(str::to_string))?;

    let session_name = first_user_session_name(&head);
    let tail = newest_assistant_summary(&lines);

    Some(DiscoveredSession {
        id,
        project_path,
        session_name,
        last_message: tail.last_message,
        model_id: tail.model_id,
        modified_at,
    })
}

/// Best-effort guess at the agent's session-log root, honouring
/// `CLAUDE_HOME`/`HOME` the same way the CLI itself does.
pub fn default_projects_root() -> PathBuf {
    if let Ok(home) = std::env::var("CLAUDE_HOME") {
        return PathBuf::from(home).join("projects");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".claude").join("projects")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;

    fn write_jsonl(path: &Path, lines: &[&str]) {
        let mut f = File::create(path).unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
    }

    #[test]
    fn discovers_session_under_encoded_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        let project_dir = dir.path().join("-home-dev-project");
        fs::create_dir_all(&project_dir).unwrap();
        let log = project_dir.join("sess1.jsonl");
        write_jsonl(
            &log,
            &[
                r#"{"type":"user","cwd":"/home/dev/project","uuid":"u1","message":{"content":"fix the login bug please"}}"#,
                r#"{"type":"assistant","uuid":"a1","message":{"model":"claude-x","content":[{"type":"text","text":"Fixed it."}]}}"#,
            ],
        );

        let sessions = discover_sessions(dir.path());
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "sess1");
        assert_eq!(sessions[0].project_path, "/home/dev/project");
        assert_eq!(sessions[0].session_name.as_deref(), Some("fix the login bug please"));
        assert_eq!(sessions[0].last_message.as_deref(), Some("Fixed it."));
        assert_eq!(sessions[0].model_id.as_deref(), Some("claude-x"));
    }

    #[test]
    fn falls_back_to_decoded_directory_name_when_no_cwd_field() {
        let dir = tempfile::tempdir().unwrap();
        let project_dir = dir.path().join("-tmp-proj");
        fs::create_dir_all(&project_dir).unwrap();
        let log = project_dir.join("sess1.jsonl");
        write_jsonl(&log, &[r#"{"type":"user","uuid":"u1","message":{"content":"hi"}}"#]);

        let sessions = discover_sessions(dir.path());
        assert_eq!(sessions[0].project_path, "/tmp/proj");
    }

    #[test]
    fn malformed_lines_do_not_fail_the_whole_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let project_dir = dir.path().join("-tmp-proj");
        fs::create_dir_all(&project_dir).unwrap();
        let log = project_dir.join("sess1.jsonl");
        write_jsonl(
            &log,
            &[
                "not json at all",
                r#"{"type":"user","cwd":"/tmp/proj","uuid":"u1","message":{"content":"ok go"}}"#,
            ],
        );
        let sessions = discover_sessions(dir.path());
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_name.as_deref(), Some("ok go"));
    }

    #[test]
    fn non_jsonl_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let project_dir = dir.path().join("-tmp-proj");
        fs::create_dir_all(&project_dir).unwrap();
        fs::write(project_dir.join("notes.txt"), "hello").unwrap();
        let sessions = discover_sessions(dir.path());
        assert!(sessions.is_empty());
    }

    #[test]
    fn sessions_sorted_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let project_dir = dir.path().join("-tmp-proj");
        fs::create_dir_all(&project_dir).unwrap();
        write_jsonl(
            &project_dir.join("older.jsonl"),
            &[r#"{"type":"user","cwd":"/tmp/proj","message":{"content":"first"}}"#],
        );
        std::thread::sleep(std::time::Duration::from_millis(20));
        write_jsonl(
            &project_dir.join("newer.jsonl"),
            &[r#"{"type":"user","cwd":"/tmp/proj","message":{"content":"second"}}"#],
        );
        let sessions = discover_sessions(dir.path());
        assert_eq!(sessions[0].id, "newer");
        assert_eq!(sessions[1].id, "older");
    }
}
