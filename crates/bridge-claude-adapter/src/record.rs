// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Value-level accessors shared by attach-mode (`handleRecord`) and
//! live-mode (`handleStreamRecord`) ingestion. Parsing stays on
//! `serde_json::Value` rather than typed structs because both record
//! families are loosely and inconsistently shaped across CLI versions —
//! the same approach the other reference adapters in this codebase take
//! for their sidecar JSON.

use bridge_protocol::event::TokenUsage;
use serde_json::Value;

/// Concatenate every `text` block in a `message.content` value. Content
/// may be a bare string (older log format) or an array of typed blocks.
pub fn extract_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

/// One `tool_result` block embedded in a user record's content array.
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub output: String,
    pub is_error: bool,
}

pub fn extract_tool_results(content: &Value) -> Vec<ToolResultBlock> {
    let Value::Array(blocks) = content else { return Vec::new() };
    blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_result"))
        .filter_map(|b| {
            let tool_use_id = b.get("tool_use_id").and_then(Value::as_str)?.to_string();
            let output = stringify_tool_output(b.get("content").unwrap_or(&Value::Null));
            let is_error = b.get("is_error").and_then(Value::as_bool).unwrap_or(false);
            Some(ToolResultBlock { tool_use_id, output, is_error })
        })
        .collect()
}

/// Render a `tool_result` block's `content` field as plain text: a bare
/// string passes through, an array of text blocks is joined, anything
/// else is rendered as JSON.
fn stringify_tool_output(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(_) => extract_text(content),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One `tool_use` block embedded in an assistant record's content array.
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// One `thinking` (or `redacted_thinking`) block.
pub struct ThinkingBlock {
    pub text: String,
    pub redacted: bool,
}

/// A single content block in emission order, already classified.
pub enum AssistantBlock {
    Text(String),
    Thinking(ThinkingBlock),
    ToolUse(ToolUseBlock),
}

/// Walk an assistant record's `message.content` array, preserving order.
pub fn extract_assistant_blocks(content: &Value) -> Vec<AssistantBlock> {
    let Value::Array(blocks) = content else { return Vec::new() };
    blocks
        .iter()
        .filter_map(|b| match b.get("type").and_then(Value::as_str) {
            Some("text") => {
                Some(AssistantBlock::Text(b.get("text").and_then(Value::as_str)?.to_string()))
            }
            Some("thinking") => Some(AssistantBlock::Thinking(ThinkingBlock {
                text: b.get("thinking").and_then(Value::as_str).unwrap_or("").to_string(),
                redacted: false,
            })),
            Some("redacted_thinking") => {
                Some(AssistantBlock::Thinking(ThinkingBlock { text: String::new(), redacted: true }))
            }
            Some("tool_use") => Some(AssistantBlock::ToolUse(ToolUseBlock {
                id: b.get("id").and_then(Value::as_str)?.to_string(),
                name: b.get("name").and_then(Value::as_str)?.to_string(),
                input: b.get("input").cloned().unwrap_or(Value::Null),
            })),
            _ => None,
        })
        .collect()
}

/// Parse an Anthropic-shaped `usage` object. Missing fields default to
/// zero rather than failing the record.
pub fn parse_usage(usage: &Value) -> TokenUsage {
    TokenUsage {
        input: usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
        output: usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
        cache_read: usage.get("cache_read_input_tokens").and_then(Value::as_u64).unwrap_or(0),
        cache_write: usage.get("cache_creation_input_tokens").and_then(Value::as_u64).unwrap_or(0),
    }
}
