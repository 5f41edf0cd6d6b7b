// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Strips system/IDE tag regions that the CLI interleaves into user
//! message text (context the human never typed) so discovery's
//! `sessionName` reflects what the user actually wrote.

use std::sync::OnceLock;

use regex::Regex;

const KNOWN_TAGS: &[&str] = &[
    "system-reminder",
    "ide_opened_file",
    "ide_selection",
    "ide_context",
    "gitStatus",
    "command-name",
    "claudeMd",
];

struct TagRegexes {
    paired: Vec<Regex>,
    orphan: Vec<Regex>,
    /// Catch-all for a truncated tag of any name, not just the known set —
    /// a record can be cut off mid-tag on a tag this adapter has never
    /// seen named.
    generic_orphan: Regex,
}

static REGEXES: OnceLock<TagRegexes> = OnceLock::new();

fn regexes() -> &'static TagRegexes {
    REGEXES.get_or_init(|| TagRegexes {
        paired: KNOWN_TAGS
            .iter()
            .map(|tag| Regex::new(&format!(r"(?s)<{tag}(?:\s[^>]*)?>.*?</{tag}>")).unwrap())
            .collect(),
        orphan: KNOWN_TAGS
            .iter()
            .map(|tag| Regex::new(&format!(r"(?s)<{tag}(?:\s[^>]*)?>.*$")).unwrap())
            .collect(),
        generic_orphan: Regex::new(r"(?s)<[A-Za-z][^>]*>[^<]*$").unwrap(),
    })
}

/// Remove every known system/IDE tag region, paired or orphaned (the
/// latter arising when a record was truncated mid-tag), then any
/// remaining orphan tag of an unrecognized name through end-of-text.
/// Idempotent: running this on its own output is a no-op.
pub fn strip_system_tags(text: &str) -> String {
    let regexes = regexes();
    let mut out = text.to_string();
    for re in &regexes.paired {
        out = re.replace_all(&out, "").into_owned();
    }
    for re in &regexes.orphan {
        out = re.replace_all(&out, "").into_owned();
    }
    out = regexes.generic_orphan.replace(&out, "").into_owned();
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_paired_system_reminder() {
        let input = "hello <system-reminder>ignore this</system-reminder> world";
        assert_eq!(strip_system_tags(input), "hello  world".trim());
    }

    #[test]
    fn strips_orphan_tag_to_end_of_text() {
        let input = "hello <ide_opened_file>src/main.rs more stuff never closed";
        assert_eq!(strip_system_tags(input), "hello");
    }

    #[test]
    fn leaves_plain_text_untouched() {
        let input = "just a normal message";
        assert_eq!(strip_system_tags(input), input);
    }

    #[test]
    fn is_idempotent() {
        let input = "<gitStatus>branch: main</gitStatus> fix the bug <command-name>/compact no close";
        let once = strip_system_tags(input);
        let twice = strip_system_tags(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn strips_orphan_tag_of_unknown_name() {
        let input = "hello <unknown-custom-tag>some trailing text never closed";
        assert_eq!(strip_system_tags(input), "hello");
    }

    #[test]
    fn strips_multiple_known_tags() {
        let input = "<ide_context>ctx</ide_context>actual request<claudeMd>notes</claudeMd>";
        assert_eq!(strip_system_tags(input), "actual request");
    }
}
