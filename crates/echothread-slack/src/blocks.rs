// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slack Block Kit rendering for the thread header, plus long-text
//! splitting for posted sentences.

use echothread_core::types::HeaderContent;
use serde_json::{json, Value};

/// Slack rejects messages beyond ~4000 chars; stay under with margin.
pub const MAX_POST_CHARS: usize = 3000;

/// Renders the header message blocks: title header, link section, divider,
/// and a status context line that is re-rendered on each state transition.
pub fn header_blocks(header: &HeaderContent) -> Vec<Value> {
    let title = header.title.as_deref().unwrap_or("Live Stream");
    vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": format!("🎥 {title}"), "emoji": true }
        }),
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("<{}|View on YouTube>", header.url) }
        }),
        json!({ "type": "divider" }),
        json!({
            "type": "context",
            "elements": [ { "type": "mrkdwn", "text": header.status.clone() } ]
        }),
    ]
}

/// Fallback text shown in notifications for a header message.
pub fn header_fallback(header: &HeaderContent) -> String {
    match &header.title {
        Some(title) => format!("🎥 {title}"),
        None => format!("🎥 {}", header.url),
    }
}

/// Splits text into chunks that fit a single post, preferring sentence
/// boundaries, then word boundaries, then a hard split.
pub fn split_text_for_post(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for piece in split_after_terminators(text) {
        if current.chars().count() + piece.chars().count() + 1 <= max_chars {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(piece);
            continue;
        }
        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if piece.chars().count() <= max_chars {
            current = piece.to_string();
            continue;
        }
        // A single oversized sentence: fall back to word splits.
        for word in piece.split_whitespace() {
            if current.chars().count() + word.chars().count() + 1 > max_chars {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                // A single oversized word: hard split.
                let mut rest: Vec<char> = word.chars().collect();
                while rest.len() > max_chars {
                    chunks.push(rest.drain(..max_chars).collect());
                }
                current = rest.into_iter().collect();
                continue;
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }
    chunks
}

/// Splits text after sentence terminators (Latin and CJK), keeping the
/// terminator with its sentence.
fn split_after_terminators(text: &str) -> Vec<&str> {
    const TERMINATORS: [char; 6] = ['.', '!', '?', '。', '！', '？'];
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut prev_was_terminator = false;
    for (idx, ch) in text.char_indices() {
        if prev_was_terminator && ch.is_whitespace() {
            pieces.push(text[start..idx].trim());
            start = idx;
        }
        prev_was_terminator = TERMINATORS.contains(&ch);
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        pieces.push(tail);
    }
    pieces
}
