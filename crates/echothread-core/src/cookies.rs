// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Netscape cookie jar validation and filtering.
//!
//! The core never interprets cookie contents beyond this minimal upload-time
//! validation; the blob is handed opaquely to the media source.

use crate::error::EchoError;

/// Domains worth keeping when filtering an uploaded jar down to what the
/// media source needs.
const KEPT_DOMAINS: [&str; 5] = [
    "youtube.com",
    "googlevideo.com",
    "google.com",
    "googleapis.com",
    "gstatic.com",
];

/// Validates that `content` is a usable Netscape-format cookie jar:
/// the header line is present, rows are tab-separated with at least seven
/// fields, and at least one entry covers `.youtube.com`.
pub fn validate_cookie_jar(content: &str) -> Result<(), EchoError> {
    let lines: Vec<&str> = content.lines().collect();

    let has_header = lines
        .iter()
        .take(5)
        .any(|l| l.contains("Netscape HTTP Cookie File"));
    if !has_header {
        return Err(EchoError::Command(
            "that file does not look like a cookies.txt export (missing Netscape header)".into(),
        ));
    }

    let mut youtube_entries = 0usize;
    let mut valid_entries = 0usize;
    for line in &lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() >= 7 && !parts[0].is_empty() && !parts[5].is_empty() {
            valid_entries += 1;
            if parts[0].contains("youtube.com") {
                youtube_entries += 1;
            }
        }
    }

    if valid_entries == 0 {
        return Err(EchoError::Command(
            "cookies.txt contains no valid cookie rows".into(),
        ));
    }
    if youtube_entries == 0 {
        return Err(EchoError::Command(
            "cookies.txt has no .youtube.com entries; export cookies while logged into YouTube"
                .into(),
        ));
    }
    Ok(())
}

/// Returns only the header comments and the rows for YouTube/Google domains.
pub fn filter_youtube_cookies(content: &str) -> String {
    let mut kept = Vec::new();
    for line in content.lines() {
        if line.starts_with('#') {
            kept.push(line);
            continue;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parts: Vec<&str> = trimmed.split('\t').collect();
        if parts.len() >= 7 {
            let domain = parts[0];
            if KEPT_DOMAINS.iter().any(|d| domain.contains(d)) {
                kept.push(line);
            }
        }
    }
    kept.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_JAR: &str = "# Netscape HTTP Cookie File\n\
# This is a generated file! Do not edit.\n\
.youtube.com\tTRUE\t/\tTRUE\t1999999999\tSID\tabc123\n\
.google.com\tTRUE\t/\tTRUE\t1999999999\tNID\tdef456\n\
.example.com\tTRUE\t/\tFALSE\t1999999999\ttracker\tnope\n";

    #[test]
    fn valid_jar_passes() {
        assert!(validate_cookie_jar(VALID_JAR).is_ok());
    }

    #[test]
    fn missing_header_fails() {
        let jar = ".youtube.com\tTRUE\t/\tTRUE\t1999999999\tSID\tabc123\n";
        let err = validate_cookie_jar(jar).unwrap_err();
        assert!(err.to_string().contains("Netscape header"));
    }

    #[test]
    fn no_youtube_entries_fails() {
        let jar = "# Netscape HTTP Cookie File\n\
.example.com\tTRUE\t/\tFALSE\t1999999999\tname\tvalue\n";
        let err = validate_cookie_jar(jar).unwrap_err();
        assert!(err.to_string().contains("youtube.com"));
    }

    #[test]
    fn empty_jar_fails() {
        let jar = "# Netscape HTTP Cookie File\n\n";
        assert!(validate_cookie_jar(jar).is_err());
    }

    #[test]
    fn filter_keeps_google_domains_and_comments() {
        let filtered = filter_youtube_cookies(VALID_JAR);
        assert!(filtered.contains(".youtube.com"));
        assert!(filtered.contains(".google.com"));
        assert!(!filtered.contains(".example.com"));
        assert!(filtered.starts_with("# Netscape HTTP Cookie File"));
    }
}
