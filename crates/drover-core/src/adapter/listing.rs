//! Tolerant parsing of free-text session listings.
//!
//! Used when a backend has no structured session listing and the adapter
//! falls back to a generic `list` management command. Vendors print these
//! tables in wildly different shapes, so the parser only commits to: one
//! session per line, id first, timestamp wherever it finds one, whatever
//! is left over is the title.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::protocol::SessionSummary;

/// Parse free-text `list` output into session summaries.
///
/// Blank lines, separator rows, and obvious header rows are skipped. A
/// line that survives contributes its first token as the session id.
pub(crate) fn parse_session_list(stdout: &str) -> Vec<SessionSummary> {
    stdout.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<SessionSummary> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('-') || line.starts_with('=') {
        return None;
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let id = *tokens.first()?;
    if is_header_token(id) {
        return None;
    }

    let mut updated_at = None;
    let mut title_tokens = Vec::new();
    let mut rest = tokens[1..].iter().peekable();
    while let Some(token) = rest.next() {
        if updated_at.is_none() {
            if let Some(ts) = parse_timestamp(token) {
                updated_at = Some(ts);
                continue;
            }
            // A bare date followed by a bare time ("2026-08-01 14:02:11").
            if let Some(next) = rest.peek() {
                if let Some(ts) = parse_timestamp(&format!("{token} {next}")) {
                    updated_at = Some(ts);
                    rest.next();
                    continue;
                }
            }
        }
        title_tokens.push(*token);
    }

    let title = if title_tokens.is_empty() {
        None
    } else {
        Some(title_tokens.join(" "))
    };

    Some(SessionSummary {
        id: id.to_string(),
        title,
        updated_at,
    })
}

fn is_header_token(token: &str) -> bool {
    matches!(
        token.to_lowercase().as_str(),
        "id" | "session" | "sessions" | "name" | "uuid"
    )
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// De-duplicate by id (keeping the most recent) and sort newest-first.
///
/// Applied to both listing paths so structured and parsed results come out
/// in the same shape. Sessions without a timestamp sort last, then by id
/// for determinism.
pub(crate) fn dedupe_and_sort(sessions: Vec<SessionSummary>) -> Vec<SessionSummary> {
    let mut by_id: std::collections::HashMap<String, SessionSummary> = std::collections::HashMap::new();
    for session in sessions {
        match by_id.get(&session.id) {
            Some(existing) if existing.updated_at >= session.updated_at => {}
            _ => {
                by_id.insert(session.id.clone(), session);
            }
        }
    }
    let mut merged: Vec<SessionSummary> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}
