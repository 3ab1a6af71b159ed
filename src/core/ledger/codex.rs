use chrono::{Local, NaiveDate};
use serde::Deserialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::core::models::snapshot::LedgerTotals;

// ── Session event shape ───────────────────────────────────────────────

#[derive(Deserialize)]
struct EventLine {
    #[serde(rename = "type")]
    line_type: Option<String>,
    payload: Option<EventPayload>,
}

#[derive(Deserialize)]
struct EventPayload {
    #[serde(rename = "type")]
    payload_type: Option<String>,
    info: Option<TokenInfo>,
}

#[derive(Deserialize)]
struct TokenInfo {
    total_token_usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct TokenUsage {
    output_tokens: Option<u64>,
}

fn sessions_dir() -> PathBuf {
    std::env::var("CODEX_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(".codex")
        })
        .join("sessions")
}

/// Scan Codex session logs under `sessions/YYYY/MM/DD/` for token totals.
/// No cost estimate exists for this provider; cost fields stay zero.
pub fn scan() -> LedgerTotals {
    scan_at(&sessions_dir(), Local::now().date_naive())
}

fn scan_at(root: &Path, today: NaiveDate) -> LedgerTotals {
    let mut totals = LedgerTotals::default();
    let cutoff = today - chrono::Duration::days(30);

    for (day_dir, day) in date_partitions(root) {
        if day < cutoff {
            continue;
        }
        let entries = match std::fs::read_dir(&day_dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let session_tokens = last_session_tokens(&path);
            if day == today {
                totals.today_tokens += session_tokens;
            }
            totals.thirty_day_tokens += session_tokens;
        }
    }

    totals
}

/// Walk `root/YYYY/MM/DD` keeping only all-numeric directory names that
/// form a valid calendar date.
fn date_partitions(root: &Path) -> Vec<(PathBuf, NaiveDate)> {
    let mut partitions = Vec::new();
    for year_dir in numeric_subdirs(root) {
        for month_dir in numeric_subdirs(&year_dir.0) {
            for day_dir in numeric_subdirs(&month_dir.0) {
                if let Some(date) =
                    NaiveDate::from_ymd_opt(year_dir.1 as i32, month_dir.1, day_dir.1)
                {
                    partitions.push((day_dir.0, date));
                }
            }
        }
    }
    partitions
}

fn numeric_subdirs(dir: &Path) -> Vec<(PathBuf, u32)> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };
    entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if !path.is_dir() {
                return None;
            }
            let n = path.file_name()?.to_str()?.parse::<u32>().ok()?;
            Some((path, n))
        })
        .collect()
}

/// Output tokens from the **last** `token_count` event in a session file.
///
/// `total_token_usage` is a cumulative counter, so the final occurrence is
/// the session's total; earlier occurrences must not be summed.
fn last_session_tokens(path: &Path) -> u64 {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return 0,
    };
    let reader = std::io::BufReader::new(file);

    let mut last_output = 0u64;
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let parsed: EventLine = match serde_json::from_str(&line) {
            Ok(p) => p,
            Err(_) => continue,
        };
        if parsed.line_type.as_deref() != Some("event_msg") {
            continue;
        }
        let payload = match parsed.payload {
            Some(p) => p,
            None => continue,
        };
        if payload.payload_type.as_deref() != Some("token_count") {
            continue;
        }
        last_output = payload
            .info
            .and_then(|i| i.total_token_usage)
            .and_then(|u| u.output_tokens)
            .unwrap_or(0);
    }
    last_output
}
