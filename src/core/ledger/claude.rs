use chrono::{DateTime, Local, NaiveDate};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::core::ledger::pricing;
use crate::core::models::snapshot::LedgerTotals;

/// Flat placeholder rate for today's cost estimate, dollars per 1M tokens.
/// Deliberately rougher than the 30-day per-model roll-up.
const TODAY_FLAT_RATE: f64 = 5.0;

// ── Session JSONL shape ───────────────────────────────────────────────

#[derive(Deserialize)]
struct SessionLine {
    message: Option<SessionMessage>,
}

#[derive(Deserialize)]
struct SessionMessage {
    usage: Option<SessionUsage>,
}

#[derive(Deserialize)]
struct SessionUsage {
    output_tokens: Option<u64>,
}

// ── stats-cache.json shape ────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct StatsCache {
    #[serde(rename = "modelUsage", default)]
    model_usage: HashMap<String, ModelTokens>,
    #[serde(rename = "totalMessages", default)]
    total_messages: u64,
    #[serde(rename = "totalSessions", default)]
    total_sessions: u64,
}

#[derive(Deserialize, Default)]
struct ModelTokens {
    #[serde(rename = "inputTokens", default)]
    input_tokens: u64,
    #[serde(rename = "outputTokens", default)]
    output_tokens: u64,
    #[serde(rename = "cacheReadInputTokens", default)]
    cache_read_tokens: u64,
    #[serde(rename = "cacheCreationInputTokens", default)]
    cache_write_tokens: u64,
}

fn claude_dir() -> PathBuf {
    std::env::var("CLAUDE_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(".claude")
        })
}

/// Scan Claude session logs and the stats cache for token/cost totals.
/// Never fails: missing directories yield zeros, bad files are skipped.
pub fn scan() -> LedgerTotals {
    let dir = claude_dir();
    scan_at(
        &dir.join("projects"),
        &dir.join("stats-cache.json"),
        Local::now().date_naive(),
    )
}

fn scan_at(projects_dir: &Path, stats_file: &Path, today: NaiveDate) -> LedgerTotals {
    let mut totals = LedgerTotals::default();

    let mut files: Vec<PathBuf> = Vec::new();
    collect_jsonl_recursive(projects_dir, &mut files);

    let dated: Vec<(PathBuf, NaiveDate)> = files
        .into_iter()
        .filter_map(|path| file_day(&path).map(|day| (path, day)))
        .collect();
    let (today_tokens, thirty_day_tokens) = tally_sessions(&dated, today);
    totals.today_tokens = today_tokens;
    totals.thirty_day_tokens = thirty_day_tokens;

    apply_stats_cache(&mut totals, stats_file);
    totals.today_cost = totals.today_tokens as f64 / 1_000_000.0 * TODAY_FLAT_RATE;

    totals
}

/// Sum output tokens per session file, bucketed by the file's calendar day.
/// Files dated before the 30-day cutoff are not read at all.
fn tally_sessions(files: &[(PathBuf, NaiveDate)], today: NaiveDate) -> (u64, u64) {
    let cutoff = today - chrono::Duration::days(30);

    let mut today_tokens = 0u64;
    let mut thirty_day_tokens = 0u64;
    for (path, day) in files {
        if *day < cutoff {
            continue;
        }
        let session_output = session_output_tokens(path);
        if *day == today {
            today_tokens += session_output;
        }
        thirty_day_tokens += session_output;
    }
    (today_tokens, thirty_day_tokens)
}

/// Sum `message.usage.output_tokens` over a session file, skipping
/// malformed lines and lines without usage data.
fn session_output_tokens(path: &Path) -> u64 {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return 0,
    };
    let reader = std::io::BufReader::new(file);

    let mut total = 0u64;
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let parsed: SessionLine = match serde_json::from_str(&line) {
            Ok(p) => p,
            Err(_) => continue,
        };
        if let Some(tokens) = parsed
            .message
            .and_then(|m| m.usage)
            .and_then(|u| u.output_tokens)
        {
            total += tokens;
        }
    }
    total
}

/// 30-day cost from the per-model cumulative counters, plus raw message
/// and session counts. Leaves totals untouched when the file is absent
/// or unreadable.
fn apply_stats_cache(totals: &mut LedgerTotals, stats_file: &Path) {
    let content = match std::fs::read_to_string(stats_file) {
        Ok(c) => c,
        Err(_) => return,
    };
    let stats: StatsCache = match serde_json::from_str(&content) {
        Ok(s) => s,
        Err(_) => return,
    };

    let mut total_cost = 0.0;
    for (model_id, usage) in &stats.model_usage {
        let rates = pricing::lookup(model_id);
        total_cost += pricing::cost_for(
            rates,
            usage.input_tokens,
            usage.output_tokens,
            usage.cache_read_tokens,
            usage.cache_write_tokens,
        );
    }

    totals.thirty_day_cost = total_cost;
    totals.total_messages = stats.total_messages;
    totals.total_sessions = stats.total_sessions;
}

/// Recursively collect *.jsonl files at any depth; session logs can sit
/// arbitrarily deep under a project directory.
fn collect_jsonl_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            files.push(path);
        } else if path.is_dir() {
            collect_jsonl_recursive(&path, files);
        }
    }
}

/// Local calendar day of a file's mtime; decides which day a session
/// counts toward.
fn file_day(path: &Path) -> Option<NaiveDate> {
    let mtime = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let local: DateTime<Local> = mtime.into();
    Some(local.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn write_session(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn session_output_tokens_sums_lines() {
        let dir = std::env::temp_dir().join("pacebar_test_claude_sum");
        let _ = std::fs::create_dir_all(&dir);
        let path = write_session(
            &dir,
            "a.jsonl",
            &[
                r#"{"message":{"usage":{"output_tokens":100}}}"#,
                r#"{"message":{"usage":{"output_tokens":250}}}"#,
                r#"{"type":"user","message":{"content":"hi"}}"#,
            ],
        );
        assert_eq!(session_output_tokens(&path), 350);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_line_is_skipped() {
        let dir = std::env::temp_dir().join("pacebar_test_claude_malformed");
        let _ = std::fs::create_dir_all(&dir);
        let path = write_session(
            &dir,
            "a.jsonl",
            &[
                r#"{"message":{"usage":{"output_tokens":100}}}"#,
                "{not json at all",
                r#"{"message":{"usage":{"output_tokens":50}}}"#,
            ],
        );
        assert_eq!(session_output_tokens(&path), 150);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn tally_buckets_by_day_with_cutoff() {
        let dir = std::env::temp_dir().join("pacebar_test_claude_tally");
        let _ = std::fs::create_dir_all(&dir);
        let today = day(2026, 8, 29);
        let a = write_session(&dir, "a.jsonl", &[r#"{"message":{"usage":{"output_tokens":100}}}"#]);
        let b = write_session(&dir, "b.jsonl", &[r#"{"message":{"usage":{"output_tokens":200}}}"#]);
        let c = write_session(&dir, "c.jsonl", &[r#"{"message":{"usage":{"output_tokens":300}}}"#]);

        let dated = vec![
            (a, today),
            (b, today - chrono::Duration::days(10)),
            (c, today - chrono::Duration::days(40)),
        ];
        let (today_tokens, thirty_day_tokens) = tally_sessions(&dated, today);
        assert_eq!(today_tokens, 100);
        assert_eq!(thirty_day_tokens, 300);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_roots_yield_zero_totals() {
        let dir = std::env::temp_dir().join("pacebar_test_claude_missing");
        let _ = std::fs::remove_dir_all(&dir);
        let totals = scan_at(
            &dir.join("projects"),
            &dir.join("stats-cache.json"),
            day(2026, 8, 29),
        );
        assert_eq!(totals.today_tokens, 0);
        assert_eq!(totals.thirty_day_tokens, 0);
        assert_eq!(totals.today_cost, 0.0);
        assert_eq!(totals.thirty_day_cost, 0.0);
    }

    #[test]
    fn stats_cache_costs_with_default_row_fallback() {
        let dir = std::env::temp_dir().join("pacebar_test_claude_stats");
        let _ = std::fs::create_dir_all(&dir);
        let stats_path = dir.join("stats-cache.json");
        // Unlisted model id -> default rates: 2*3 + 1*15 + 0.5*0.3 + 0.1*3.75
        std::fs::write(
            &stats_path,
            r#"{
                "modelUsage": {
                    "claude-mystery-1-0": {
                        "inputTokens": 2000000,
                        "outputTokens": 1000000,
                        "cacheReadInputTokens": 500000,
                        "cacheCreationInputTokens": 100000
                    }
                },
                "totalMessages": 42,
                "totalSessions": 7
            }"#,
        )
        .unwrap();

        let mut totals = LedgerTotals::default();
        apply_stats_cache(&mut totals, &stats_path);
        assert!((totals.thirty_day_cost - 21.525).abs() < 1e-9);
        assert_eq!(totals.total_messages, 42);
        assert_eq!(totals.total_sessions, 7);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn today_cost_uses_flat_rate() {
        let dir = std::env::temp_dir().join("pacebar_test_claude_flat");
        let _ = std::fs::create_dir_all(&dir);
        let projects = dir.join("projects");
        std::fs::create_dir_all(&projects).unwrap();
        // File created now -> mtime is today.
        write_session(
            &projects,
            "today.jsonl",
            &[r#"{"message":{"usage":{"output_tokens":2000000}}}"#],
        );

        let totals = scan_at(
            &projects,
            &dir.join("stats-cache.json"),
            Local::now().date_naive(),
        );
        assert_eq!(totals.today_tokens, 2_000_000);
        assert!((totals.today_cost - 10.0).abs() < 1e-9);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn collect_finds_nested_jsonl() {
        let dir = std::env::temp_dir().join("pacebar_test_claude_collect");
        let _ = std::fs::remove_dir_all(&dir);
        let nested = dir.join("proj-a").join("session-1").join("subagents");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::File::create(dir.join("proj-a").join("main.jsonl")).unwrap();
        std::fs::File::create(nested.join("sub.jsonl")).unwrap();
        std::fs::File::create(dir.join("proj-a").join("notes.md")).unwrap();

        let mut files = Vec::new();
        collect_jsonl_recursive(&dir, &mut files);
        assert_eq!(files.len(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn collect_has_no_depth_limit() {
        let dir = std::env::temp_dir().join("pacebar_test_claude_deep");
        let _ = std::fs::remove_dir_all(&dir);
        let mut deep = dir.clone();
        for level in 0..9 {
            deep = deep.join(format!("level-{}", level));
        }
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::File::create(deep.join("deep.jsonl")).unwrap();

        let mut files = Vec::new();
        collect_jsonl_recursive(&dir, &mut files);
        assert_eq!(files.len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
