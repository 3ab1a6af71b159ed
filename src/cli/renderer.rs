use colored::{control, ColoredString, Colorize};

use crate::core::formatter::{
    format_dollars, format_reset_countdown, format_tokens, format_usage_bar, format_used_percent,
};
use crate::core::models::snapshot::{Connectivity, ProviderSnapshot, UsageWindow};
use crate::core::pace::PaceClass;

const BAR_WIDTH: usize = 12;

/// Render a full provider block as a colored (or plain) string.
///
/// Layout:
/// ```text
///  Claude (Pro)
///   Session   28% used [███░░░░░░░░░]
///             Resets in 2h 15m
///   Weekly    59% used [███████░░░░░]
///             Resets in 3d 21h
///   Pace      Ahead (+5%)
///   Sonnet    12% used
///   Extra     $12.34 / $50.00
///   Tokens    12.3K today, 4.5M (30d)
///   Cost      $3.21 today, $45.67 (30d)
/// ```
pub fn render_provider(snapshot: &ProviderSnapshot, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines: Vec<String> = Vec::new();

    // Header: " Claude (Pro)"
    let header = match &snapshot.plan {
        Some(plan) => format!(" {} ({})", snapshot.display_name, plan),
        None => format!(" {}", snapshot.display_name),
    };
    lines.push(header.bold().to_string());

    if snapshot.connectivity == Connectivity::NotAuthenticated {
        let message = snapshot.error_message.as_deref().unwrap_or("Not logged in.");
        lines.push(format!("  {}", message.red()));
        return lines.join("\n");
    }

    if let Some(message) = &snapshot.error_message {
        lines.push(format!("  {}     {}", "Error".cyan(), message.red()));
    }

    if let Some(session) = &snapshot.session {
        render_window(&mut lines, "Session", session);
    }
    if let Some(aggregate) = &snapshot.aggregate {
        render_window(&mut lines, "Weekly", aggregate);
    }

    if let Some(pace) = &snapshot.pace {
        let status = pace.status_line();
        let colored_status: ColoredString = match pace.class {
            PaceClass::Behind => status.green(),
            PaceClass::OnTrack => status.normal(),
            PaceClass::Ahead => status.yellow(),
        };
        lines.push(format!("  {}      {}", "Pace".cyan(), colored_status));
    }

    for (model, used_percent) in &snapshot.model_usage {
        let percent_str = format_used_percent(*used_percent);
        lines.push(format!(
            "  {}  {}",
            format!("{:<7}", model).cyan(),
            color_by_headroom(*used_percent, &percent_str)
        ));
    }

    if let Some(extra) = &snapshot.extra_usage {
        let extra_str = match extra.limit {
            Some(limit) => format!("{} / {}", format_dollars(extra.used), format_dollars(limit)),
            None => format_dollars(extra.used),
        };
        lines.push(format!("  {}     {}", "Extra".cyan(), extra_str));
    }

    let ledger = &snapshot.ledger;
    if ledger.today_tokens > 0 || ledger.thirty_day_tokens > 0 {
        lines.push(format!(
            "  {}    {} today, {} (30d)",
            "Tokens".cyan(),
            format_tokens(ledger.today_tokens),
            format_tokens(ledger.thirty_day_tokens)
        ));
    }
    if ledger.today_cost > 0.0 || ledger.thirty_day_cost > 0.0 {
        lines.push(format!(
            "  {}      {} today, {} (30d)",
            "Cost".cyan(),
            format_dollars(ledger.today_cost),
            format_dollars(ledger.thirty_day_cost)
        ));
    }
    if ledger.total_sessions > 0 || ledger.total_messages > 0 {
        lines.push(format!(
            "  {}  {} sessions, {} messages",
            "History".cyan(),
            ledger.total_sessions,
            format_tokens(ledger.total_messages)
        ));
    }

    lines.join("\n")
}

fn render_window(lines: &mut Vec<String>, label: &str, window: &UsageWindow) {
    let percent_str = format_used_percent(window.used_percent);
    let bar_str = format_usage_bar(window.used_percent, BAR_WIDTH);

    let colored_percent = color_by_headroom(window.used_percent, &percent_str);
    let colored_bar = bar_str.magenta();

    lines.push(format!(
        "  {}  {} {}",
        format!("{:<7}", label).cyan(),
        colored_percent,
        colored_bar
    ));

    if let Some(resets_at) = &window.resets_at {
        // 12 spaces to align under the percent/bar values
        lines.push(format!(
            "            {}",
            format_reset_countdown(resets_at).dimmed()
        ));
    }
}

/// Color the percent string green/yellow/red by how much headroom is left.
fn color_by_headroom(used_percent: f64, text: &str) -> ColoredString {
    let remaining = 100.0 - used_percent;
    if remaining >= 25.0 {
        text.green()
    } else if remaining >= 10.0 {
        text.yellow()
    } else {
        text.red()
    }
}
