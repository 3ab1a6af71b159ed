use chrono::{DateTime, Utc};

/// Returns "{used}% used", rounded to nearest integer. Values past 100
/// are shown as reported.
pub fn format_used_percent(used_percent: f64) -> String {
    format!("{}% used", used_percent.max(0.0).round() as u64)
}

/// Returns "Resets in Xh Ym" relative to now. If past, returns "Resets now".
/// If more than 24 hours away, includes days.
pub fn format_reset_countdown(resets_at: &DateTime<Utc>) -> String {
    format_reset_countdown_at(resets_at, Utc::now())
}

pub fn format_reset_countdown_at(resets_at: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = *resets_at - now;
    let total_seconds = duration.num_seconds();

    if total_seconds <= 0 {
        return "Resets now".to_string();
    }

    let total_minutes = total_seconds / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 24 {
        let days = hours / 24;
        let remaining_hours = hours % 24;
        if remaining_hours == 0 {
            format!("Resets in {}d", days)
        } else {
            format!("Resets in {}d {}h", days, remaining_hours)
        }
    } else if hours > 0 {
        format!("Resets in {}h {}m", hours, minutes)
    } else {
        format!("Resets in {}m", total_minutes.max(1))
    }
}

/// Returns "[████░░░░░░░░]" where █ = used portion, ░ = headroom.
/// Width is the number of block characters inside the brackets.
pub fn format_usage_bar(used_percent: f64, width: usize) -> String {
    let used_percent = used_percent.clamp(0.0, 100.0);
    let used_blocks = ((used_percent / 100.0) * width as f64).round() as usize;
    let remaining_blocks = width.saturating_sub(used_blocks);

    let filled: String = "█".repeat(used_blocks);
    let empty: String = "░".repeat(remaining_blocks);

    format!("[{}{}]", filled, empty)
}

/// Compact token counts: 950 -> "950", 12_300 -> "12.3K", 4_500_000 -> "4.5M".
pub fn format_tokens(tokens: u64) -> String {
    if tokens >= 1_000_000 {
        format!("{:.1}M", tokens as f64 / 1_000_000.0)
    } else if tokens >= 1_000 {
        format!("{:.1}K", tokens as f64 / 1_000.0)
    } else {
        tokens.to_string()
    }
}

/// Returns "$123.45".
pub fn format_dollars(amount: f64) -> String {
    format!("${:.2}", amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn format_used_percent_rounds() {
        assert_eq!(format_used_percent(28.4), "28% used");
        assert_eq!(format_used_percent(0.0), "0% used");
        assert_eq!(format_used_percent(100.0), "100% used");
        assert_eq!(format_used_percent(110.0), "110% used");
    }

    #[test]
    fn format_reset_countdown_past() {
        let now = Utc::now();
        let past = now - Duration::seconds(10);
        assert_eq!(format_reset_countdown_at(&past, now), "Resets now");
    }

    #[test]
    fn format_reset_countdown_minutes() {
        let now = Utc::now();
        let future = now + Duration::minutes(45);
        assert_eq!(format_reset_countdown_at(&future, now), "Resets in 45m");
    }

    #[test]
    fn format_reset_countdown_hours_and_minutes() {
        let now = Utc::now();
        let future = now + Duration::minutes(135);
        assert_eq!(format_reset_countdown_at(&future, now), "Resets in 2h 15m");
    }

    #[test]
    fn format_reset_countdown_days() {
        let now = Utc::now();
        let future = now + Duration::hours(25);
        assert_eq!(format_reset_countdown_at(&future, now), "Resets in 1d 1h");
        let even = now + Duration::hours(48);
        assert_eq!(format_reset_countdown_at(&even, now), "Resets in 2d");
    }

    #[test]
    fn format_usage_bar_width() {
        // 0% used — empty bar
        let bar = format_usage_bar(0.0, 12);
        assert_eq!(bar, "[░░░░░░░░░░░░]");

        // 100% used — full bar
        let bar = format_usage_bar(100.0, 12);
        assert_eq!(bar, "[████████████]");

        // 50% used — half full
        let bar = format_usage_bar(50.0, 12);
        assert_eq!(bar, "[██████░░░░░░]");

        // Values past 100 clamp to a full bar
        let bar = format_usage_bar(130.0, 12);
        assert_eq!(bar, "[████████████]");
    }

    #[test]
    fn format_tokens_scales() {
        assert_eq!(format_tokens(950), "950");
        assert_eq!(format_tokens(12_300), "12.3K");
        assert_eq!(format_tokens(4_500_000), "4.5M");
    }

    #[test]
    fn format_dollars_two_decimals() {
        assert_eq!(format_dollars(123.45), "$123.45");
        assert_eq!(format_dollars(0.0), "$0.00");
    }
}
