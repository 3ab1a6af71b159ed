use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaceClass {
    Behind,
    OnTrack,
    Ahead,
}

/// Actual consumption compared against linear-time expectation within a window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaceResult {
    /// Positive = ahead of pace, negative = behind, zero = on track.
    pub delta_percent: f64,
    pub class: PaceClass,
}

impl PaceResult {
    /// "Behind (-12%)", "Ahead (+5%)" or "On track".
    pub fn status_line(&self) -> String {
        match self.class {
            PaceClass::Behind => format!("Behind ({:.0}%)", self.delta_percent),
            PaceClass::Ahead => format!("Ahead (+{:.0}%)", self.delta_percent),
            PaceClass::OnTrack => "On track".to_string(),
        }
    }
}

/// Default quota window when a provider doesn't report one.
pub fn default_window() -> Duration {
    Duration::days(7)
}

/// Compare `used_percent` against the share of `window` already elapsed.
///
/// Returns `None` when the provider reported no reset timestamp, since the
/// window position is unknowable then.
pub fn compute_pace_at(
    used_percent: f64,
    resets_at: Option<DateTime<Utc>>,
    window: Duration,
    now: DateTime<Utc>,
) -> Option<PaceResult> {
    let resets_at = resets_at?;
    let total_secs = window.num_seconds();
    if total_secs <= 0 {
        return None;
    }
    let window_start = resets_at - window;
    let elapsed_secs = (now - window_start).num_milliseconds() as f64 / 1000.0;
    let expected_percent = elapsed_secs / total_secs as f64 * 100.0;
    let delta = used_percent - expected_percent;

    let class = if delta < 0.0 {
        PaceClass::Behind
    } else if delta > 0.0 {
        PaceClass::Ahead
    } else {
        PaceClass::OnTrack
    };

    Some(PaceResult {
        delta_percent: delta,
        class,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn delta_is_used_minus_expected() {
        // Halfway through a 7-day window, 75% used -> +25 ahead.
        let window = Duration::days(7);
        let now = at(1_700_000_000);
        let resets = now + Duration::days(7) / 2;
        let pace = compute_pace_at(75.0, Some(resets), window, now).unwrap();
        assert!((pace.delta_percent - 25.0).abs() < 1e-9);
        assert_eq!(pace.class, PaceClass::Ahead);
    }

    #[test]
    fn behind_when_usage_trails_elapsed_time() {
        let window = Duration::days(7);
        let now = at(1_700_000_000);
        let resets = now + Duration::days(7) / 2; // 50% elapsed
        let pace = compute_pace_at(20.0, Some(resets), window, now).unwrap();
        assert!((pace.delta_percent + 30.0).abs() < 1e-9);
        assert_eq!(pace.class, PaceClass::Behind);
    }

    #[test]
    fn exact_zero_delta_is_on_track() {
        let window = Duration::days(7);
        let now = at(1_700_000_000);
        let resets = now + Duration::days(7) / 2;
        let pace = compute_pace_at(50.0, Some(resets), window, now).unwrap();
        assert_eq!(pace.delta_percent, 0.0);
        assert_eq!(pace.class, PaceClass::OnTrack);
    }

    #[test]
    fn missing_reset_is_unavailable() {
        assert!(compute_pace_at(50.0, None, Duration::days(7), at(0)).is_none());
    }

    #[test]
    fn zero_window_is_unavailable() {
        let now = at(1_700_000_000);
        assert!(compute_pace_at(50.0, Some(now), Duration::seconds(0), now).is_none());
    }

    #[test]
    fn short_provider_reported_window() {
        // 5-hour window, 4 hours elapsed -> expected 80%.
        let window = Duration::hours(5);
        let now = at(1_700_000_000);
        let resets = now + Duration::hours(1);
        let pace = compute_pace_at(90.0, Some(resets), window, now).unwrap();
        assert!((pace.delta_percent - 10.0).abs() < 1e-9);
        assert_eq!(pace.class, PaceClass::Ahead);
    }

    #[test]
    fn status_line_formats() {
        let behind = PaceResult {
            delta_percent: -12.4,
            class: PaceClass::Behind,
        };
        assert_eq!(behind.status_line(), "Behind (-12%)");

        let ahead = PaceResult {
            delta_percent: 5.2,
            class: PaceClass::Ahead,
        };
        assert_eq!(ahead.status_line(), "Ahead (+5%)");

        let on_track = PaceResult {
            delta_percent: 0.0,
            class: PaceClass::OnTrack,
        };
        assert_eq!(on_track.status_line(), "On track");
    }
}
