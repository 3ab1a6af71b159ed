use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::core::error::{AuthError, FetchError};
use crate::core::ledger;
use crate::core::models::snapshot::{LedgerTotals, ProviderSnapshot};
use crate::core::providers::{self, claude, codex, Provider};

pub type SnapshotMap = HashMap<Provider, ProviderSnapshot>;

/// Poll every enabled provider concurrently. A failure in one provider
/// never affects another; each ends as some snapshot, never a panic.
pub async fn poll_all(enabled: &[Provider], verbose: bool) -> SnapshotMap {
    let mut handles = Vec::with_capacity(enabled.len());
    for provider in enabled {
        let provider = *provider;
        handles.push((
            provider,
            tokio::spawn(async move { poll_one(provider, verbose).await }),
        ));
    }

    let mut snapshots = SnapshotMap::new();
    for (provider, handle) in handles {
        let snapshot = match handle.await {
            Ok(snap) => snap,
            Err(_) => ProviderSnapshot::connected_with_error(
                provider,
                None,
                "Failed to fetch usage data from API.",
                LedgerTotals::default(),
            ),
        };
        snapshots.insert(provider, snapshot);
    }
    snapshots
}

pub async fn poll_one(provider: Provider, verbose: bool) -> ProviderSnapshot {
    match provider {
        Provider::Claude => poll_claude(verbose).await,
        Provider::Codex => poll_codex(verbose).await,
    }
}

fn auth_snapshot(provider: Provider, err: AuthError) -> ProviderSnapshot {
    let message = match err {
        AuthError::NotAuthenticated(hint) => hint,
        AuthError::Expired => format!(
            "Token expired. Run '{}' to refresh.",
            provider.id()
        ),
    };
    ProviderSnapshot::not_authenticated(provider, message)
}

/// Final assembly once the fetch has settled. Pure so both outcomes can
/// be exercised directly.
fn finish_claude(
    plan: &str,
    fetched: Result<claude::ClaudeUsageResponse, FetchError>,
    ledger: LedgerTotals,
    now: DateTime<Utc>,
) -> ProviderSnapshot {
    match fetched {
        Ok(resp) => claude::build_snapshot(plan, &resp, ledger, now),
        Err(err) => ProviderSnapshot::connected_with_error(
            Provider::Claude,
            Some(plan.to_string()),
            err.message(),
            ledger,
        ),
    }
}

fn finish_codex(
    fetched: Result<codex::CodexUsageResponse, FetchError>,
    ledger: LedgerTotals,
    now: DateTime<Utc>,
) -> ProviderSnapshot {
    match fetched {
        Ok(resp) => codex::build_snapshot(&resp, ledger, now),
        Err(err) => {
            ProviderSnapshot::connected_with_error(Provider::Codex, None, err.message(), ledger)
        }
    }
}

// Each pipeline runs its steps one after another; concurrency lives only
// across providers in poll_all.

async fn poll_claude(verbose: bool) -> ProviderSnapshot {
    let creds = match claude::load_credentials() {
        Ok(c) => c,
        Err(err) => return auth_snapshot(Provider::Claude, err),
    };

    let fetched = claude::fetch_usage(&creds.access_token).await;
    if verbose {
        if let Err(err) = &fetched {
            eprintln!("claude: usage fetch failed: {}", err);
        }
    }
    let ledger = tokio::task::spawn_blocking(ledger::claude::scan)
        .await
        .unwrap_or_default();

    finish_claude(&creds.plan_name(), fetched, ledger, Utc::now())
}

async fn poll_codex(verbose: bool) -> ProviderSnapshot {
    let mut creds = match codex::load_credentials() {
        Ok(c) => c,
        Err(err) => return auth_snapshot(Provider::Codex, err),
    };

    // A failed refresh is not fatal; the stale token may still work.
    if creds.needs_refresh(Utc::now()) {
        match codex::refresh_credentials(&creds).await {
            Ok(updated) => creds = updated,
            Err(err) => {
                if verbose {
                    eprintln!("codex: token refresh failed, using stored token: {}", err);
                }
            }
        }
    }

    let base = codex::resolve_base_url();
    if let Err(err) = providers::validate_endpoint(&base, Provider::Codex.display_name()) {
        return ProviderSnapshot::connected_with_error(
            Provider::Codex,
            None,
            err.to_string(),
            LedgerTotals::default(),
        );
    }
    let url = codex::usage_url(&base);

    let fetched = codex::fetch_usage(&url, &creds.access_token, creds.account_id.as_deref()).await;
    if verbose {
        if let Err(err) = &fetched {
            eprintln!("codex: usage fetch failed: {}", err);
        }
    }
    let ledger = tokio::task::spawn_blocking(ledger::codex::scan)
        .await
        .unwrap_or_default();

    finish_codex(fetched, ledger, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::snapshot::Connectivity;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_770_000_000, 0).unwrap()
    }

    #[test]
    fn expired_claude_token_has_refresh_hint() {
        let snap = auth_snapshot(Provider::Claude, AuthError::Expired);
        assert_eq!(snap.connectivity, Connectivity::NotAuthenticated);
        assert_eq!(
            snap.error_message.as_deref(),
            Some("Token expired. Run 'claude' to refresh.")
        );
    }

    #[test]
    fn missing_credentials_keep_provider_hint() {
        let snap = auth_snapshot(
            Provider::Codex,
            AuthError::NotAuthenticated(Provider::Codex.auth_hint().to_string()),
        );
        assert_eq!(
            snap.error_message.as_deref(),
            Some("Not logged in. Run 'codex' to authenticate.")
        );
    }

    // One provider's fetch failing must not disturb the other's snapshot,
    // and the failing provider still keeps its local ledger totals.
    #[test]
    fn fetch_error_in_one_pipeline_leaves_the_other_intact() {
        let json = r#"{
            "five_hour": { "utilization": 28.0, "resets_at": "2026-08-29T19:15:00Z" },
            "seven_day": { "utilization": 59.0, "resets_at": "2026-09-02T17:00:00Z" }
        }"#;
        let resp: claude::ClaudeUsageResponse = serde_json::from_str(json).unwrap();
        let ok = finish_claude("Pro", Ok(resp), LedgerTotals::default(), now());

        let failed = finish_codex(
            Err(FetchError::Status(500)),
            LedgerTotals {
                thirty_day_tokens: 900,
                ..Default::default()
            },
            now(),
        );

        let mut map = SnapshotMap::new();
        map.insert(Provider::Claude, ok);
        map.insert(Provider::Codex, failed);

        let claude_snap = &map[&Provider::Claude];
        assert_eq!(claude_snap.connectivity, Connectivity::Connected);
        assert_eq!(claude_snap.plan.as_deref(), Some("Pro"));
        assert!((claude_snap.aggregate.as_ref().unwrap().used_percent - 59.0).abs() < 1e-10);

        let codex_snap = &map[&Provider::Codex];
        assert_eq!(codex_snap.connectivity, Connectivity::ConnectedWithError);
        assert_eq!(codex_snap.error_message.as_deref(), Some("API error: 500"));
        assert_eq!(codex_snap.ledger.thirty_day_tokens, 900);
    }

    #[test]
    fn claude_fetch_error_keeps_plan_and_ledger() {
        let snap = finish_claude(
            "Max",
            Err(FetchError::Status(401)),
            LedgerTotals {
                today_tokens: 50,
                ..Default::default()
            },
            now(),
        );
        assert_eq!(snap.connectivity, Connectivity::ConnectedWithError);
        assert_eq!(snap.plan.as_deref(), Some("Max"));
        assert_eq!(snap.error_message.as_deref(), Some("API error: 401"));
        assert_eq!(snap.ledger.today_tokens, 50);
    }
}
