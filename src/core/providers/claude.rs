use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::{AuthError, FetchError};
use crate::core::models::snapshot::{
    Connectivity, ExtraUsage, LedgerTotals, ProviderSnapshot, UsageWindow,
};
use crate::core::pace;
use crate::core::providers::Provider;

const USAGE_URL: &str = "https://api.anthropic.com/api/oauth/usage";
const BETA_HEADER: &str = "oauth-2025-04-20";
const USER_AGENT: &str = concat!("pacebar/", env!("CARGO_PKG_VERSION"));

// ── Credentials ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CredentialsFile {
    #[serde(rename = "claudeAiOauth")]
    claude_ai_oauth: Option<OAuthEntry>,
}

#[derive(Deserialize)]
struct OAuthEntry {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
    /// Epoch milliseconds.
    #[serde(rename = "expiresAt")]
    expires_at: Option<i64>,
    #[serde(rename = "subscriptionType")]
    subscription_type: Option<String>,
    #[serde(rename = "rateLimitTier")]
    rate_limit_tier: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClaudeCredentials {
    pub access_token: String,
    subscription_type: String,
    rate_limit_tier: String,
}

impl ClaudeCredentials {
    /// Display plan derived from the subscription fields on disk.
    pub fn plan_name(&self) -> String {
        let sub = self.subscription_type.to_lowercase();
        let tier = self.rate_limit_tier.to_lowercase();
        if tier.contains("max") || sub.contains("max") {
            "Max".to_string()
        } else if sub.contains("pro") {
            "Pro".to_string()
        } else if sub.contains("team") {
            "Team".to_string()
        } else {
            title_case(&self.subscription_type)
        }
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn credentials_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("~"))
        .join(".claude")
        .join(".credentials.json")
}

/// Read Claude OAuth credentials from ~/.claude/.credentials.json.
pub fn load_credentials() -> Result<ClaudeCredentials, AuthError> {
    let path = credentials_path();
    let content = std::fs::read_to_string(&path).map_err(|_| {
        AuthError::NotAuthenticated(Provider::Claude.auth_hint().to_string())
    })?;
    parse_credentials(&content, Utc::now())
}

fn parse_credentials(content: &str, now: DateTime<Utc>) -> Result<ClaudeCredentials, AuthError> {
    let file: CredentialsFile = serde_json::from_str(content)
        .map_err(|_| AuthError::NotAuthenticated("Failed to read credentials.".to_string()))?;
    let oauth = file.claude_ai_oauth.ok_or_else(|| {
        AuthError::NotAuthenticated(Provider::Claude.auth_hint().to_string())
    })?;

    let token = oauth.access_token.unwrap_or_default();
    if token.is_empty() {
        return Err(AuthError::NotAuthenticated(
            "No access token. Run 'claude' to authenticate.".to_string(),
        ));
    }

    if let Some(expires_at) = oauth.expires_at {
        if expires_at != 0 && now.timestamp_millis() > expires_at {
            return Err(AuthError::Expired);
        }
    }

    Ok(ClaudeCredentials {
        access_token: token,
        subscription_type: oauth.subscription_type.unwrap_or_else(|| "free".to_string()),
        rate_limit_tier: oauth.rate_limit_tier.unwrap_or_default(),
    })
}

// ── Usage response ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct WindowRaw {
    utilization: Option<f64>,
    resets_at: Option<String>,
}

#[derive(Deserialize)]
pub struct ExtraUsageRaw {
    is_enabled: Option<bool>,
    /// Cents.
    used_credits: Option<f64>,
    /// Cents.
    monthly_limit: Option<f64>,
    utilization: Option<f64>,
}

#[derive(Deserialize, Default)]
pub struct ClaudeUsageResponse {
    five_hour: Option<WindowRaw>,
    seven_day: Option<WindowRaw>,
    seven_day_sonnet: Option<WindowRaw>,
    seven_day_opus: Option<WindowRaw>,
    extra_usage: Option<ExtraUsageRaw>,
}

fn parse_window(raw: &WindowRaw) -> UsageWindow {
    let resets_at = raw
        .resets_at
        .as_deref()
        .and_then(|s| s.parse::<DateTime<Utc>>().ok());
    UsageWindow {
        used_percent: raw.utilization.unwrap_or(0.0),
        resets_at,
    }
}

fn parse_extra_usage(raw: &ExtraUsageRaw) -> Option<ExtraUsage> {
    if raw.is_enabled != Some(true) {
        return None;
    }
    // Values from the API are in cents — convert to dollars.
    Some(ExtraUsage {
        enabled: true,
        used: raw.used_credits.unwrap_or(0.0) / 100.0,
        limit: Some(raw.monthly_limit.unwrap_or(0.0) / 100.0),
        used_percent: raw.utilization.unwrap_or(0.0),
    })
}

/// Fetch usage from the Claude OAuth API. Only a 200 with a valid JSON
/// body succeeds; any other status keeps its code for diagnostics.
pub async fn fetch_usage(access_token: &str) -> Result<ClaudeUsageResponse, FetchError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let response = client
        .get(USAGE_URL)
        .header("Authorization", format!("Bearer {}", access_token))
        .header("anthropic-beta", BETA_HEADER)
        .header("Accept", "application/json")
        .header("Content-Type", "application/json")
        .header("User-Agent", USER_AGENT)
        .send()
        .await?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(FetchError::Status(status.as_u16()));
    }
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

/// Assemble the fully-connected snapshot from a successful fetch.
pub fn build_snapshot(
    plan: &str,
    resp: &ClaudeUsageResponse,
    ledger: LedgerTotals,
    now: DateTime<Utc>,
) -> ProviderSnapshot {
    let session = resp.five_hour.as_ref().map(parse_window);
    let aggregate = resp.seven_day.as_ref().map(parse_window);

    let mut model_usage = std::collections::BTreeMap::new();
    if let Some(sonnet) = resp.seven_day_sonnet.as_ref().and_then(|w| w.utilization) {
        model_usage.insert("Sonnet".to_string(), sonnet);
    }
    if let Some(opus) = resp.seven_day_opus.as_ref().and_then(|w| w.utilization) {
        model_usage.insert("Opus".to_string(), opus);
    }

    let extra_usage = resp.extra_usage.as_ref().and_then(parse_extra_usage);

    // Claude's aggregate window is a fixed 7 days.
    let pace_result = aggregate.as_ref().and_then(|w| {
        pace::compute_pace_at(w.used_percent, w.resets_at, pace::default_window(), now)
    });

    ProviderSnapshot {
        provider: Provider::Claude,
        display_name: Provider::Claude.display_name().to_string(),
        connectivity: Connectivity::Connected,
        error_message: None,
        plan: Some(plan.to_string()),
        session,
        aggregate,
        model_usage,
        extra_usage,
        pace: pace_result,
        ledger,
    }
}
