use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{AuthError, FetchError};
use crate::core::models::snapshot::{
    Connectivity, ExtraUsage, LedgerTotals, ProviderSnapshot, UsageWindow,
};
use crate::core::pace;
use crate::core::providers::Provider;

const TOKEN_URL: &str = "https://auth.openai.com/oauth/token";
const OAUTH_CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";
const DEFAULT_BASE_URL: &str = "https://chatgpt.com/backend-api";
/// Access tokens are rotated when the last refresh is older than this.
const REFRESH_AFTER_DAYS: i64 = 8;

// ── Credentials ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct AuthFile {
    #[serde(rename = "OPENAI_API_KEY")]
    openai_api_key: Option<String>,
    tokens: Option<TokenSet>,
    /// ISO-8601 timestamp written back after each refresh.
    last_refresh: Option<String>,
}

#[derive(Deserialize)]
struct TokenSet {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    account_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CodexCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub account_id: Option<String>,
    pub last_refresh: Option<DateTime<Utc>>,
    /// Plain API keys never refresh.
    pub from_api_key: bool,
}

impl CodexCredentials {
    /// A refresh is due when the rotation age is exceeded, or unknown.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.from_api_key || self.refresh_token.is_none() {
            return false;
        }
        match self.last_refresh {
            Some(at) => now - at > chrono::Duration::days(REFRESH_AFTER_DAYS),
            None => true,
        }
    }
}

pub fn codex_home() -> PathBuf {
    std::env::var("CODEX_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(".codex")
        })
}

fn auth_path() -> PathBuf {
    codex_home().join("auth.json")
}

/// Read Codex credentials from `$CODEX_HOME/auth.json`.
pub fn load_credentials() -> Result<CodexCredentials, AuthError> {
    let content = std::fs::read_to_string(auth_path()).map_err(|_| {
        AuthError::NotAuthenticated(Provider::Codex.auth_hint().to_string())
    })?;
    parse_credentials(&content)
}

fn parse_credentials(content: &str) -> Result<CodexCredentials, AuthError> {
    let file: AuthFile = serde_json::from_str(content)
        .map_err(|_| AuthError::NotAuthenticated("Failed to read credentials.".to_string()))?;

    // A plain API key takes precedence over the OAuth token set.
    if let Some(key) = file.openai_api_key.as_deref().map(str::trim) {
        if !key.is_empty() {
            return Ok(CodexCredentials {
                access_token: key.to_string(),
                refresh_token: None,
                account_id: None,
                last_refresh: None,
                from_api_key: true,
            });
        }
    }

    let tokens = file.tokens.ok_or_else(|| {
        AuthError::NotAuthenticated(Provider::Codex.auth_hint().to_string())
    })?;
    let access_token = tokens.access_token.unwrap_or_default();
    if access_token.is_empty() {
        return Err(AuthError::NotAuthenticated(
            "No access token. Run 'codex' to authenticate.".to_string(),
        ));
    }

    let account_id = tokens
        .account_id
        .filter(|id| !id.is_empty())
        .or_else(|| tokens.id_token.as_deref().and_then(account_id_from_jwt));

    let last_refresh = file
        .last_refresh
        .as_deref()
        .and_then(|s| s.parse::<DateTime<Utc>>().ok());

    Ok(CodexCredentials {
        access_token,
        refresh_token: tokens.refresh_token.filter(|t| !t.is_empty()),
        account_id,
        last_refresh,
        from_api_key: false,
    })
}

/// Pull the ChatGPT account id out of an id_token without verifying it;
/// the claim only routes the usage request, the server still authenticates.
fn account_id_from_jwt(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    claims
        .get("https://api.openai.com/auth")?
        .get("chatgpt_account_id")?
        .as_str()
        .map(str::to_string)
}

// ── Token refresh ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

/// Rotate the access token against the OAuth token endpoint and persist
/// the result. Returns the updated credentials.
pub async fn refresh_credentials(creds: &CodexCredentials) -> anyhow::Result<CodexCredentials> {
    use anyhow::Context;

    let refresh_token = creds
        .refresh_token
        .as_deref()
        .context("no refresh token available")?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let response = client
        .post(TOKEN_URL)
        .json(&serde_json::json!({
            "client_id": OAUTH_CLIENT_ID,
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
            "scope": "openid profile email",
        }))
        .send()
        .await
        .context("token refresh request failed")?;

    if !response.status().is_success() {
        anyhow::bail!("token refresh failed: HTTP {}", response.status().as_u16());
    }
    let refreshed: RefreshResponse = response
        .json()
        .await
        .context("invalid token refresh response")?;
    let access_token = refreshed
        .access_token
        .clone()
        .context("token refresh response had no access_token")?;

    let now = Utc::now();
    persist_refreshed(&auth_path(), &refreshed, now)?;

    Ok(CodexCredentials {
        access_token,
        refresh_token: refreshed.refresh_token.or_else(|| creds.refresh_token.clone()),
        account_id: refreshed
            .id_token
            .as_deref()
            .and_then(account_id_from_jwt)
            .or_else(|| creds.account_id.clone()),
        last_refresh: Some(now),
        from_api_key: false,
    })
}

/// Read-merge-write auth.json: only the token fields and `last_refresh`
/// change, every other key the CLI stored there is preserved.
fn persist_refreshed(
    path: &Path,
    refreshed: &RefreshResponse,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let mut root: serde_json::Value = match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({})),
        Err(_) => serde_json::json!({}),
    };

    let obj = root
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("auth file is not a JSON object"))?;
    let tokens = obj
        .entry("tokens")
        .or_insert_with(|| serde_json::json!({}));
    if let Some(tokens_obj) = tokens.as_object_mut() {
        if let Some(access) = &refreshed.access_token {
            tokens_obj.insert("access_token".to_string(), serde_json::json!(access));
        }
        if let Some(refresh) = &refreshed.refresh_token {
            tokens_obj.insert("refresh_token".to_string(), serde_json::json!(refresh));
        }
        if let Some(id) = &refreshed.id_token {
            tokens_obj.insert("id_token".to_string(), serde_json::json!(id));
        }
    }
    obj.insert(
        "last_refresh".to_string(),
        serde_json::json!(now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
    );

    std::fs::write(path, serde_json::to_string_pretty(&root)?)?;
    Ok(())
}

// ── Endpoint resolution ───────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct CodexConfig {
    chatgpt_base_url: Option<String>,
}

/// Base URL from `$CODEX_HOME/config.toml`, falling back to the default.
pub fn resolve_base_url() -> String {
    let content = std::fs::read_to_string(codex_home().join("config.toml")).unwrap_or_default();
    base_url_from_config(&content)
}

fn base_url_from_config(content: &str) -> String {
    let config: CodexConfig = toml::from_str(content).unwrap_or_default();
    let base = config
        .chatgpt_base_url
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    normalize_base_url(base.trim().trim_end_matches('/'))
}

/// The official hosts serve the usage API under `/backend-api`; append
/// it when a base on those hosts doesn't carry it yet. Other hosts pass
/// through untouched.
fn normalize_base_url(base: &str) -> String {
    let official = ["https://chatgpt.com", "https://chat.openai.com"]
        .iter()
        .any(|host| {
            base == *host || base.strip_prefix(host).is_some_and(|rest| rest.starts_with('/'))
        });
    if official && !base.contains("/backend-api") {
        format!("{}/backend-api", base)
    } else {
        base.to_string()
    }
}

/// Usage endpoint for a base URL. The backend-api tree uses a different
/// path than self-hosted proxies.
pub fn usage_url(base: &str) -> String {
    if base.contains("backend-api") {
        format!("{}/wham/usage", base)
    } else {
        format!("{}/api/codex/usage", base)
    }
}

// ── Usage response ────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct CodexUsageResponse {
    plan_type: Option<String>,
    rate_limit: Option<RateLimitRaw>,
    credits: Option<CreditsRaw>,
}

#[derive(Deserialize)]
struct RateLimitRaw {
    primary_window: Option<RateWindowRaw>,
    secondary_window: Option<RateWindowRaw>,
}

#[derive(Deserialize)]
struct RateWindowRaw {
    used_percent: Option<f64>,
    /// Epoch seconds.
    reset_at: Option<i64>,
    limit_window_seconds: Option<i64>,
}

#[derive(Deserialize)]
struct CreditsRaw {
    has_credits: Option<bool>,
    unlimited: Option<bool>,
    #[serde(default, deserialize_with = "de_balance")]
    balance: Option<f64>,
}

/// The API has sent `balance` both as a number and as a string.
fn de_balance<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<NumberOrString>::deserialize(deserializer)? {
        Some(NumberOrString::Number(n)) => Some(n),
        Some(NumberOrString::Text(s)) => s.trim().parse::<f64>().ok(),
        None => None,
    })
}

/// Fetch usage from the resolved endpoint.
pub async fn fetch_usage(
    url: &str,
    access_token: &str,
    account_id: Option<&str>,
) -> Result<CodexUsageResponse, FetchError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let mut request = client
        .get(url)
        .header("Authorization", format!("Bearer {}", access_token))
        .header("Accept", "application/json");
    if let Some(id) = account_id {
        request = request.header("ChatGPT-Account-Id", id);
    }
    let response = request.send().await?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(FetchError::Status(status.as_u16()));
    }
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

// ── Normalization ─────────────────────────────────────────────────────

pub fn plan_display_name(plan_type: &str) -> String {
    match plan_type.to_lowercase().as_str() {
        "free" => "Free".to_string(),
        "plus" => "Plus".to_string(),
        "pro" => "Pro".to_string(),
        "team" => "Team".to_string(),
        "business" => "Business".to_string(),
        "edu" => "Edu".to_string(),
        "enterprise" => "Enterprise".to_string(),
        other => other
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn parse_rate_window(raw: &RateWindowRaw) -> UsageWindow {
    UsageWindow {
        used_percent: raw.used_percent.unwrap_or(0.0),
        resets_at: raw
            .reset_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
    }
}

fn parse_credits(raw: &CreditsRaw) -> Option<ExtraUsage> {
    let unlimited = raw.unlimited.unwrap_or(false);
    let has_credits = raw.has_credits.unwrap_or(false);
    if !has_credits && !unlimited {
        return None;
    }
    Some(ExtraUsage {
        enabled: true,
        used: raw.balance.unwrap_or(0.0),
        // Unlimited plans report no cap.
        limit: None,
        used_percent: 0.0,
    })
}

/// Assemble the fully-connected snapshot from a successful fetch.
pub fn build_snapshot(
    resp: &CodexUsageResponse,
    ledger: LedgerTotals,
    now: DateTime<Utc>,
) -> ProviderSnapshot {
    let (session, aggregate) = match &resp.rate_limit {
        Some(rl) => (
            rl.primary_window.as_ref().map(parse_rate_window),
            rl.secondary_window.as_ref().map(parse_rate_window),
        ),
        None => (None, None),
    };

    // Pace window comes from the provider when reported, else 7 days.
    let window = resp
        .rate_limit
        .as_ref()
        .and_then(|rl| rl.secondary_window.as_ref())
        .and_then(|w| w.limit_window_seconds)
        .filter(|&secs| secs > 0)
        .map(chrono::Duration::seconds)
        .unwrap_or_else(pace::default_window);
    let pace_result = aggregate
        .as_ref()
        .and_then(|w| pace::compute_pace_at(w.used_percent, w.resets_at, window, now));

    ProviderSnapshot {
        provider: Provider::Codex,
        display_name: Provider::Codex.display_name().to_string(),
        connectivity: Connectivity::Connected,
        error_message: None,
        plan: resp.plan_type.as_deref().map(plan_display_name),
        session,
        aggregate,
        model_usage: std::collections::BTreeMap::new(),
        extra_usage: resp.credits.as_ref().and_then(parse_credits),
        pace: pace_result,
        ledger,
    }
}
