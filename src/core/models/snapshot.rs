use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::pace::PaceResult;
use crate::core::providers::Provider;

/// How far a provider's pipeline got during the last poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// No usable credential on disk (or credential expired).
    NotAuthenticated,
    /// Credentials exist but the usage fetch failed; local data may still be present.
    ConnectedWithError,
    Connected,
}

/// One quota window as reported by a provider for a single poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageWindow {
    /// Percentage of the window consumed. Providers may report past 100.
    pub used_percent: f64,
    /// When the window resets, normalized to UTC.
    pub resets_at: Option<DateTime<Utc>>,
}

/// Pay-as-you-go allowance beyond the plan's included quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraUsage {
    pub enabled: bool,
    /// Current spend/balance in dollars.
    pub used: f64,
    /// Spending limit in dollars; `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
    pub used_percent: f64,
}

/// Token and cost totals computed from local session logs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub today_tokens: u64,
    pub thirty_day_tokens: u64,
    pub today_cost: f64,
    pub thirty_day_cost: f64,
    pub total_messages: u64,
    pub total_sessions: u64,
}

/// The aggregate output record for one provider, rebuilt whole on every poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    pub provider: Provider,
    pub display_name: String,
    pub connectivity: Connectivity,
    /// Set only when connectivity is not `Connected`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Short (hours) quota window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<UsageWindow>,
    /// Long (~7 day) quota window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<UsageWindow>,
    /// Named model-specific sub-quotas (model name -> used percent).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub model_usage: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_usage: Option<ExtraUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pace: Option<PaceResult>,
    pub ledger: LedgerTotals,
}

impl ProviderSnapshot {
    /// Empty snapshot for a provider with no usable credential.
    pub fn not_authenticated(provider: Provider, message: impl Into<String>) -> Self {
        Self {
            provider,
            display_name: provider.display_name().to_string(),
            connectivity: Connectivity::NotAuthenticated,
            error_message: Some(message.into()),
            plan: None,
            session: None,
            aggregate: None,
            model_usage: BTreeMap::new(),
            extra_usage: None,
            pace: None,
            ledger: LedgerTotals::default(),
        }
    }

    /// Snapshot for a provider whose credentials loaded but whose usage
    /// fetch failed. Ledger totals are still attached so stale/partial
    /// data can be shown instead of a bare "not logged in".
    pub fn connected_with_error(
        provider: Provider,
        plan: Option<String>,
        message: impl Into<String>,
        ledger: LedgerTotals,
    ) -> Self {
        Self {
            provider,
            display_name: provider.display_name().to_string(),
            connectivity: Connectivity::ConnectedWithError,
            error_message: Some(message.into()),
            plan,
            session: None,
            aggregate: None,
            model_usage: BTreeMap::new(),
            extra_usage: None,
            pace: None,
            ledger,
        }
    }
}
