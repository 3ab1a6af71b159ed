pub mod claude;
pub mod codex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Claude,
    Codex,
}

impl Provider {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "claude" => Some(Self::Claude),
            "codex" => Some(Self::Codex),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::Codex => "Codex",
        }
    }

    /// Hint shown when the provider has no usable credential.
    pub fn auth_hint(&self) -> &'static str {
        match self {
            Self::Claude => "Not logged in. Run 'claude' to authenticate.",
            Self::Codex => "Not logged in. Run 'codex' to authenticate.",
        }
    }

    pub fn all() -> &'static [Provider] {
        &[Provider::Claude, Provider::Codex]
    }
}

/// Validate that a resolved endpoint URL uses HTTPS.
///
/// Providers that allow endpoint overrides must call this before sending
/// credentials, to prevent exfiltration over plain HTTP or other schemes.
pub fn validate_endpoint(url: &str, provider_name: &str) -> anyhow::Result<()> {
    if !url.starts_with("https://") {
        anyhow::bail!("{}: endpoint must use HTTPS, got: {}", provider_name, url);
    }
    Ok(())
}
