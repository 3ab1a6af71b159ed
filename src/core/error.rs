use thiserror::Error;

/// Credential loading outcomes that end a provider's pipeline early.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No usable credential on disk. Carries the user-facing hint.
    #[error("{0}")]
    NotAuthenticated(String),
    /// Credential present but past its recorded expiry.
    #[error("token expired")]
    Expired,
}

/// Failure calling a provider's usage endpoint.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Non-200 response; the status code is kept for diagnostics.
    #[error("HTTP {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    /// User-facing one-liner mirroring the connectivity state it causes.
    pub fn message(&self) -> String {
        match self {
            FetchError::Status(code) => format!("API error: {}", code),
            _ => "Failed to fetch usage data from API.".to_string(),
        }
    }
}
