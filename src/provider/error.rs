//! Error types for provider search operations.

use thiserror::Error;

/// Errors that can occur while querying an external scholarly index.
///
/// "No results" is never an error: providers return an empty record set
/// instead. Errors are reserved for transport failures and responses the
/// client cannot interpret.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network, HTTP status, or timeout failure reaching the index
    #[error("provider '{provider}' transport failure: {reason}")]
    Transport {
        /// Provider name
        provider: String,
        /// Why the request failed
        reason: String,
    },

    /// The index answered but the payload did not match the expected shape
    #[error("provider '{provider}' returned an unexpected response: {reason}")]
    UnexpectedResponse {
        /// Provider name
        provider: String,
        /// What was wrong with the payload
        reason: String,
    },

    /// HTTP client construction failed
    #[error("provider '{provider}' client construction failed: {reason}")]
    Construction {
        /// Provider name
        provider: String,
        /// Builder failure detail
        reason: String,
    },
}

impl ProviderError {
    /// Creates a `Transport` error.
    #[must_use]
    pub fn transport(provider: &str, reason: impl Into<String>) -> Self {
        Self::Transport {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates an `UnexpectedResponse` error.
    #[must_use]
    pub fn unexpected_response(provider: &str, reason: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a `Construction` error.
    #[must_use]
    pub fn construction(provider: &str, reason: impl Into<String>) -> Self {
        Self::Construction {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    /// Maps a reqwest failure into a `Transport` error, noting timeouts.
    #[must_use]
    pub fn from_reqwest(provider: &str, error: &reqwest::Error) -> Self {
        let reason = if error.is_timeout() {
            "request timed out".to_string()
        } else {
            error.to_string()
        };
        Self::transport(provider, reason)
    }
}
