//! Shared HTTP client construction policy for provider clients.
//!
//! All provider clients share one builder policy so they stay consistent on
//! timeout, user-agent, and compression. The request timeout bounds every
//! provider call so one slow index cannot stall a resolver fan-out; hitting
//! it surfaces as a transport error.

use std::time::Duration;

use reqwest::Client;

use super::ProviderError;

/// Per-request timeout applied to every provider call.
pub const PROVIDER_TIMEOUT_SECS: u64 = 10;

const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Builds a single shared provider user-agent string.
#[must_use]
pub fn standard_user_agent() -> String {
    format!(
        "manuweaver/{} (scholarly reference resolution)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Builds a provider HTTP client using shared project policy.
///
/// # Errors
///
/// Returns [`ProviderError::Construction`] when client construction fails.
pub fn build_provider_http_client(provider_name: &str) -> Result<Client, ProviderError> {
    build_provider_http_client_with_timeout(
        provider_name,
        Duration::from_secs(PROVIDER_TIMEOUT_SECS),
    )
}

/// Builds a provider HTTP client with an explicit request timeout.
///
/// Used by tests that need a short bound; production callers use
/// [`build_provider_http_client`].
///
/// # Errors
///
/// Returns [`ProviderError::Construction`] when client construction fails.
pub fn build_provider_http_client_with_timeout(
    provider_name: &str,
    timeout: Duration,
) -> Result<Client, ProviderError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(timeout)
        .user_agent(standard_user_agent())
        .gzip(true)
        .build()
        .map_err(|error| ProviderError::construction(provider_name, error.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_standard_user_agent_identifies_tool() {
        let ua = standard_user_agent();
        assert!(ua.contains("manuweaver/"), "UA must identify the tool");
    }

    #[test]
    fn test_build_provider_http_client_succeeds() {
        build_provider_http_client("crossref").unwrap();
    }

    #[tokio::test]
    async fn test_request_timeout_surfaces_as_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client =
            build_provider_http_client_with_timeout("crossref", Duration::from_millis(200))
                .unwrap();
        let error = client
            .get(format!("{}/slow", server.uri()))
            .send()
            .await
            .unwrap_err();

        let mapped = ProviderError::from_reqwest("crossref", &error);
        assert!(matches!(mapped, ProviderError::Transport { .. }));
        assert!(
            mapped.to_string().contains("request timed out"),
            "timeout must be named in the transport reason: {mapped}"
        );
    }
}
