//! HTTP implementation of the backend transport.
//!
//! A thin reqwest wrapper: builds the URL from the configured base,
//! enforces the per-attempt timeout from the policy, and classifies
//! reqwest failures into [`TransportError`]. No retry logic lives here;
//! that is the gateway's job.

use crate::backend::{Backend, BackendReply, BackendRequest, TransportError};
use crate::policy::Method;
use cubby_core::{Error, Result};
use serde_json::Value;
use tracing::{debug, trace};

/// Configuration for the HTTP backend transport.
///
/// # Example
///
/// ```
/// use cubby_relay::HttpBackendConfig;
///
/// let config = HttpBackendConfig {
///     base_url: "http://192.168.0.40:5000".to_string(),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Root URL of the hardware-control service, without a trailing
    /// slash (one is tolerated and trimmed).
    pub base_url: String,

    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            user_agent: concat!("cubby/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP transport to the hardware-control service.
///
/// The inner reqwest client pools connections across requests; cloning
/// the backend is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Create a new HTTP backend.
    ///
    /// # Errors
    /// Returns `Error::Config` if the underlying client cannot be
    /// constructed (for example when no TLS backend is available).
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        debug!("Created HTTP backend for {}", base_url);

        Ok(Self { base_url, client })
    }

    /// The configured backend root URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Backend for HttpBackend {
    async fn execute(
        &self,
        request: BackendRequest<'_>,
    ) -> std::result::Result<BackendReply, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        trace!(method = %request.method, %url, timeout_ms = request.timeout.as_millis() as u64, "Dispatching backend request");

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        }
        .timeout(request.timeout);

        if let Some(body) = request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e, request.timeout))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e, request.timeout))?;

        let body = if text.is_empty() {
            Value::Null
        } else {
            // Non-JSON bodies are preserved verbatim; the gateway treats
            // them as opaque payloads and skips metadata augmentation.
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        trace!(status, "Backend responded");
        Ok(BackendReply { status, body })
    }
}

/// Classify a reqwest failure into the transport taxonomy.
///
/// reqwest does not expose name-resolution failures as a distinct kind;
/// the resolver reports them as a "dns error" somewhere in the error
/// chain, so the chain is sniffed before falling back to the connect
/// classification.
fn classify_reqwest_error(err: &reqwest::Error, timeout: std::time::Duration) -> TransportError {
    if err.is_timeout() {
        return TransportError::timeout(timeout);
    }
    if error_chain_mentions_dns(err) {
        return TransportError::resolve(err.to_string());
    }
    TransportError::connect(err.to_string())
}

fn error_chain_mentions_dns(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if e.to_string().to_ascii_lowercase().contains("dns") {
            return true;
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let backend = HttpBackend::new(HttpBackendConfig {
            base_url: "http://10.0.0.2:5000/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(backend.base_url(), "http://10.0.0.2:5000");
    }

    #[test]
    fn test_default_config_points_at_localhost() {
        let config = HttpBackendConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:5000");
        assert!(config.user_agent.starts_with("cubby/"));
    }
}
