//! HTTP client for job callback delivery.
//!
//! Every delivery carries an `X-Idempotency-Key` header set to the
//! execution id so the callee can deduplicate when a retry races the
//! original. Any HTTP status that comes back is an outcome, not an
//! error; only failures below the HTTP layer (connect, timeout, read)
//! surface as a transport error.

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use uuid::Uuid;

use crate::config::HttpClientConfig;
use crate::error::{Result, SchedulerError};

/// Header carrying the per-execution deduplication token.
pub const IDEMPOTENCY_KEY_HEADER: &str = "X-Idempotency-Key";

/// Client for invoking job callback URLs.
#[derive(Clone)]
pub struct CallbackClient {
    client: reqwest::Client,
}

impl CallbackClient {
    /// Create a new callback client from configuration.
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(config.connect_timeout_seconds))
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SchedulerError::internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Perform a callback request, returning the HTTP status code.
    ///
    /// The dispatch path always issues GET; other methods are supported
    /// for callers that need them, attaching a JSON body where the method
    /// carries one.
    ///
    /// # Errors
    ///
    /// Returns a transport error when no HTTP status was received
    /// (connection refused, DNS failure, timeout, truncated read).
    pub async fn call(
        &self,
        api_url: &str,
        method: Method,
        execution_id: Uuid,
        body: Option<&serde_json::Value>,
    ) -> Result<u16> {
        let mut request = self
            .client
            .request(method.clone(), api_url)
            .header(IDEMPOTENCY_KEY_HEADER, execution_id.to_string());

        if matches!(method, Method::POST | Method::PUT | Method::PATCH) {
            request = request.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            if let Some(body) = body {
                request = request.json(body);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| SchedulerError::transport(e.to_string()).with_source(e))?;

        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds_with_defaults() {
        let client = CallbackClient::new(&HttpClientConfig::default());
        assert!(client.is_ok());
    }
}
