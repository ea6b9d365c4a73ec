//! Authorized JSON client with retry.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{GcloudError, GcloudResult};
use crate::token::TokenSource;

/// Exponential backoff settings for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry (doubles each retry)
    pub initial_delay: Duration,
    /// Upper bound on the delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay)
    }
}

/// HTTP client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Pull a readable message out of a Google error body.
fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody { error }) => match error.status {
            Some(status) if !error.message.is_empty() => format!("{} ({})", error.message, status),
            Some(status) => status,
            None => error.message,
        },
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            text.chars().take(500).collect()
        }
    }
}

/// Sends bearer-authorized requests and decodes JSON replies.
pub struct ApiClient {
    http: Client,
    tokens: Arc<dyn TokenSource>,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(tokens: Arc<dyn TokenSource>, config: ClientConfig) -> GcloudResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            http,
            tokens,
            config,
        })
    }

    /// Send a request and decode the JSON reply, retrying transient failures.
    ///
    /// `build` is called once per attempt so the request can be re-sent.
    pub async fn send_json<T, F>(&self, operation: &str, build: F) -> GcloudResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let retry = &self.config.retry;
        let mut retries = 0;

        loop {
            match self.send_once(&build).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && retries < retry.max_retries => {
                    retries += 1;
                    let delay = retry.delay_for(retries);
                    warn!(
                        operation = %operation,
                        error = %e,
                        retry = retries,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once<T, F>(&self, build: &F) -> GcloudResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let token = self.tokens.access_token().await?;
        let response = build(&self.http).bearer_auth(token).send().await?;

        let status = response.status();
        let body = response.bytes().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "Received response");

        if !status.is_success() {
            return Err(GcloudError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_slice(&body).map_err(|e| GcloudError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delays_double_and_cap() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_error_message_from_google_body() {
        let body = br#"{"error": {"code": 400, "message": "Syntax error at [1:8]", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(
            error_message(body),
            "Syntax error at [1:8] (INVALID_ARGUMENT)"
        );
    }

    #[test]
    fn test_error_message_plain_text() {
        assert_eq!(error_message(b"upstream timeout"), "upstream timeout");
    }
}
