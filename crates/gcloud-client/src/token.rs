//! OAuth2 access tokens for service accounts.
//!
//! Implements the JWT-bearer grant: a signed RS256 assertion is exchanged at
//! the key's `token_uri` for a short-lived access token. Tokens are reused
//! until shortly before they expire.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::credentials::ServiceAccountKey;
use crate::error::{GcloudError, GcloudResult};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each assertion, the maximum Google accepts.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh this long before the token actually expires.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Something that can hand out bearer tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> GcloudResult<String>;
}

/// A fixed token, for local emulators and tests.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> GcloudResult<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Tokens minted from a service-account key.
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    issuer: String,
    scopes: Vec<String>,
    http: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    /// Create a token source for the given scopes.
    pub fn new(key: ServiceAccountKey, scopes: &[&str]) -> GcloudResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            issuer: key.client_email.clone(),
            key,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            http,
            cached: Mutex::new(None),
        })
    }

    /// Use an explicit service-account e-mail as the assertion issuer.
    pub fn with_issuer(mut self, service_account: &str) -> Self {
        if service_account != self.key.client_email {
            warn!(
                service_account = %service_account,
                key_email = %self.key.client_email,
                "Service account does not match the key file's client_email"
            );
        }
        self.issuer = service_account.to_string();
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Build the signed JWT assertion.
    fn assertion(&self, now: DateTime<Utc>) -> GcloudResult<String> {
        let iat = now.timestamp();
        let claims = Claims {
            iss: &self.issuer,
            scope: self.scopes.join(" "),
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| GcloudError::InvalidKey(e.to_string()))?;

        Ok(jsonwebtoken::encode(&header, &claims, &signing_key)?)
    }

    #[instrument(skip(self), fields(issuer = %self.issuer))]
    async fn fetch(&self) -> GcloudResult<CachedToken> {
        let now = Utc::now();
        let assertion = self.assertion(now)?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| match e.error_description {
                    Some(desc) => format!("{}: {}", e.error, desc),
                    None => e.error,
                })
                .unwrap_or(body);
            return Err(GcloudError::TokenExchange(format!("{} ({})", message, status)));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| GcloudError::TokenExchange(format!("unexpected token response: {}", e)))?;

        info!(expires_in = token.expires_in, "Obtained access token");

        Ok(CachedToken {
            value: token.access_token,
            expires_at: now + chrono::Duration::seconds(token.expires_in),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> GcloudResult<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                debug!("Reusing cached access token");
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::fixtures;

    #[test]
    fn test_cached_token_freshness() {
        let now = Utc::now();
        let token = CachedToken {
            value: "t".to_string(),
            expires_at: now + chrono::Duration::seconds(120),
        };
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + chrono::Duration::seconds(61)));
    }

    #[test]
    fn test_with_issuer_overrides_client_email() {
        let key = ServiceAccountKey::from_json(&fixtures::service_account_json("http://x/token"))
            .unwrap();
        let source = ServiceAccountTokenSource::new(key, &["scope-a"])
            .unwrap()
            .with_issuer("other@test-project.iam.gserviceaccount.com");
        assert_eq!(source.issuer(), "other@test-project.iam.gserviceaccount.com");
    }

    #[test]
    fn test_static_token() {
        let source = StaticToken::new("abc");
        let token = tokio_test::block_on(source.access_token()).unwrap();
        assert_eq!(token, "abc");
    }
}
