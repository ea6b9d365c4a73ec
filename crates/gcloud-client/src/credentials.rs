//! Service-account key files.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{GcloudError, GcloudResult};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// The parts of a service-account JSON key we use.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Load and validate a key file.
    pub fn from_file(path: &Path) -> GcloudResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| GcloudError::KeyFile {
            path: path.to_path_buf(),
            source,
        })?;
        let key = Self::from_json(&content)?;
        debug!(
            path = %path.display(),
            client_email = %key.client_email,
            "Loaded service account key"
        );
        Ok(key)
    }

    /// Parse and validate a key from its JSON text.
    pub fn from_json(json: &str) -> GcloudResult<Self> {
        let key: ServiceAccountKey =
            serde_json::from_str(json).map_err(|e| GcloudError::InvalidKey(e.to_string()))?;

        if key.key_type != "service_account" {
            return Err(GcloudError::InvalidKey(format!(
                "expected type 'service_account', got '{}'",
                key.key_type
            )));
        }
        if !key.private_key.contains("PRIVATE KEY") {
            return Err(GcloudError::InvalidKey(
                "private_key is not a PEM private key".to_string(),
            ));
        }
        Ok(key)
    }
}

// The private key never ends up in logs.
impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("key_type", &self.key_type)
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"<redacted>")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::fixtures;

    #[test]
    fn test_from_json() {
        let key = ServiceAccountKey::from_json(&fixtures::service_account_json(
            "http://localhost/token",
        ))
        .unwrap();
        assert_eq!(key.client_email, fixtures::SERVICE_ACCOUNT_EMAIL);
        assert_eq!(key.token_uri, "http://localhost/token");
        assert_eq!(key.project_id.as_deref(), Some("test-project"));
    }

    #[test]
    fn test_default_token_uri() {
        let json = serde_json::json!({
            "type": "service_account",
            "private_key": fixtures::keys::PRIVATE_KEY_PEM,
            "client_email": "a@b.iam.gserviceaccount.com",
        });
        let key = ServiceAccountKey::from_json(&json.to_string()).unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_rejects_user_credentials() {
        let json = r#"{"type": "authorized_user", "private_key": "x", "client_email": "a@b"}"#;
        assert!(matches!(
            ServiceAccountKey::from_json(json),
            Err(GcloudError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let key = ServiceAccountKey::from_json(&fixtures::service_account_json("http://x"))
            .unwrap();
        let debug = format!("{:?}", key);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn test_missing_file() {
        let err = ServiceAccountKey::from_file(Path::new("/nonexistent/key.json")).unwrap_err();
        assert!(matches!(err, GcloudError::KeyFile { .. }));
    }
}
