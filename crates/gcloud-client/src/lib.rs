//! Google Cloud REST plumbing shared by the warehouse and compute clients.
//!
//! - Service-account key loading and OAuth2 JWT-bearer token exchange
//! - An authorized JSON client with retry and exponential backoff
//! - Decoding of Google error bodies

pub mod client;
pub mod credentials;
pub mod error;
pub mod token;

pub use client::{ApiClient, ClientConfig, RetryPolicy};
pub use credentials::ServiceAccountKey;
pub use error::{GcloudError, GcloudResult};
pub use token::{ServiceAccountTokenSource, StaticToken, TokenSource};

/// OAuth scopes requested for the pipeline's token.
pub mod scopes {
    pub const CLOUD_PLATFORM: &str = "https://www.googleapis.com/auth/cloud-platform";
    pub const EARTH_ENGINE: &str = "https://www.googleapis.com/auth/earthengine";
    pub const BIGQUERY: &str = "https://www.googleapis.com/auth/bigquery";

    /// Everything a zonal statistics run needs.
    pub const ZONAL_STATS: [&str; 3] = [CLOUD_PLATFORM, EARTH_ENGINE, BIGQUERY];
}
