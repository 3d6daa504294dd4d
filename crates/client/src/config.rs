//! Client configuration

use std::time::Duration;

use tracing::{debug, warn};

/// Default backend address during local development
const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Environment variable holding the API base URL
const BASE_URL_ENV: &str = "FITSYNC_API_URL";

/// Configuration for [`crate::ApiClient`]
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL for the API (e.g., "https://api.fitsync.app")
    pub base_url: String,
    /// Timeout applied to every request
    pub timeout: Duration,
    /// Optional User-Agent header value
    pub user_agent: Option<String>,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

impl ApiClientConfig {
    /// Build a configuration from the environment
    ///
    /// Loads `.env` first, then reads `FITSYNC_API_URL`; falls back to the
    /// local development backend when unset.
    #[must_use]
    pub fn from_env() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(e) => debug!(error = %e, "no .env file loaded"),
        }

        let base_url = match std::env::var(BASE_URL_ENV) {
            Ok(url) if !url.is_empty() => url,
            Ok(_) | Err(_) => {
                warn!("{BASE_URL_ENV} not set, using {DEFAULT_BASE_URL}");
                DEFAULT_BASE_URL.to_string()
            }
        };

        Self { base_url, ..Self::default() }
    }
}
