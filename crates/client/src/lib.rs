//! FitSync API client
//!
//! HTTP client library for the FitSync fitness-tracking service. The core is
//! an authenticated client that attaches a bearer access token from an
//! injected session store and recovers from expired credentials with exactly
//! one transparent refresh-and-retry cycle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  ApiClient  │  request / get / post / put / delete
//! └──────┬──────┘
//!        │
//!        ├──► SessionStore   (injected token state: get / set / clear)
//!        ├──► refresh gate   (coalesces concurrent token refreshes)
//!        └──► ApiError       (normalized message + status code)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fitsync_client::{ApiClient, ApiClientConfig, MemorySession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Arc::new(MemorySession::new());
//!     let client = ApiClient::new(ApiClientConfig::from_env(), session)?;
//!
//!     // Restore the session from the refresh cookie, if one exists
//!     if client.bootstrap_session().await {
//!         let routine: serde_json::Value = client.get("/api/routine/5").await?;
//!         println!("{routine}");
//!     }
//!
//!     client.logout().await;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use client::{ApiClient, ApiClientBuilder, LOGOUT_PATH, REFRESH_PATH};
pub use config::ApiClientConfig;
pub use error::ApiError;
pub use session::{MemorySession, SessionStore};
pub use types::{ErrorResponse, TokenResponse};
