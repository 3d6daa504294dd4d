//! Session state contract
//!
//! The client never owns token state: it reads and writes the access token
//! through an injected [`SessionStore`]. This keeps the client free of hidden
//! global state and trivially testable with mock stores.

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Trait for the externally-owned session state
///
/// Implementations own the current access token. The client calls
/// [`SessionStore::clear`] after a failed refresh (logout); it never
/// constructs tokens itself.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Get the current access token, if any
    async fn access_token(&self) -> Option<String>;

    /// Replace the current access token
    async fn set_access_token(&self, token: Option<String>);

    /// Drop the session state (local logout)
    async fn clear(&self);
}

/// In-memory session store
///
/// One active session per process context, represented by an optional
/// access token behind an async lock.
#[derive(Debug, Default)]
pub struct MemorySession {
    token: RwLock<Option<String>>,
}

impl MemorySession {
    /// Create an empty (logged-out) session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session that already holds an access token
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: RwLock::new(Some(token.into())) }
    }
}

#[async_trait]
impl SessionStore for MemorySession {
    async fn access_token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    async fn set_access_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    async fn clear(&self) {
        *self.token.write().await = None;
    }
}
