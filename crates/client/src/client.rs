//! Authenticated API client with transparent token refresh
//!
//! Wraps outgoing calls to the FitSync API, attaches a bearer token sourced
//! from the injected [`SessionStore`], and on a 401 performs exactly one
//! refresh-and-retry cycle before giving up and forcing logout.
//!
//! The refresh endpoint itself is called directly (bypassing the retry
//! logic) so an expired session can never recurse into further refreshes.

use std::sync::Arc;

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::config::ApiClientConfig;
use crate::error::ApiError;
use crate::session::SessionStore;
use crate::types::{ErrorResponse, TokenResponse};

/// Route that exchanges the session cookie for a new access token
pub const REFRESH_PATH: &str = "/api/auth/refresh";

/// Route that invalidates the server-side session
pub const LOGOUT_PATH: &str = "/api/auth/logout";

/// Authenticated HTTP client for the FitSync API
///
/// All calls are relative to the configured base URL. Token state lives in
/// the injected session store; the client only reads and writes it through
/// the [`SessionStore`] contract.
pub struct ApiClient {
    http: Client,
    config: ApiClientConfig,
    session: RwLock<Arc<dyn SessionStore>>,
    /// Serializes refreshes so concurrent 401s share a single refresh call
    refresh_gate: Mutex<()>,
}

impl ApiClient {
    /// Create a new API client
    ///
    /// # Arguments
    ///
    /// * `config` - Client configuration
    /// * `session` - Session store owning the access token
    ///
    /// # Errors
    ///
    /// Returns error if the underlying HTTP client cannot be built
    pub fn new(
        config: ApiClientConfig,
        session: Arc<dyn SessionStore>,
    ) -> Result<Self, ApiError> {
        // Cookie store keeps the refresh session cookie between calls
        let mut builder = Client::builder().timeout(config.timeout).cookie_store(true);

        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }

        let http = builder
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config, session: RwLock::new(session), refresh_gate: Mutex::new(()) })
    }

    /// Create a builder for fluent configuration
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Replace the injected session store
    ///
    /// Subsequent requests read and write token state through the new store.
    pub async fn configure(&self, session: Arc<dyn SessionStore>) {
        *self.session.write().await = session;
    }

    /// Issue an HTTP call relative to the base URL
    ///
    /// Attaches `Authorization: Bearer <token>` when the session store holds
    /// a token; requests without a token go out unauthenticated and the
    /// server decides whether that is permitted.
    ///
    /// A 401 on a non-refresh route triggers one transparent refresh and one
    /// resubmission of the original request; that outcome is final.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] for every failure path: non-2xx responses,
    /// transport failures (status 0), and irrecoverable auth failures.
    #[instrument(skip(self, body), fields(path = %path))]
    pub async fn request<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = match body {
            Some(b) => Some(serde_json::to_value(b).map_err(|e| {
                ApiError::Parse(format!("failed to serialize request body: {e}"))
            })?),
            None => None,
        };

        self.execute(method, path, body).await
    }

    /// Execute a GET request
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be
    /// deserialized
    #[instrument(skip(self), fields(path = %path))]
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(Method::GET, path, None).await
    }

    /// Execute a POST request with a JSON body
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be
    /// deserialized
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Execute a PUT request with a JSON body
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be
    /// deserialized
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// Execute a DELETE request
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be
    /// deserialized
    #[instrument(skip(self), fields(path = %path))]
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(Method::DELETE, path, None).await
    }

    /// Restore the session from the refresh cookie
    ///
    /// Intended for startup: when no token is held, calls the refresh
    /// endpoint once and stores the new token on success. Failure leaves the
    /// session logged out without invoking the logout route.
    ///
    /// # Returns
    ///
    /// `true` if a token is available after the call
    pub async fn bootstrap_session(&self) -> bool {
        let session = self.session().await;
        if session.access_token().await.is_some() {
            return true;
        }

        match self.refresh().await {
            Ok(token) => {
                session.set_access_token(Some(token)).await;
                info!("session restored from refresh cookie");
                true
            }
            Err(err) => {
                debug!(error = %err, "no session to restore");
                false
            }
        }
    }

    /// Log out: invalidate the server-side session and clear local state
    ///
    /// The network call is best-effort; its failure is logged and never
    /// blocks clearing the session store.
    pub async fn logout(&self) {
        let session = self.session().await;
        let token = session.access_token().await;

        let mut request = self.http.post(self.url(LOGOUT_PATH));
        if let Some(token) = token.as_deref() {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), "logout request rejected by server");
            }
            Ok(_) => debug!("server session invalidated"),
            Err(err) => warn!(error = %err, "logout request failed"),
        }

        session.clear().await;
        info!("session cleared (logged out)");
    }

    async fn session(&self) -> Arc<dyn SessionStore> {
        self.session.read().await.clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Send one request and run the single-retry protocol on its outcome
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let session = self.session().await;
        let token = session.access_token().await;

        let response = self.send(method.clone(), path, body.as_ref(), token.as_deref()).await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            if is_refresh_path(path) {
                // The refresh route is never retried
                warn!("refresh endpoint rejected the session, logging out");
                self.logout().await;
                return Err(ApiError::RefreshFailed(
                    "refresh endpoint returned 401".to_string(),
                ));
            }

            debug!("access token rejected, attempting refresh");
            let fresh = self.refresh_or_logout(token.as_deref()).await?;

            // Resubmit exactly once; whatever comes back is the final
            // outcome, including another 401.
            let retried = self.send(method, path, body.as_ref(), Some(&fresh)).await?;
            return Self::read_body(retried).await;
        }

        Self::read_body(response).await
    }

    /// Build and send a single request attempt
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let url = self.url(path);
        debug!(%method, %url, authenticated = token.is_some(), "sending request");

        let mut request = self.http.request(method, &url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(|err| {
            if err.is_timeout() {
                ApiError::Network(format!("request timed out: {err}"))
            } else {
                ApiError::Network(err.to_string())
            }
        })
    }

    /// Obtain a fresh access token, logging out on failure
    ///
    /// Concurrent callers serialize on the refresh gate: the first one
    /// refreshes, later callers observe a token differing from the one they
    /// sent and reuse it without a second refresh call. The gate is held
    /// through a failed refresh's logout so waiters observe the cleared
    /// session instead of refreshing an already-dead session again.
    async fn refresh_or_logout(&self, stale: Option<&str>) -> Result<String, ApiError> {
        let _gate = self.refresh_gate.lock().await;

        let session = self.session().await;
        match session.access_token().await {
            // Another caller refreshed while this one waited
            Some(current) if stale != Some(current.as_str()) => {
                debug!("reusing token refreshed by a concurrent request");
                return Ok(current);
            }
            // A concurrent refresh failed and cleared the session
            None if stale.is_some() => {
                debug!("session cleared by a concurrent refresh failure");
                return Err(ApiError::RefreshFailed("session expired".to_string()));
            }
            _ => {}
        }

        match self.refresh().await {
            Ok(token) => {
                session.set_access_token(Some(token.clone())).await;
                info!("access token refreshed");
                Ok(token)
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed, logging out");
                self.logout().await;
                Err(ApiError::RefreshFailed(err.to_string()))
            }
        }
    }

    /// Call the refresh endpoint directly, bypassing the retry protocol
    async fn refresh(&self) -> Result<String, ApiError> {
        let response = self
            .http
            .post(self.url(REFRESH_PATH))
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(status, response).await);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(format!("malformed refresh response: {e}")))?;

        Ok(token.access_token)
    }

    /// Parse a successful response, normalizing non-2xx statuses
    async fn read_body<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();

        if !status.is_success() {
            return Err(Self::status_error(status, response).await);
        }

        // 204/205 carry no body by spec; deserialize from null
        if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
            return serde_json::from_value(Value::Null).map_err(|_| {
                ApiError::Parse(format!(
                    "no-content response ({}) for a type that expects a body",
                    status.as_u16()
                ))
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Parse(format!("failed to parse response: {e}")))
    }

    /// Normalize a non-2xx response into the standardized error shape
    async fn status_error(status: StatusCode, response: Response) -> ApiError {
        let body = response.text().await.unwrap_or_default();

        let message = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => err.message,
            Err(_) if !body.is_empty() => body,
            Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
        };

        ApiError::Http { status: status.as_u16(), message }
    }
}

/// Match the refresh route by its path component
///
/// Query strings and a trailing slash still address the same route and must
/// not re-enter the retry branch.
fn is_refresh_path(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path).trim_end_matches('/');
    path == REFRESH_PATH
}

/// Builder for [`ApiClient`]
#[derive(Default)]
pub struct ApiClientBuilder {
    config: Option<ApiClientConfig>,
    session: Option<Arc<dyn SessionStore>>,
}

impl ApiClientBuilder {
    /// Set the client configuration
    #[must_use]
    pub fn config(mut self, config: ApiClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the session store
    #[must_use]
    pub fn session(mut self, session: Arc<dyn SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    /// Build the API client
    ///
    /// # Errors
    ///
    /// Returns error if the session store is missing or client creation
    /// fails
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let config = self.config.unwrap_or_default();
        let session =
            self.session.ok_or_else(|| ApiError::Config("session store not set".to_string()))?;

        ApiClient::new(config, session)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::session::MemorySession;

    #[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
    struct Routine {
        id: u64,
        name: String,
    }

    fn client_for(server: &MockServer, session: Arc<dyn SessionStore>) -> ApiClient {
        let config = ApiClientConfig { base_url: server.uri(), ..Default::default() };
        ApiClient::new(config, session).expect("api client")
    }

    #[tokio::test]
    async fn test_bearer_header_attached_when_token_present() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/routine/5"))
            .and(header("Authorization", "Bearer valid-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 5,
                "name": "Leg Day"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemorySession::with_token("valid-token")));

        let routine: Routine = client.get("/api/routine/5").await.unwrap();
        assert_eq!(routine, Routine { id: 5, name: "Leg Day".to_string() });
    }

    #[tokio::test]
    async fn test_request_without_token_omits_authorization_header() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/exercise"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemorySession::new()));

        let _: Vec<Routine> = client.get("/api/exercise").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_server_error_body_normalized_to_message_and_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/routine/99"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"message": "Not Found"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemorySession::with_token("valid-token")));

        let result: Result<Routine, ApiError> = client.get("/api/routine/99").await;
        let err = result.unwrap_err();

        assert_eq!(err.message(), "Not Found");
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_non_json_error_body_surfaced_as_text() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/routine/1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database exploded"))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemorySession::with_token("valid-token")));

        let result: Result<Routine, ApiError> = client.get("/api/routine/1").await;
        let err = result.unwrap_err();

        assert_eq!(err.status_code(), 500);
        assert_eq!(err.message(), "database exploded");
    }

    #[tokio::test]
    async fn test_empty_error_body_uses_status_text() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/api/workout/3"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemorySession::with_token("valid-token")));

        let result: Result<(), ApiError> = client.delete("/api/workout/3").await;
        let err = result.unwrap_err();

        assert_eq!(err.status_code(), 403);
        assert_eq!(err.message(), "Forbidden");
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/routine"))
            .and(wiremock::matchers::body_json(serde_json::json!({
                "id": 0,
                "name": "Push Day"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 7,
                "name": "Push Day"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemorySession::with_token("valid-token")));

        let created: Routine = client
            .post("/api/routine", &Routine { id: 0, name: "Push Day".to_string() })
            .await
            .unwrap();
        assert_eq!(created.id, 7);
    }

    #[tokio::test]
    async fn test_204_no_content_deserializes_to_unit() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/api/routine/5"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemorySession::with_token("valid-token")));

        let result: Result<(), ApiError> = client.delete("/api/routine/5").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_transport_failure_maps_to_network_error() {
        // Bind and drop a listener so the port refuses connections
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ApiClientConfig {
            base_url: format!("http://{addr}"),
            timeout: std::time::Duration::from_secs(2),
            ..Default::default()
        };
        let client = ApiClient::new(config, Arc::new(MemorySession::new())).unwrap();

        let result: Result<Routine, ApiError> = client.get("/api/routine/5").await;
        let err = result.unwrap_err();

        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(err.status_code(), 0);
    }

    #[tokio::test]
    async fn test_configure_swaps_session_store() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/user/me"))
            .and(header("Authorization", "Bearer second-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1,
                "name": "admin"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemorySession::with_token("first-token")));
        client.configure(Arc::new(MemorySession::with_token("second-token"))).await;

        let user: Routine = client.get("/api/user/me").await.unwrap();
        assert_eq!(user.id, 1);
    }

    #[tokio::test]
    async fn test_builder_missing_session_fails() {
        let result = ApiClient::builder().build();
        assert!(matches!(result, Err(ApiError::Config(_))));
    }

    #[tokio::test]
    async fn test_builder_with_defaults() {
        let client = ApiClient::builder().session(Arc::new(MemorySession::new())).build();
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_route_with_query_string_is_not_retried() {
        let server = MockServer::start().await;

        // Only the direct call hits the refresh route
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let session = Arc::new(MemorySession::with_token("some-token"));
        let client = client_for(&server, session.clone());

        let result: Result<serde_json::Value, ApiError> = client
            .request(Method::POST, "/api/auth/refresh?source=bootstrap", None::<&Value>)
            .await;

        assert!(matches!(result, Err(ApiError::RefreshFailed(_))));
        assert!(session.access_token().await.is_none());
    }

    #[test]
    fn test_refresh_path_matching() {
        assert!(is_refresh_path("/api/auth/refresh"));
        assert!(is_refresh_path("/api/auth/refresh/"));
        assert!(is_refresh_path("/api/auth/refresh?x=1"));
        assert!(!is_refresh_path("/api/auth/refresh-stats"));
        assert!(!is_refresh_path("/api/routine/5"));
    }
}
