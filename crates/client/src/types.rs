//! Wire types for the FitSync auth endpoints

use serde::Deserialize;

/// Response body of `POST /api/auth/refresh`
///
/// The server exchanges the session cookie for a new access token and
/// returns it as `{"accessToken": "..."}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
}

/// Server error body used for message normalization
///
/// Non-2xx responses carry `{"message": "..."}`; bodies that do not parse
/// into this shape are surfaced as raw text.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}
