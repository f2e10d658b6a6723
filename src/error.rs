//! Error types for azlink.
//!
//! Every upstream failure is translated into [`AzlinkError`] exactly once, in the
//! graph client, the sign-in flows or the bearer gate. Nothing is retried.

use axum::{
    Json,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzlinkError {
    /// Token isn't three segments, or the claims segment won't decode.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("token has expired")]
    TokenExpired,

    /// Token was issued for some other application.
    #[error("token is not valid for this application")]
    Unauthorized,

    /// Non-2xx from graph or from the client-credentials token endpoint.
    #[error("directory request failed: HTTP {status} - {body}")]
    DirectoryRequestFailed { status: u16, body: String },

    #[error("auth flow failed: {error} :- {description}")]
    AuthFlowFailed { error: String, description: String },

    /// Returned `state` doesn't belong to any pending sign-in (replay, tampering, restart).
    #[error("unknown auth state")]
    UnknownAuthState,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T, E = AzlinkError> = std::result::Result<T, E>;

impl AzlinkError {
    pub(crate) fn flow_failed(error: impl Into<String>, description: Option<&str>) -> Self {
        Self::AuthFlowFailed {
            error: error.into(),
            description: description.unwrap_or("an error occurred").to_string(),
        }
    }

    /// Whether this is one of the token rejections the gate reports as 401.
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken(_) | Self::TokenExpired | Self::Unauthorized
        )
    }

    /// Message safe to hand to the caller. Never carries claim values.
    pub fn user_message(&self) -> &str {
        match self {
            Self::MalformedToken(_) => "Invalid token",
            Self::TokenExpired => "Signature has expired",
            Self::Unauthorized => "User is not authorized to use this application",
            Self::UnknownAuthState => "Sign-in session expired or invalid",
            Self::AuthFlowFailed { .. } => "Sign-in failed",
            Self::DirectoryRequestFailed { .. } | Self::Http(_) => "Directory service unavailable",
            Self::InvalidConfiguration(_) => "Server misconfigured",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedToken(_)
            | Self::TokenExpired
            | Self::Unauthorized
            | Self::UnknownAuthState => StatusCode::UNAUTHORIZED,
            Self::AuthFlowFailed { .. } => StatusCode::BAD_REQUEST,
            Self::DirectoryRequestFailed { .. } | Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidConfiguration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AzlinkError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "detail": self.user_message() }));

        if status == StatusCode::UNAUTHORIZED {
            let mut headers = HeaderMap::new();
            headers.insert(header::WWW_AUTHENTICATE, header::HeaderValue::from_static("Bearer"));
            return (status, headers, body).into_response();
        }

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_rejections_are_unauthorized() {
        for err in [
            AzlinkError::MalformedToken("bad".into()),
            AzlinkError::TokenExpired,
            AzlinkError::Unauthorized,
        ] {
            assert!(err.is_token_rejection());
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_directory_failure_display() {
        let err = AzlinkError::DirectoryRequestFailed {
            status: 403,
            body: "Authorization_RequestDenied".into(),
        };
        assert_eq!(
            err.to_string(),
            "directory request failed: HTTP 403 - Authorization_RequestDenied"
        );
        assert!(!err.is_token_rejection());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_flow_failed_default_description() {
        let err = AzlinkError::flow_failed("invalid_grant", None);
        assert_eq!(err.to_string(), "auth flow failed: invalid_grant :- an error occurred");
    }

    #[test]
    fn test_unauthorized_response_has_challenge() {
        let response = AzlinkError::TokenExpired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }
}
