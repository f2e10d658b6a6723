use super::{AuthClient, AuthUrlRequest, AuthenticatedUser};
use axum::{
    Extension, Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared state for the sign-in routes
#[derive(Clone)]
pub struct AppState {
    pub auth_client: Arc<AuthClient>,
}

/// GET /login - sends the browser off to azure
pub async fn login_handler(State(state): State<AppState>) -> Response {
    match state
        .auth_client
        .generate_auth_url(AuthUrlRequest::default())
        .await
    {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(e) => {
            tracing::error!("Failed to start sign-in: {}", e);
            e.into_response()
        }
    }
}

/// GET /callback - azure comes back here with `code` and `state`
pub async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match state.auth_client.validate_auth_response(&params).await {
        Ok(token) => (StatusCode::OK, Json(token)).into_response(),
        Err(e) => {
            tracing::warn!("Sign-in callback failed: {}", e);
            e.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub username: String,
    pub password: String,
    /// space separated, like the OAuth `scope` parameter
    pub scope: Option<String>,
}

/// POST /token - password grant for trusted first-party clients
pub async fn password_handler(
    State(state): State<AppState>,
    Form(req): Form<PasswordRequest>,
) -> Response {
    let scopes = req
        .scope
        .map(|s| s.split_whitespace().map(String::from).collect());

    match state
        .auth_client
        .authenticate_email_password(&req.username, &req.password, scopes)
        .await
    {
        Ok(token) => (StatusCode::OK, Json(token)).into_response(),
        Err(e) => {
            // Don't say why
            tracing::warn!("Password sign-in failed for {}: {}", req.username, e);
            e.into_response()
        }
    }
}

/// GET /me - whoever the bearer gate let in
pub async fn me_handler(Extension(user): Extension<AuthenticatedUser>) -> Response {
    (StatusCode::OK, Json(user)).into_response()
}

/// GET /me/photo - caller's profile photo as a data URI
pub async fn me_photo_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Response {
    let Some(object_id) = user.user.and_then(|u| u.id) else {
        return (StatusCode::NOT_FOUND, "no directory user for this token").into_response();
    };

    let photo = async {
        let graph = state.auth_client.graph_client(None).await?;
        graph.get_user_photo(&object_id).await
    };

    match photo.await {
        Ok(Some(data_uri)) => {
            (StatusCode::OK, Json(serde_json::json!({ "photo": data_uri }))).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "no photo").into_response(),
        Err(e) => {
            tracing::error!("Photo lookup failed for {}: {}", object_id, e);
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthClientConfig;
    use axum::{
        Router,
        body::Body,
        http::{Request, header},
        routing::{get, post},
    };
    use tower::ServiceExt;

    fn app() -> Router {
        let client = AuthClient::new(AuthClientConfig {
            client_id: "app-123".into(),
            client_secret: "s3cret".into(),
            tenant_id: "contoso".into(),
            redirect_url: Some("http://localhost:8000/callback".into()),
            ..Default::default()
        })
        .unwrap();

        Router::new()
            .route("/login", get(login_handler))
            .route("/callback", get(callback_handler))
            .route("/token", post(password_handler))
            .with_state(AppState {
                auth_client: Arc::new(client),
            })
    }

    #[tokio::test]
    async fn test_login_redirects_to_authority() {
        let response = app()
            .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with(
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/authorize?"
        ));
        assert!(location.contains("client_id=app-123"));
    }

    #[tokio::test]
    async fn test_callback_with_unknown_state_is_401() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/callback?code=abc&state=never-issued")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_token_requires_form_fields() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/token")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("username=ada%40x.com"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
