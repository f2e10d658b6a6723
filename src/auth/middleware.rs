use super::BearerGate;
use crate::error::AzlinkError;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Bearer gate as axum middleware. Lets the request through with an
/// [`super::AuthenticatedUser`] in its extensions, or answers 401 itself.
pub async fn bearer_auth_middleware(
    State(gate): State<BearerGate>,
    mut req: Request,
    next: Next,
) -> Response {
    tracing::debug!("Incoming request: {} {}", req.method(), req.uri());

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_credential)
        .map(str::to_owned);

    let Some(token) = token else {
        tracing::warn!(
            "Missing or invalid Authorization header for {} {}",
            req.method(),
            req.uri()
        );
        return AzlinkError::MalformedToken("no bearer credential".to_string()).into_response();
    };

    match gate.authenticate(&token).await {
        Ok(user) => {
            tracing::debug!(
                "Bearer token accepted (directory user: {:?})",
                user.user.as_ref().and_then(|u| u.id.as_deref())
            );
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) if e.is_token_rejection() => {
            tracing::warn!("Rejected bearer token: {}", e);
            e.into_response()
        }
        Err(e) => {
            tracing::error!("Could not resolve bearer token user: {}", e);
            e.into_response()
        }
    }
}

/// Credential from an `Authorization` value. The scheme name is matched case-insensitively.
fn bearer_credential(value: &str) -> Option<&str> {
    let (scheme, credential) = value.split_once(' ')?;
    let credential = credential.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !credential.is_empty()).then_some(credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::tests::mint;
    use crate::auth::{AuthenticatedUser, UserDirectory};
    use crate::error::Result;
    use crate::graph::User;
    use async_trait::async_trait;
    use axum::{Extension, Router, body::Body, http::StatusCode, middleware, routing::get};
    use serde_json::{Map, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct OneUser;

    #[async_trait]
    impl UserDirectory for OneUser {
        async fn find_user(&self, email: Option<&str>, _: Option<&str>) -> Result<Option<User>> {
            Ok(Some(User {
                id: Some("obj-1".into()),
                mail: email.map(String::from),
                given_name: None,
                other: Map::new(),
            }))
        }
    }

    fn app() -> Router {
        let gate = BearerGate::new("app-123", Arc::new(OneUser));
        Router::new()
            .route(
                "/me",
                get(|Extension(user): Extension<AuthenticatedUser>| async move {
                    user.user.and_then(|u| u.mail).unwrap_or_default()
                }),
            )
            .layer(middleware::from_fn_with_state(gate, bearer_auth_middleware))
    }

    fn request(auth: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/me");
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        let token = mint(&json!({
            "exp": chrono::Utc::now().timestamp() + 600,
            "aud": "app-123",
            "preferred_username": "ada@x.com"
        }));

        let response = app()
            .oneshot(request(Some(&format!("Bearer {token}"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ada@x.com");
    }

    #[tokio::test]
    async fn test_scheme_is_case_insensitive() {
        let token = mint(&json!({
            "exp": chrono::Utc::now().timestamp() + 600,
            "aud": "app-123",
            "preferred_username": "ada@x.com"
        }));

        for scheme in ["bearer", "BEARER", "BeArEr"] {
            let response = app()
                .oneshot(request(Some(&format!("{scheme} {token}"))))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{scheme}");
        }
    }

    #[test]
    fn test_bearer_credential_parsing() {
        assert_eq!(bearer_credential("Bearer abc"), Some("abc"));
        assert_eq!(bearer_credential("bearer abc"), Some("abc"));
        assert_eq!(bearer_credential("Bearer "), None);
        assert_eq!(bearer_credential("Bearer"), None);
        assert_eq!(bearer_credential("Basic abc"), None);
    }

    #[tokio::test]
    async fn test_rejections_are_401() {
        let expired = mint(&json!({"exp": 1, "aud": "app-123"}));
        let foreign = mint(&json!({
            "exp": chrono::Utc::now().timestamp() + 600,
            "aud": "other-app"
        }));

        for auth in [
            None,
            Some("Basic dXNlcjpwYXNz".to_string()),
            Some("Bearer garbage".to_string()),
            Some(format!("Bearer {expired}")),
            Some(format!("Bearer {foreign}")),
        ] {
            let response = app().oneshot(request(auth.as_deref())).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{auth:?}");
            assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        }
    }
}
