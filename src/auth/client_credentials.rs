use crate::error::{AzlinkError, Result};
use serde::Deserialize;
use std::time::Duration;

/// Microsoft's public-cloud sign-in host
pub const LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";

/// App-only scope: whatever graph application permissions the app was granted
const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials for app-only (client-credentials) access to graph.
#[derive(Clone, Debug)]
pub struct ServiceCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub login_base_url: String,
}

impl ServiceCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tenant_id: tenant_id.into(),
            login_base_url: LOGIN_BASE_URL.to_string(),
        }
    }

    pub fn with_login_base_url(mut self, url: impl Into<String>) -> Self {
        self.login_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_base_url,
            urlencoding::encode(&self.tenant_id)
        )
    }
}

#[derive(Deserialize)]
struct ServiceTokenResponse {
    access_token: String,
}

/// Client-credentials grant against the tenant's token endpoint. Any failure here is
/// a hard directory failure, there's no fallback.
pub async fn acquire_service_token(credentials: &ServiceCredentials) -> Result<String> {
    let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

    let params = [
        ("client_id", credentials.client_id.as_str()),
        ("scope", GRAPH_DEFAULT_SCOPE),
        ("client_secret", credentials.client_secret.as_str()),
        ("grant_type", "client_credentials"),
    ];

    tracing::debug!(
        "Requesting app-only graph token for client_id={}",
        credentials.client_id
    );

    let response = client
        .post(credentials.token_endpoint())
        .form(&params)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        tracing::error!("Service token request failed: HTTP {} - {}", status, body);
        return Err(AzlinkError::DirectoryRequestFailed {
            status: status.as_u16(),
            body,
        });
    }

    let token: ServiceTokenResponse =
        serde_json::from_str(&body).map_err(|e| AzlinkError::DirectoryRequestFailed {
            status: status.as_u16(),
            body: format!("token response missing access_token: {}", e),
        })?;

    Ok(token.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials(server: &MockServer) -> ServiceCredentials {
        ServiceCredentials::new("app-123", "s3cret", "contoso").with_login_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_acquires_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contoso/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains(
                "scope=https%3A%2F%2Fgraph.microsoft.com%2F.default",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "app-only-token"
            })))
            .mount(&server)
            .await;

        let token = acquire_service_token(&credentials(&server)).await.unwrap();
        assert_eq!(token, "app-only-token");
    }

    #[tokio::test]
    async fn test_rejection_is_directory_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contoso/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })))
            .mount(&server)
            .await;

        let err = acquire_service_token(&credentials(&server)).await.unwrap_err();
        match err {
            AzlinkError::DirectoryRequestFailed { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("invalid_client"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
