//! Microsoft Graph client for the users collection, profile photos and
//! directory schema extensions.

use crate::auth::{ServiceCredentials, UserDirectory, acquire_service_token};
use crate::error::{AzlinkError, Result};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use urlencoding::encode as urlencode;

/// Base URL for Microsoft Graph API.
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Graph answers photo reads with whatever it has; we always label it png
const PHOTO_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// A directory user. Only the fields we filter on are typed, the rest ride along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Object id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl User {
    fn matches(&self, email: Option<&str>, given_name: Option<&str>) -> bool {
        let mail_matches = email.is_some() && self.mail.as_deref() == email;
        let name_matches = match (self.given_name.as_deref(), given_name) {
            (Some(ours), Some(theirs)) => ours.to_lowercase() == theirs.to_lowercase(),
            _ => false,
        };
        mail_matches || name_matches
    }
}

#[derive(Debug, Deserialize)]
struct UserCollection {
    value: Vec<User>,
}

#[derive(Clone)]
pub struct GraphClient {
    client: Client,
    base_url: String,
    access_token: String,
    /// app id (client id) that schema extensions get registered against
    application_id: Option<String>,
}

impl GraphClient {
    /// Graph client that calls with a token the caller already has.
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: GRAPH_BASE_URL.to_string(),
            access_token: access_token.into(),
            application_id: None,
        })
    }

    /// Graph client that fetches its own app-only token. The token is kept for the
    /// life of this client and never refreshed.
    pub async fn with_client_credentials(credentials: &ServiceCredentials) -> Result<Self> {
        let token = acquire_service_token(credentials).await?;
        Ok(Self::new(token)?.with_application(credentials.client_id.clone()))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_application(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    fn users_url(&self) -> String {
        format!("{}/users", self.base_url)
    }

    fn user_url(&self, object_id: &str) -> String {
        format!("{}/users/{}", self.base_url, urlencode(object_id))
    }

    fn photo_url(&self, object_id: &str) -> String {
        format!("{}/photo/$value", self.user_url(object_id))
    }

    /// Turns a non-2xx into `DirectoryRequestFailed`, keeping graph's body for the caller.
    async fn check(response: Response, what: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::error!("Graph {} failed: HTTP {} - {}", what, status, body);
        Err(AzlinkError::DirectoryRequestFailed {
            status: status.as_u16(),
            body,
        })
    }

    pub async fn get_user(&self, object_id: &str) -> Result<User> {
        let response = self
            .client
            .get(self.user_url(object_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let user = Self::check(response, "user read").await?.json().await?;
        Ok(user)
    }

    /// Pulls the whole users collection and returns the first record whose mail
    /// matches `email` or whose given name matches `given_name` (ignoring case).
    /// Whichever comes first in graph's order wins.
    pub async fn find_user(
        &self,
        email: Option<&str>,
        given_name: Option<&str>,
    ) -> Result<Option<User>> {
        let response = self
            .client
            .get(self.users_url())
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let users: UserCollection = Self::check(response, "user list").await?.json().await?;
        tracing::debug!("Filtering {} directory users", users.value.len());

        Ok(users
            .value
            .into_iter()
            .find(|user| user.matches(email, given_name)))
    }

    /// PATCH semantics are graph's. It usually answers 204, so there's often nothing to return.
    pub async fn update_user(&self, object_id: &str, updates: &Value) -> Result<Option<Value>> {
        let response = self
            .client
            .patch(self.user_url(object_id))
            .bearer_auth(&self.access_token)
            .json(updates)
            .send()
            .await?;

        let body = Self::check(response, "user update").await?.bytes().await?;
        if body.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| AzlinkError::DirectoryRequestFailed {
                status: 200,
                body: format!("unparseable update response: {}", e),
            })
    }

    pub async fn create_user(&self, fields: &Value) -> Result<User> {
        let response = self
            .client
            .post(self.users_url())
            .bearer_auth(&self.access_token)
            .json(fields)
            .send()
            .await?;

        let user: User = Self::check(response, "user create").await?.json().await?;
        tracing::info!("Created directory user {:?}", user.id);
        Ok(user)
    }

    pub async fn delete_user(&self, object_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.user_url(object_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        Self::check(response, "user delete").await?;
        tracing::info!("Deleted directory user {}", object_id);
        Ok(())
    }

    /// Profile photo as a png data URI. `None` when the user simply has no photo.
    pub async fn get_user_photo(&self, object_id: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.photo_url(object_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let bytes = Self::check(response, "photo read").await?.bytes().await?;
        Ok(Some(format!("{}{}", PHOTO_DATA_URI_PREFIX, BASE64.encode(&bytes))))
    }

    /// Uploads raw image bytes. `content_type` defaults to `image/png`.
    pub async fn update_user_photo(
        &self,
        object_id: &str,
        image: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()> {
        let response = self
            .client
            .put(self.photo_url(object_id))
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, content_type.unwrap_or("image/png"))
            .body(image)
            .send()
            .await?;

        Self::check(response, "photo upload").await?;
        Ok(())
    }

    /// Registers a custom user attribute on the application. `targetObjects` is
    /// always overwritten to `["User"]`.
    pub async fn create_user_field(&self, fields: Map<String, Value>) -> Result<Value> {
        let application_id = self.application_id.as_deref().ok_or_else(|| {
            AzlinkError::InvalidConfiguration(
                "schema extensions need the application (client) id".to_string(),
            )
        })?;

        let mut payload = fields;
        payload.insert("targetObjects".to_string(), serde_json::json!(["User"]));

        let url = format!(
            "{}/applications(appId='{}')/extensionProperties",
            self.base_url,
            urlencode(application_id)
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;

        let created = Self::check(response, "extension registration").await?.json().await?;
        Ok(created)
    }
}

/// Directory used by the bearer gate in production: every lookup gets a fresh
/// app-only token and a fresh graph client, nothing is cached between requests.
#[derive(Clone)]
pub struct ServiceDirectory {
    credentials: ServiceCredentials,
    base_url: String,
}

impl ServiceDirectory {
    pub fn new(credentials: ServiceCredentials) -> Self {
        Self {
            credentials,
            base_url: GRAPH_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl UserDirectory for ServiceDirectory {
    async fn find_user(
        &self,
        email: Option<&str>,
        given_name: Option<&str>,
    ) -> Result<Option<User>> {
        let graph = GraphClient::with_client_credentials(&self.credentials)
            .await?
            .with_base_url(self.base_url.clone());
        graph.find_user(email, given_name).await
    }
}

#[async_trait]
impl UserDirectory for GraphClient {
    async fn find_user(
        &self,
        email: Option<&str>,
        given_name: Option<&str>,
    ) -> Result<Option<User>> {
        GraphClient::find_user(self, email, given_name).await
    }
}
