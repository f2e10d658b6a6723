mod authority;
mod authorization_code;
mod client_credentials;
mod gate;
mod handlers;
mod middleware;
mod session;
pub(crate) mod token;
mod traits;

pub use authority::{AuthMode, Authority};
pub use authorization_code::{
    AuthUrlRequest, PkceChallenge, ResponseMode, challenge_for, parse_response_url,
};
pub use client_credentials::{LOGIN_BASE_URL, ServiceCredentials, acquire_service_token};
pub use gate::{AuthenticatedUser, BearerGate, Verification};
pub use handlers::{AppState, callback_handler, login_handler, me_handler, me_photo_handler, password_handler};
pub use middleware::bearer_auth_middleware;
pub use session::{MemorySessionStore, PendingFlow};
pub use token::{TokenPolicy, decode_unverified};
pub use traits::{Claims, SessionStore, TokenResult, UserDirectory};

use crate::error::{AzlinkError, Result};
use crate::graph::{GRAPH_BASE_URL, GraphClient, ServiceDirectory};
use authorization_code::{AuthorizeParams, authorize_url, request_token, scope_string};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the sign-in client
#[derive(Clone, Debug, Default)]
pub struct AuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Tenant id or name, e.g. `contoso`
    pub tenant_id: String,
    /// Tenant used for app-only graph access. Defaults to `tenant_id`.
    pub oauth_tenant_id: Option<String>,
    /// Skip building the authority from mode/tenant and use this one
    pub authority: Option<String>,
    pub b2c_user_flow: Option<String>,
    pub redirect_url: Option<String>,
    pub scopes: Vec<String>,
    pub mode: AuthMode,
}

/// Entry point: owns the app registration's credentials, runs the interactive and
/// password sign-ins, and hands out graph clients and bearer gates that share them.
#[derive(Clone)]
pub struct AuthClient {
    client_id: String,
    client_secret: String,
    oauth_tenant_id: String,
    authority: Authority,
    redirect_url: Option<String>,
    scopes: Vec<String>,
    sessions: Arc<dyn SessionStore + Send + Sync>,
    http: reqwest::Client,
    login_base_url: String,
    graph_base_url: String,
}

impl AuthClient {
    pub fn new(config: AuthClientConfig) -> Result<Self> {
        Self::with_session_store(config, Arc::new(MemorySessionStore::new()))
    }

    /// Same as [`AuthClient::new`] but with a caller-owned session store.
    pub fn with_session_store(
        config: AuthClientConfig,
        sessions: Arc<dyn SessionStore + Send + Sync>,
    ) -> Result<Self> {
        if config.client_id.is_empty() {
            return Err(AzlinkError::InvalidConfiguration(
                "client_id is required".to_string(),
            ));
        }

        let authority = match config.authority {
            Some(url) => Authority::Custom(url),
            None => Authority::for_mode(
                config.mode,
                &config.tenant_id,
                config.b2c_user_flow.as_deref(),
            )?,
        };

        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        tracing::debug!("Sign-in authority: {}", authority);

        Ok(Self {
            oauth_tenant_id: config.oauth_tenant_id.unwrap_or(config.tenant_id),
            client_id: config.client_id,
            client_secret: config.client_secret,
            authority,
            redirect_url: config.redirect_url,
            scopes: config.scopes,
            sessions,
            http,
            login_base_url: LOGIN_BASE_URL.to_string(),
            graph_base_url: GRAPH_BASE_URL.to_string(),
        })
    }

    /// Point app-only token requests and graph calls somewhere else (tests, sovereign clouds).
    pub fn with_service_endpoints(
        mut self,
        login_base_url: impl Into<String>,
        graph_base_url: impl Into<String>,
    ) -> Self {
        self.login_base_url = login_base_url.into();
        self.graph_base_url = graph_base_url.into();
        self
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Builds the browser redirect for an interactive sign-in and remembers the flow
    /// under its state token until the callback comes back.
    pub async fn generate_auth_url(&self, request: AuthUrlRequest) -> Result<String> {
        let redirect_url = request
            .redirect_url
            .or_else(|| self.redirect_url.clone())
            .ok_or_else(|| {
                AzlinkError::InvalidConfiguration(
                    "a redirect URL is required for interactive sign-in".to_string(),
                )
            })?;
        let scopes = request.scopes.unwrap_or_else(|| self.scopes.clone());
        let state = request.state.unwrap_or_else(|| Uuid::new_v4().to_string());
        let nonce = Uuid::new_v4().to_string();
        let pkce = PkceChallenge::new();

        let url = authorize_url(
            &self.authority.authorize_endpoint(),
            &AuthorizeParams {
                client_id: &self.client_id,
                redirect_url: &redirect_url,
                scopes: &scopes,
                state: &state,
                nonce: &nonce,
                code_challenge: &pkce.challenge,
                response_mode: request.response_mode,
            },
        )?;

        let flow = PendingFlow {
            redirect_url,
            scopes,
            code_verifier: pkce.verifier,
            nonce,
            created_at: Instant::now(),
        };
        self.sessions.insert(state.clone(), flow).await;

        tracing::info!("Started interactive sign-in (state={})", state);
        Ok(url)
    }

    /// Finishes an interactive sign-in from the parameters the provider sent back
    /// (see [`parse_response_url`]). A state can only be redeemed once.
    pub async fn validate_auth_response(
        &self,
        response: &HashMap<String, String>,
    ) -> Result<TokenResult> {
        let state = response.get("state").ok_or(AzlinkError::UnknownAuthState)?;

        let flow = match self.sessions.take(state).await {
            Some(flow) => flow,
            None => {
                tracing::warn!("Auth response for unknown or expired state: {}", state);
                return Err(AzlinkError::UnknownAuthState);
            }
        };

        if let Some(error) = response.get("error") {
            return Err(AzlinkError::flow_failed(
                error.as_str(),
                response.get("error_description").map(String::as_str),
            ));
        }

        let code = response.get("code").ok_or_else(|| {
            AzlinkError::flow_failed("invalid_request", Some("auth response has no code"))
        })?;

        let scope = scope_string(&flow.scopes);
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", flow.redirect_url.as_str()),
            ("code_verifier", flow.code_verifier.as_str()),
            ("scope", scope.as_str()),
        ];

        let result = request_token(&self.http, &self.authority.token_endpoint(), &params).await?;

        if let Some(claims) = &result.id_token_claims {
            let nonce = claims.get("nonce").and_then(serde_json::Value::as_str);
            if nonce.is_some_and(|n| n != flow.nonce) {
                return Err(AzlinkError::flow_failed(
                    "invalid_nonce",
                    Some("id_token nonce doesn't match the sign-in request"),
                ));
            }
        }

        tracing::info!("Completed interactive sign-in (state={})", state);
        Ok(result)
    }

    /// Resource-owner password grant. Only for first-party clients, and only AD
    /// tenants support it.
    pub async fn authenticate_email_password(
        &self,
        email: &str,
        password: &str,
        scopes: Option<Vec<String>>,
    ) -> Result<TokenResult> {
        let scopes = scopes.unwrap_or_else(|| self.scopes.clone());
        let scope = scope_string(&scopes);
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "password"),
            ("username", email),
            ("password", password),
            ("scope", scope.as_str()),
        ];

        let result = request_token(&self.http, &self.authority.token_endpoint(), &params).await?;
        tracing::info!("Password sign-in succeeded for {}", email);
        Ok(result)
    }

    fn service_credentials(&self) -> ServiceCredentials {
        ServiceCredentials::new(
            self.client_id.clone(),
            self.client_secret.clone(),
            self.oauth_tenant_id.clone(),
        )
        .with_login_base_url(self.login_base_url.clone())
    }

    /// Graph client using `access_token`, or an app-only token fetched now if none is given.
    pub async fn graph_client(&self, access_token: Option<String>) -> Result<GraphClient> {
        let client = match access_token {
            Some(token) => GraphClient::new(token)?.with_application(self.client_id.clone()),
            None => GraphClient::with_client_credentials(&self.service_credentials()).await?,
        };
        Ok(client.with_base_url(self.graph_base_url.clone()))
    }

    /// Gate for this app's client id, resolving users through app-only graph access.
    pub fn bearer_gate(&self) -> BearerGate {
        let directory = ServiceDirectory::new(self.service_credentials())
            .with_base_url(self.graph_base_url.clone());
        BearerGate::new(self.client_id.clone(), Arc::new(directory))
    }
}
