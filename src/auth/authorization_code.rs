use super::token::decode_unverified;
use super::traits::TokenResult;
use crate::error::{AzlinkError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use url::Url;

/// Scopes azure always hands out on an interactive sign-in. Callers shouldn't have to list them.
const RESERVED_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// PKCE verifier/challenge pair (S256 only)
#[derive(Debug)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    pub fn new() -> Self {
        let mut rng = rand::rng();
        let verifier_bytes: Vec<u8> = (0..32).map(|_| rng.random()).collect();
        let verifier = URL_SAFE_NO_PAD.encode(&verifier_bytes);
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

/// BASE64URL(SHA256(verifier))
pub fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// How the provider hands the authorization response back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    #[default]
    Query,
    FormPost,
    Fragment,
}

impl ResponseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::FormPost => "form_post",
            Self::Fragment => "fragment",
        }
    }
}

/// Per-sign-in overrides for [`super::AuthClient::generate_auth_url`]. Anything left
/// unset falls back to the client's configuration.
#[derive(Debug, Clone, Default)]
pub struct AuthUrlRequest {
    pub redirect_url: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub response_mode: ResponseMode,
    /// Pin the state token instead of generating one
    pub state: Option<String>,
}

pub(crate) struct AuthorizeParams<'a> {
    pub client_id: &'a str,
    pub redirect_url: &'a str,
    pub scopes: &'a [String],
    pub state: &'a str,
    pub nonce: &'a str,
    pub code_challenge: &'a str,
    pub response_mode: ResponseMode,
}

/// Caller scopes plus the reserved OIDC ones, space separated, no duplicates.
pub(crate) fn scope_string(scopes: &[String]) -> String {
    let mut all: Vec<&str> = scopes.iter().map(String::as_str).collect();
    for reserved in RESERVED_SCOPES {
        if !all.contains(&reserved) {
            all.push(reserved);
        }
    }
    all.join(" ")
}

pub(crate) fn authorize_url(endpoint: &str, params: &AuthorizeParams<'_>) -> Result<String> {
    let mut url = Url::parse(endpoint).map_err(|e| {
        AzlinkError::InvalidConfiguration(format!("authority is not a valid URL: {}", e))
    })?;

    url.query_pairs_mut()
        .append_pair("client_id", params.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", params.redirect_url)
        .append_pair("response_mode", params.response_mode.as_str())
        .append_pair("scope", &scope_string(params.scopes))
        .append_pair("state", params.state)
        .append_pair("nonce", params.nonce)
        .append_pair("code_challenge", params.code_challenge)
        .append_pair("code_challenge_method", "S256");

    Ok(url.into())
}

/// Query parameters of the URL the provider redirected back to.
pub fn parse_response_url(url: &str) -> Result<HashMap<String, String>> {
    let url = Url::parse(url)
        .map_err(|e| AzlinkError::flow_failed("invalid_response_url", Some(&e.to_string())))?;
    let params = url.query_pairs().into_owned().collect();
    Ok(params)
}

/// POSTs a grant to the token endpoint. An `error` field anywhere in the answer
/// (azure sends one with every 4xx) becomes `AuthFlowFailed`.
pub(crate) async fn request_token(
    client: &reqwest::Client,
    endpoint: &str,
    params: &[(&str, &str)],
) -> Result<TokenResult> {
    let response = client.post(endpoint).form(params).send().await?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let json: Value = match serde_json::from_str(&body) {
        Ok(json) => json,
        Err(_) => {
            tracing::error!("Token endpoint returned non-JSON: HTTP {} - {}", status, body);
            return Err(AzlinkError::flow_failed(
                format!("http_{}", status.as_u16()),
                Some(&body),
            ));
        }
    };

    if let Some(error) = json.get("error") {
        let error = error.as_str().map(String::from).unwrap_or_else(|| error.to_string());
        let description = json.get("error_description").and_then(Value::as_str);
        tracing::warn!("Token request rejected: {} ({:?})", error, description);
        return Err(AzlinkError::flow_failed(error, description));
    }

    if !status.is_success() {
        return Err(AzlinkError::flow_failed(
            format!("http_{}", status.as_u16()),
            Some(&body),
        ));
    }

    let mut result: TokenResult = serde_json::from_value(json).map_err(|e| {
        AzlinkError::flow_failed("invalid_token_response", Some(&e.to_string()))
    })?;

    if let Some(id_token) = &result.id_token {
        match decode_unverified(id_token) {
            Ok(claims) => result.id_token_claims = Some(claims),
            Err(e) => tracing::warn!("id_token in token response didn't decode: {}", e),
        }
    }

    Ok(result)
}
