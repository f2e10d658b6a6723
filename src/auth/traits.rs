use crate::error::Result;
use crate::graph::User;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::session::PendingFlow;

// async_trait my beloved. still rocks

/// Claims carried in a token's middle segment. Trusted as-is: nothing here has
/// been signature-checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// String claim, with `""` treated as missing
    fn str_claim(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// `appid` on AD tokens, `aud` on B2C ones. Number 0 when neither is there.
    pub fn application_id(&self) -> Value {
        self.0
            .get("appid")
            .or_else(|| self.0.get("aud"))
            .cloned()
            .unwrap_or_else(|| Value::from(0))
    }

    pub fn preferred_username(&self) -> Option<&str> {
        self.str_claim("preferred_username")
    }

    /// B2C puts sign-in addresses in an `emails` array
    pub fn emails(&self) -> Vec<&str> {
        self.0
            .get("emails")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn name(&self) -> Option<&str> {
        self.str_claim("name")
    }

    /// `preferred_username`, else the first of `emails`
    pub fn username(&self) -> Option<&str> {
        self.preferred_username()
            .or_else(|| self.emails().into_iter().next())
    }
}

/// Response from an identity provider token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResult {
    /// Absent when only the OIDC scopes were asked for (B2C answers with just an id_token)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>, // seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Unverified claims of `id_token`, filled in after the exchange
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_claims: Option<Claims>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Where the gate resolves a token's subject to a user record.
#[async_trait]
pub trait UserDirectory {
    async fn find_user(&self, email: Option<&str>, given_name: Option<&str>)
    -> Result<Option<User>>;
}

/// Keeps pending sign-ins between the redirect and the callback.
#[async_trait]
pub trait SessionStore {
    async fn insert(&self, state: String, flow: PendingFlow);

    /// Removes and returns the flow, so a state can only be redeemed once.
    async fn take(&self, state: &str) -> Option<PendingFlow>;
}
