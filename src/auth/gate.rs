use super::token::{TokenPolicy, decode_unverified};
use super::traits::{Claims, UserDirectory};
use crate::error::{AzlinkError, Result};
use crate::graph::User;
use serde::Serialize;
use std::sync::Arc;

/// What the gate attaches to a request once a token gets through.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub claims: Claims,
    /// `None` when the directory has nobody matching, which isn't an error
    pub user: Option<User>,
    #[serde(skip)]
    pub access_token: String,
}

/// Where a presented credential is in the gate.
#[derive(Debug)]
pub enum Verification {
    Unverified { credential: String },
    Verified(Box<AuthenticatedUser>),
    Rejected { error: AzlinkError },
}

impl Verification {
    pub fn new(credential: impl Into<String>) -> Self {
        Self::Unverified {
            credential: credential.into(),
        }
    }

    /// Runs one transition. `Verified` and `Rejected` stay where they are.
    pub async fn advance(self, gate: &BearerGate) -> Self {
        match self {
            Self::Unverified { credential } => match gate.resolve(credential).await {
                Ok(user) => Self::Verified(Box::new(user)),
                Err(error) => Self::Rejected { error },
            },
            done => done,
        }
    }

    pub fn into_result(self) -> Result<AuthenticatedUser> {
        match self {
            Self::Verified(user) => Ok(*user),
            Self::Rejected { error } => Err(error),
            Self::Unverified { .. } => Err(AzlinkError::MalformedToken(
                "credential was never checked".to_string(),
            )),
        }
    }
}

/// Decodes a bearer token (unverified), applies expiry and audience rules, then
/// looks the caller up in the directory. Every call goes to the directory.
#[derive(Clone)]
pub struct BearerGate {
    policy: TokenPolicy,
    directory: Arc<dyn UserDirectory + Send + Sync>,
}

impl BearerGate {
    pub fn new(
        client_id: impl Into<String>,
        directory: Arc<dyn UserDirectory + Send + Sync>,
    ) -> Self {
        Self {
            policy: TokenPolicy::new(client_id),
            directory,
        }
    }

    pub async fn verify(&self, credential: &str) -> Verification {
        Verification::new(credential).advance(self).await
    }

    pub async fn authenticate(&self, credential: &str) -> Result<AuthenticatedUser> {
        self.verify(credential).await.into_result()
    }

    async fn resolve(&self, credential: String) -> Result<AuthenticatedUser> {
        let claims = decode_unverified(&credential)?;
        self.policy.check(&claims)?;

        let username = claims.username();
        tracing::debug!("Token accepted, resolving directory user {:?}", username);

        let user = self.directory.find_user(username, claims.name()).await?;
        if user.is_none() {
            tracing::debug!("No directory user matched {:?}", username);
        }

        Ok(AuthenticatedUser {
            claims,
            user,
            access_token: credential,
        })
    }
}
