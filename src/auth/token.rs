use super::traits::Claims;
use crate::error::{AzlinkError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE};
use chrono::Utc;
use serde_json::Value;

// None of this checks a signature. Tokens are assumed to have come through something
// upstream that already did. If that ever stops being true, verification goes next to
// this, not inside it.

/// Pulls the claims out of a compact JWT without verifying anything.
pub fn decode_unverified(token: &str) -> Result<Claims> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(AzlinkError::MalformedToken(format!(
            "expected 3 segments, got {}",
            segments.len()
        )));
    };

    let mut padded = payload.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }

    let bytes = URL_SAFE
        .decode(padded.as_bytes())
        .map_err(|e| AzlinkError::MalformedToken(format!("claims segment: {}", e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| AzlinkError::MalformedToken(format!("claims segment: {}", e)))?;

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Ok(Claims::new(map)),
        Ok(_) => Err(AzlinkError::MalformedToken(
            "claims segment is not a JSON object".to_string(),
        )),
        Err(e) => Err(AzlinkError::MalformedToken(format!("claims segment: {}", e))),
    }
}

/// Expiry and audience rules applied to decoded claims.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    client_id: String,
}

impl TokenPolicy {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }

    pub fn check(&self, claims: &Claims) -> Result<()> {
        self.check_at(claims, Utc::now().timestamp())
    }

    /// Expiry goes first, so a token that is both expired and for another app reports as expired.
    pub fn check_at(&self, claims: &Claims, now: i64) -> Result<()> {
        Self::check_not_expired(claims, now)?;
        self.check_audience(claims)
    }

    pub fn check_not_expired(claims: &Claims, now: i64) -> Result<()> {
        let expired = match claims.get("exp") {
            None => now >= 0,
            Some(value) => match (value.as_i64(), value.as_f64()) {
                (Some(exp), _) => now >= exp,
                (None, Some(exp)) => now as f64 >= exp,
                (None, None) => {
                    return Err(AzlinkError::MalformedToken("exp is not numeric".to_string()));
                }
            },
        };

        if expired {
            return Err(AzlinkError::TokenExpired);
        }
        Ok(())
    }

    pub fn check_audience(&self, claims: &Claims) -> Result<()> {
        if claims.application_id() != Value::String(self.client_id.clone()) {
            return Err(AzlinkError::Unauthorized);
        }
        Ok(())
    }
}
