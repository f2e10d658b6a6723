use crate::error::{AzlinkError, Result};
use std::fmt;
use std::str::FromStr;

use super::client_credentials::LOGIN_BASE_URL;

/// Which flavour of azure sign-in the tenant uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AuthMode {
    /// Azure AD (entra id) workforce tenant
    #[default]
    Ad,
    /// Azure AD B2C, always behind a user flow
    B2c,
}

impl FromStr for AuthMode {
    type Err = AzlinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ad" => Ok(Self::Ad),
            "b2c" => Ok(Self::B2c),
            other => Err(AzlinkError::InvalidConfiguration(format!(
                "Invalid authentication mode '{}'. Supported modes: ad, b2c",
                other
            ))),
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ad => write!(f, "ad"),
            Self::B2c => write!(f, "b2c"),
        }
    }
}

/// The identity provider base URL tokens are issued against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authority {
    AzureAd { tenant: String },
    B2c { tenant: String, user_flow: String },
    /// Caller-supplied authority, used verbatim
    Custom(String),
}

impl Authority {
    /// B2C without a user flow has no authority at all, so that's refused here
    /// rather than left for the token endpoint to choke on.
    pub fn for_mode(mode: AuthMode, tenant: &str, user_flow: Option<&str>) -> Result<Self> {
        match (mode, user_flow) {
            (AuthMode::Ad, _) => Ok(Self::AzureAd {
                tenant: tenant.to_string(),
            }),
            (AuthMode::B2c, Some(flow)) if !flow.is_empty() => Ok(Self::B2c {
                tenant: tenant.to_string(),
                user_flow: flow.to_string(),
            }),
            (AuthMode::B2c, _) => Err(AzlinkError::InvalidConfiguration(
                "b2c mode requires a user flow (e.g. B2C_1_signin)".to_string(),
            )),
        }
    }

    pub fn url(&self) -> String {
        match self {
            Self::AzureAd { tenant } => format!("{}/{}", LOGIN_BASE_URL, tenant),
            Self::B2c { tenant, user_flow } => format!(
                "https://{tenant}.b2clogin.com/{tenant}.onmicrosoft.com/{user_flow}"
            ),
            Self::Custom(url) => url.trim_end_matches('/').to_string(),
        }
    }

    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/authorize", self.url())
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.url())
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_b2c_authority() {
        let authority = Authority::for_mode(AuthMode::B2c, "contoso", Some("B2C_1_signin")).unwrap();
        assert_eq!(
            authority.url(),
            "https://contoso.b2clogin.com/contoso.onmicrosoft.com/B2C_1_signin"
        );
        assert_eq!(
            authority.token_endpoint(),
            "https://contoso.b2clogin.com/contoso.onmicrosoft.com/B2C_1_signin/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_ad_authority_ignores_user_flow() {
        let authority = Authority::for_mode(AuthMode::Ad, "contoso", Some("B2C_1_signin")).unwrap();
        assert_eq!(authority.url(), "https://login.microsoftonline.com/contoso");
    }

    #[test]
    fn test_b2c_without_user_flow() {
        for flow in [None, Some("")] {
            assert!(matches!(
                Authority::for_mode(AuthMode::B2c, "contoso", flow),
                Err(AzlinkError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("ad".parse::<AuthMode>().unwrap(), AuthMode::Ad);
        assert_eq!("b2c".parse::<AuthMode>().unwrap(), AuthMode::B2c);
        assert!(matches!(
            "saml".parse::<AuthMode>(),
            Err(AzlinkError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_custom_authority_trims_slash() {
        let authority = Authority::Custom("http://127.0.0.1:9999/tenant/".into());
        assert_eq!(
            authority.authorize_endpoint(),
            "http://127.0.0.1:9999/tenant/oauth2/v2.0/authorize"
        );
    }
}
