use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An OAuth2 access token as returned by a token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(skip)]
    pub expiry: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: None,
            refresh_token: None,
            expires_in: None,
            expiry: None,
        }
    }
}

/// An extra query parameter appended to the authorization URL
/// (e.g. `access_type=offline`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCodeOption {
    pub key: String,
    pub value: String,
}

impl AuthCodeOption {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
