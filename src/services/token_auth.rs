use async_trait::async_trait;
use http::HeaderMap;
use std::collections::HashMap;
use std::sync::Arc;
use tower_cookies::Cookies;

use crate::error::{AppError, Result};
use crate::models::auth::AuthOutcome;
use crate::services::authenticator::Authenticator;

/// Maps an API token to the user it belongs to.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn get(&self, token: &str) -> Option<String>;
}

/// A fixed token table, e.g. loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenSource {
    tokens: HashMap<String, String>,
}

impl StaticTokenSource {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    /// Parses `token:user` pairs separated by commas. Blank entries are
    /// ignored; an entry without a `:` is an error.
    pub fn parse(entries: &str) -> Result<Self> {
        let mut tokens = HashMap::new();
        for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, user) = entry.split_once(':').ok_or_else(|| {
                AppError::Config(format!("API token entry '{}' is not token:user", entry))
            })?;
            tokens.insert(token.trim().to_string(), user.trim().to_string());
        }
        Ok(Self { tokens })
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn get(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }
}

/// Header settings for `TokenAuthenticator`.
#[derive(Debug, Clone)]
pub struct TokenAuthSettings {
    pub header: String,
    /// Compared case-insensitively.
    pub prefix: String,
}

impl Default for TokenAuthSettings {
    fn default() -> Self {
        Self {
            header: http::header::AUTHORIZATION.as_str().to_string(),
            prefix: "token".to_string(),
        }
    }
}

/// Authenticates `Authorization: Token <value>` style headers.
pub struct TokenAuthenticator {
    source: Arc<dyn TokenSource>,
    header: String,
    prefix: String,
}

impl TokenAuthenticator {
    pub fn new(source: Arc<dyn TokenSource>, settings: TokenAuthSettings) -> Self {
        Self {
            source,
            header: settings.header,
            prefix: settings.prefix.to_lowercase(),
        }
    }

    /// Pulls the token out of the header, if it has the expected form.
    fn extract<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let value = headers.get(self.header.as_str())?.to_str().ok()?;
        let (prefix, token) = value.split_once(' ')?;
        if prefix.to_lowercase() != self.prefix || token.is_empty() {
            return None;
        }
        Some(token)
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    fn name(&self) -> &'static str {
        "token"
    }

    async fn authenticate(&self, headers: &HeaderMap, _cookies: &Cookies) -> Result<AuthOutcome> {
        let Some(token) = self.extract(headers) else {
            return Ok(AuthOutcome::Skipped);
        };
        match self.source.get(token).await {
            Some(user) => Ok(AuthOutcome::Authenticated(user)),
            None => {
                tracing::warn!("Unknown API token presented");
                Ok(AuthOutcome::Rejected(AppError::not_authorized()))
            }
        }
    }

    async fn logout(&self, _headers: &HeaderMap, _cookies: &Cookies) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use http::HeaderValue;
    use http::header::AUTHORIZATION;

    fn authenticator() -> TokenAuthenticator {
        let source = StaticTokenSource::parse("goodToken:u1").unwrap();
        TokenAuthenticator::new(Arc::new(source), TokenAuthSettings::default())
    }

    async fn run(header: Option<&'static str>) -> AuthOutcome {
        let mut headers = HeaderMap::new();
        if let Some(value) = header {
            headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        }
        let cookies = test_support::cookies(&[]).await;
        authenticator().authenticate(&headers, &cookies).await.unwrap()
    }

    #[tokio::test]
    async fn known_token_resolves_the_user() {
        assert_eq!(run(Some("Token goodToken")).await.user_token(), Some("u1"));
        assert_eq!(run(Some("tOkEn goodToken")).await.user_token(), Some("u1"));
    }

    #[tokio::test]
    async fn other_header_forms_are_skipped() {
        assert!(!run(None).await.is_handled());
        assert!(!run(Some("Basic dXNlcjpwdw==")).await.is_handled());
        assert!(!run(Some("goodToken")).await.is_handled());
    }

    #[tokio::test]
    async fn unknown_token_is_claimed_and_rejected() {
        let outcome = run(Some("Token bad")).await;
        assert!(matches!(outcome, AuthOutcome::Rejected(AppError::NotAuthorized(_))));
    }

    #[test]
    fn parse_rejects_entries_without_user() {
        assert!(StaticTokenSource::parse("a:u1, b:u2,").unwrap().len() == 2);
        assert!(StaticTokenSource::parse("nope").is_err());
        assert!(StaticTokenSource::parse("").unwrap().is_empty());
    }
}
