use anyhow::{Context, Result, ensure};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;
use zeroize::Zeroizing;

use crate::crypto::keystore::DEFAULT_KEY_FILE;
use crate::services::database_auth::{DEFAULT_LOGIN_PATH, DatabaseAuthSettings};
use crate::services::oauth::OAuth2Settings;
use crate::services::session::{DEFAULT_COOKIE_NAME, SessionSettings};
use crate::services::token_auth::{StaticTokenSource, TokenAuthSettings};

/// A single OAuth provider, enabled when `OAUTH_CLIENT_ID` is set.
#[derive(Clone)]
pub struct OAuthConfig {
    /// Routes are mounted at `{base_path}/login` and `{base_path}/callback`.
    pub base_path: String,
    pub client_id: String,
    pub client_secret: Zeroizing<String>,
    pub auth_url: Url,
    pub token_url: Url,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    /// Where the browser lands after a successful OAuth login.
    pub post_login_path: String,
}

impl OAuthConfig {
    pub fn client_settings(&self) -> OAuth2Settings {
        OAuth2Settings {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.as_str().to_string(),
            auth_url: self.auth_url.clone(),
            token_url: self.token_url.clone(),
            redirect_url: self.redirect_url.clone(),
            scopes: self.scopes.clone(),
        }
    }
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The address the server binds to.
    pub bind_addr: SocketAddr,
    /// Whether cookies carry the `Secure` attribute.
    pub secure_cookie: bool,
    pub session_cookie_name: String,
    /// Base cookie domain; empty for host-only cookies.
    pub cookie_domain: String,
    /// Directory holding the RSA key files.
    pub key_dir: PathBuf,
    pub session_key_file: String,
    pub csrf_key_file: String,
    pub session_validity: Duration,
    pub revocation_flush_interval: Duration,
    pub csrf_validity: Duration,
    pub login_path: String,
    /// Empty means a successful login answers 200 instead of redirecting.
    pub login_redirect_path: String,
    pub token_header: String,
    pub token_prefix: String,
    /// API tokens mapped to user IDs.
    pub api_tokens: HashMap<String, String>,
    /// Paths exempt from CSRF checks (`:param` allowed).
    pub csrf_ignore_paths: Vec<String>,
    /// Static assets served for unmatched routes.
    pub static_dir: Option<PathBuf>,
    pub oauth: Option<OAuthConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            secure_cookie: false,
            session_cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_domain: String::new(),
            key_dir: PathBuf::from("."),
            session_key_file: DEFAULT_KEY_FILE.to_string(),
            csrf_key_file: DEFAULT_KEY_FILE.to_string(),
            session_validity: Duration::from_secs(48 * 3600),
            revocation_flush_interval: Duration::from_secs(15 * 60),
            csrf_validity: Duration::from_secs(12 * 3600),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            login_redirect_path: "/".to_string(),
            token_header: "Authorization".to_string(),
            token_prefix: "token".to_string(),
            api_tokens: HashMap::new(),
            csrf_ignore_paths: Vec::new(),
            static_dir: None,
            oauth: None,
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var_or(name, default)
        .parse()
        .with_context(|| format!("Invalid {}", name))
}

/// Upper bound for validity windows (ten years).
const MAX_VALIDITY_HOURS: u64 = 10 * 365 * 24;

/// `value` units of `unit_secs` seconds, rejecting zero and anything past
/// `MAX_VALIDITY_HOURS`.
fn bounded_duration(name: &str, value: u64, unit_secs: u64) -> Result<Duration> {
    let max = MAX_VALIDITY_HOURS * 3600 / unit_secs;
    ensure!(
        (1..=max).contains(&value),
        "{} must be between 1 and {}, got {}",
        name,
        max,
        value
    );
    Ok(Duration::from_secs(value * unit_secs))
}

fn hours(name: &str, default: &str) -> Result<Duration> {
    bounded_duration(name, parse_var::<u64>(name, default)?, 3600)
}

fn minutes(name: &str, default: &str) -> Result<Duration> {
    bounded_duration(name, parse_var::<u64>(name, default)?, 60)
}

fn list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let is_production = var_or("APP_ENV", "development") == "production";
        let secure_default = if is_production { "true" } else { "false" };

        let session_key_file = var_or("SESSION_KEY_FILE", DEFAULT_KEY_FILE);
        let api_tokens = StaticTokenSource::parse(&var_or("API_TOKENS", ""))
            .map_err(|e| anyhow::anyhow!("Invalid API_TOKENS: {}", e))?;

        Ok(Self {
            bind_addr: parse_var("BIND_ADDR", "127.0.0.1:3000")?,
            secure_cookie: parse_var("SECURE_COOKIE", secure_default)?,
            session_cookie_name: var_or("SESSION_COOKIE_NAME", DEFAULT_COOKIE_NAME),
            cookie_domain: var_or("COOKIE_DOMAIN", ""),
            key_dir: PathBuf::from(var_or("KEY_DIR", ".")),
            csrf_key_file: var_or("CSRF_KEY_FILE", &session_key_file),
            session_key_file,
            session_validity: hours("SESSION_VALIDITY_HOURS", "48")?,
            revocation_flush_interval: minutes("REVOCATION_FLUSH_MINUTES", "15")?,
            csrf_validity: hours("CSRF_VALIDITY_HOURS", "12")?,
            login_path: var_or("LOGIN_PATH", DEFAULT_LOGIN_PATH),
            login_redirect_path: var_or("LOGIN_REDIRECT_PATH", "/"),
            token_header: var_or("TOKEN_HEADER", "Authorization"),
            token_prefix: var_or("TOKEN_PREFIX", "token"),
            api_tokens: api_tokens.into_map(),
            csrf_ignore_paths: list(&var_or("CSRF_IGNORE_PATHS", ""), ','),
            static_dir: env::var("STATIC_DIR").ok().map(PathBuf::from),
            oauth: Self::oauth_from_env()?,
        })
    }

    fn oauth_from_env() -> Result<Option<OAuthConfig>> {
        let Ok(client_id) = env::var("OAUTH_CLIENT_ID") else {
            return Ok(None);
        };
        Ok(Some(OAuthConfig {
            base_path: var_or("OAUTH_BASE_PATH", "/oauth"),
            client_id,
            client_secret: Zeroizing::new(
                env::var("OAUTH_CLIENT_SECRET").context("OAUTH_CLIENT_SECRET must be set")?,
            ),
            auth_url: env::var("OAUTH_AUTH_URL")
                .context("OAUTH_AUTH_URL must be set")?
                .parse::<Url>()
                .context("Invalid OAUTH_AUTH_URL")?,
            token_url: env::var("OAUTH_TOKEN_URL")
                .context("OAUTH_TOKEN_URL must be set")?
                .parse::<Url>()
                .context("Invalid OAUTH_TOKEN_URL")?,
            redirect_url: var_or("OAUTH_REDIRECT_URL", ""),
            scopes: list(&var_or("OAUTH_SCOPES", ""), ' '),
            post_login_path: var_or("OAUTH_POST_LOGIN_PATH", "/"),
        }))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            cookie_name: self.session_cookie_name.clone(),
            cookie_domain: self.cookie_domain.clone(),
            secure_cookie: self.secure_cookie,
            validity: self.session_validity,
        }
    }

    pub fn token_settings(&self) -> TokenAuthSettings {
        TokenAuthSettings {
            header: self.token_header.clone(),
            prefix: self.token_prefix.clone(),
        }
    }

    pub fn database_auth_settings(&self) -> DatabaseAuthSettings {
        DatabaseAuthSettings {
            login_path: self.login_path.clone(),
            redirect_path: self.login_redirect_path.clone(),
        }
    }
}
