use async_trait::async_trait;
use axum::{
    Router,
    extract::{Query, Request, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use base64::{Engine as _, engine::general_purpose};
use http::request::Parts;
use http::{HeaderMap, HeaderValue, header};
use serde::Deserialize;
use std::sync::Arc;
use tower_cookies::Cookies;
use url::{Url, form_urlencoded};

use crate::error::{AppError, Result};
use crate::models::auth::AuthOutcome;
use crate::models::oauth::{AccessToken, AuthCodeOption};
use crate::services::authenticator::Authenticator;
use crate::services::session::SessionStore;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// The two calls the handshake needs from an OAuth2 provider.
#[async_trait]
pub trait OAuth2Client: Send + Sync {
    /// The provider URL the browser is sent to.
    fn auth_code_url(&self, state: &str, options: &[AuthCodeOption]) -> String;

    /// Trades an authorization code for an access token.
    async fn exchange(&self, code: &str) -> Result<AccessToken>;
}

/// Client credentials and endpoints of a provider.
#[derive(Debug, Clone)]
pub struct OAuth2Settings {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: Url,
    pub token_url: Url,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

/// Authorization-code flow against a standard token endpoint.
pub struct StandardOAuth2Client {
    settings: OAuth2Settings,
    http: reqwest::Client,
}

impl StandardOAuth2Client {
    pub fn new(settings: OAuth2Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { settings, http })
    }
}

#[async_trait]
impl OAuth2Client for StandardOAuth2Client {
    fn auth_code_url(&self, state: &str, options: &[AuthCodeOption]) -> String {
        let mut url = self.settings.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.settings.client_id);
            if !self.settings.redirect_url.is_empty() {
                query.append_pair("redirect_uri", &self.settings.redirect_url);
            }
            if !self.settings.scopes.is_empty() {
                query.append_pair("scope", &self.settings.scopes.join(" "));
            }
            query.append_pair("state", state);
            for option in options {
                query.append_pair(&option.key, &option.value);
            }
        }
        url.into()
    }

    async fn exchange(&self, code: &str) -> Result<AccessToken> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
        ];
        if !self.settings.redirect_url.is_empty() {
            form.push(("redirect_uri", self.settings.redirect_url.as_str()));
        }

        let response = self
            .http
            .post(self.settings.token_url.clone())
            .header(header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Collaborator(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Collaborator(format!(
                "{} - {}",
                self.settings.token_url,
                response.status()
            )));
        }

        let mut token: AccessToken = response
            .json()
            .await
            .map_err(|e| AppError::Collaborator(format!("Malformed token response: {}", e)))?;
        token.expiry = token
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs));
        Ok(token)
    }
}

/// What to do once the provider handed back a token. Implementations
/// usually resolve the user, create a session and redirect.
#[async_trait]
pub trait PostCallback: Send + Sync {
    async fn call(
        &self,
        parts: &Parts,
        cookies: &Cookies,
        token: AccessToken,
        state: String,
    ) -> Result<Response>;
}

/// Computes the raw OAuth state for a start request.
pub type StateFn = Arc<dyn Fn(&Parts) -> Result<String> + Send + Sync>;

/// Builds an authenticated HTTP client for a token.
pub type ClientFn = Arc<dyn Fn(&AccessToken) -> Result<reqwest::Client> + Send + Sync>;

/// One OAuth provider mounted under `base_path`.
pub struct Provider {
    pub base_path: String,
    pub client: Arc<dyn OAuth2Client>,
    pub post_callback: Arc<dyn PostCallback>,
    pub options: Vec<AuthCodeOption>,
    pub set_state: Option<StateFn>,
    pub new_client: Option<ClientFn>,
}

impl Provider {
    pub fn new(
        base_path: impl Into<String>,
        client: Arc<dyn OAuth2Client>,
        post_callback: Arc<dyn PostCallback>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            client,
            post_callback,
            options: Vec::new(),
            set_state: None,
            new_client: None,
        }
    }

    pub fn with_options(mut self, options: Vec<AuthCodeOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_state(mut self, set_state: StateFn) -> Self {
        self.set_state = Some(set_state);
        self
    }

    pub fn with_client(mut self, new_client: ClientFn) -> Self {
        self.new_client = Some(new_client);
        self
    }

    /// An HTTP client that sends `token` as a bearer credential, unless
    /// `new_client` overrides it.
    pub fn client(&self, token: &AccessToken) -> Result<reqwest::Client> {
        if let Some(new_client) = &self.new_client {
            return new_client(token);
        }
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.access_token))
            .map_err(|e| AppError::BadRequest(format!("Access token is not a header value: {}", e)))?;
        bearer.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, bearer);
        reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
    }
}

/// The set of registered providers. Frozen once `routes` is called.
#[derive(Default)]
pub struct OAuth {
    providers: Vec<Arc<Provider>>,
}

impl OAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_provider(&mut self, provider: Provider) {
        tracing::info!("🔐 OAuth provider registered at {}", provider.base_path);
        self.providers.push(Arc::new(provider));
    }

    /// `GET {base}/login` and `GET {base}/callback` for every provider.
    pub fn routes<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.providers.iter().fold(Router::new(), |router, provider| {
            let base = provider.base_path.trim_end_matches('/');
            router
                .route(
                    &format!("{}/login", base),
                    get(oauth_start).with_state(provider.clone()),
                )
                .route(
                    &format!("{}/callback", base),
                    get(oauth_callback).with_state(provider.clone()),
                )
        })
    }
}

/// Redirects the browser to the provider.
async fn oauth_start(State(provider): State<Arc<Provider>>, request: Request) -> Result<Response> {
    let (parts, _) = request.into_parts();
    let state = match &provider.set_state {
        Some(set_state) => general_purpose::STANDARD.encode(set_state(&parts)?),
        None => String::new(),
    };
    let url = provider.client.auth_code_url(&state, &provider.options);
    Ok(Redirect::temporary(&url).into_response())
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: String,
    #[serde(default)]
    state: String,
}

/// Exchanges the code, decodes the state and hands off to `post_callback`.
async fn oauth_callback(
    State(provider): State<Arc<Provider>>,
    cookies: Cookies,
    request: Request,
) -> Result<Response> {
    let (parts, _) = request.into_parts();
    let Query(params) = Query::<CallbackParams>::try_from_uri(&parts.uri)
        .map_err(|e| AppError::BadRequest(format!("Invalid callback query: {}", e)))?;

    let token = provider.client.exchange(&params.code).await?;

    let state = if params.state.is_empty() {
        String::new()
    } else {
        let raw = general_purpose::STANDARD
            .decode(&params.state)
            .map_err(|e| AppError::BadRequest(format!("error decoding state: {}", e)))?;
        String::from_utf8(raw)
            .map_err(|e| AppError::BadRequest(format!("error decoding state: {}", e)))?
    };

    provider
        .post_callback
        .call(&parts, &cookies, token, state)
        .await
}

/// Session-backed identity for OAuth logins; verification is the session
/// cookie's.
pub struct OAuthAuthenticator {
    sessions: Arc<SessionStore>,
}

impl OAuthAuthenticator {
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl Authenticator for OAuthAuthenticator {
    fn name(&self) -> &'static str {
        "oauth"
    }

    async fn authenticate(&self, headers: &HeaderMap, cookies: &Cookies) -> Result<AuthOutcome> {
        self.sessions.authenticate(headers, cookies).await
    }

    async fn logout(&self, _headers: &HeaderMap, cookies: &Cookies) {
        self.sessions.destroy_session(cookies).await;
    }
}

/// Users keyed by the OAuth token that identifies them.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// The user owning `token`, or `None` if unknown.
    async fn get(&self, token: &AccessToken) -> Result<Option<String>>;
    async fn create(&self, token: &AccessToken) -> Result<String>;
    async fn save(&self, user_id: &str, token: &AccessToken) -> Result<()>;
}

/// Looks up the token's user, creating one if needed; refreshes the stored
/// token for known users.
pub async fn get_or_create_user(store: &dyn UserStore, token: &AccessToken) -> Result<String> {
    match store.get(token).await? {
        Some(user_id) => {
            store.save(&user_id, token).await?;
            Ok(user_id)
        }
        None => store.create(token).await,
    }
}

/// A `PostCallback` that logs the user in with a session cookie and
/// redirects to `redirect_path`, passing the state along as `?state=`.
pub struct SessionCallback {
    sessions: Arc<SessionStore>,
    users: Arc<dyn UserStore>,
    redirect_path: String,
}

impl SessionCallback {
    pub fn new(
        sessions: Arc<SessionStore>,
        users: Arc<dyn UserStore>,
        redirect_path: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            users,
            redirect_path: redirect_path.into(),
        }
    }

    fn redirect_target(&self, state: &str) -> String {
        if state.is_empty() {
            return self.redirect_path.clone();
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("state", state)
            .finish();
        format!("{}?{}", self.redirect_path, query)
    }
}

#[async_trait]
impl PostCallback for SessionCallback {
    async fn call(
        &self,
        _parts: &Parts,
        cookies: &Cookies,
        token: AccessToken,
        state: String,
    ) -> Result<Response> {
        let user_id = get_or_create_user(self.users.as_ref(), &token).await?;
        self.sessions.create_session(&user_id, cookies)?;

        let target = self.redirect_target(&state);
        tracing::info!("✅ OAuth login for {}, redirecting to {}", user_id, target);
        Ok(Redirect::temporary(&target).into_response())
    }
}
