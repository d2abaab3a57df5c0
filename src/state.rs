use std::sync::Arc;

use crate::config::Config;
use crate::crypto::jwe::Encrypter;
use crate::crypto::keystore::FileKeyStore;
use crate::error::{AppError, Result};
use crate::middleware_layer::csrf::CsrfGuard;
use crate::services::authenticator::AuthChain;
use crate::services::csrf::CsrfStore;
use crate::services::database_auth::{self, DatabaseAuth};
use crate::services::oauth::{
    self, OAuth, OAuthAuthenticator, Provider, SessionCallback, StandardOAuth2Client,
};
use crate::services::revocation::InMemoryRevocationStore;
use crate::services::session::SessionStore;
use crate::services::token_auth::{TokenAuthenticator, TokenSource};

/// The stores the service talks to but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub password_users: Option<Arc<dyn database_auth::UserStore>>,
    pub oauth_users: Option<Arc<dyn oauth::UserStore>>,
    pub tokens: Option<Arc<dyn TokenSource>>,
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    pub sessions: Arc<SessionStore>,
    pub csrf: Arc<CsrfStore>,
    /// The default authenticator chain.
    pub chain: Arc<AuthChain>,
    pub csrf_guard: Arc<CsrfGuard>,
    /// Held so shutdown can stop its sweep.
    pub revocation: Arc<InMemoryRevocationStore>,
    pub db_auth: Arc<DatabaseAuth>,
    pub oauth: Arc<OAuth>,
}

impl AppState {
    /// Loads key material, starts the revocation sweep and assembles the
    /// authenticator chain.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    /// * `collaborators` - User stores and the API token source.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub fn new(config: &Config, collaborators: Collaborators) -> Result<Self> {
        let keys = FileKeyStore::new(config.key_dir.clone());
        let session_encrypter = Arc::new(Encrypter::from_key_store(&keys, &config.session_key_file)?);
        let csrf_encrypter = if config.csrf_key_file == config.session_key_file {
            session_encrypter.clone()
        } else {
            Arc::new(Encrypter::from_key_store(&keys, &config.csrf_key_file)?)
        };
        tracing::info!("✅ Key material loaded from {}", config.key_dir.display());

        let revocation = Arc::new(InMemoryRevocationStore::new(config.revocation_flush_interval));
        revocation.start();

        let sessions = Arc::new(SessionStore::new(
            session_encrypter,
            revocation.clone(),
            config.session_settings(),
        ));
        let csrf = Arc::new(CsrfStore::new(csrf_encrypter, config.csrf_validity));
        let csrf_guard = Arc::new(
            CsrfGuard::new(sessions.clone(), csrf.clone())
                .ignore([config.login_path.as_str()])
                .ignore(&config.csrf_ignore_paths),
        );

        let db_auth = Arc::new(DatabaseAuth::new(
            collaborators.password_users,
            config.database_auth_settings(),
        )?);

        let mut chain = AuthChain::new();
        if let Some(tokens) = collaborators.tokens {
            chain = chain.with(Arc::new(TokenAuthenticator::new(
                tokens,
                config.token_settings(),
            )));
        }

        let mut oauth = OAuth::new();
        match (&config.oauth, collaborators.oauth_users) {
            (Some(provider), Some(users)) => {
                let client = StandardOAuth2Client::new(provider.client_settings())?;
                let callback =
                    SessionCallback::new(sessions.clone(), users, provider.post_login_path.clone());
                oauth.add_provider(Provider::new(
                    provider.base_path.clone(),
                    Arc::new(client),
                    Arc::new(callback),
                ));
                chain = chain.with(Arc::new(OAuthAuthenticator::new(sessions.clone())));
            }
            (Some(_), None) => {
                return Err(AppError::Config("oauth: UserStore not configured".to_string()));
            }
            (None, _) => {
                chain = chain.with(sessions.clone());
            }
        }
        tracing::info!("✅ Authenticator chain ready ({} strategies)", chain.len());

        Ok(AppState {
            config: config.clone(),
            sessions,
            csrf,
            chain: Arc::new(chain),
            csrf_guard,
            revocation,
            db_auth,
            oauth: Arc::new(oauth),
        })
    }
}
