use async_trait::async_trait;
use http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tower_cookies::cookie::SameSite;
use tower_cookies::cookie::time::{self, OffsetDateTime};
use tower_cookies::{Cookie, Cookies};

use crate::crypto::jwe::Encrypter;
use crate::error::{AppError, Result};
use crate::models::auth::AuthOutcome;
use crate::models::session::UserSession;
use crate::services::authenticator::Authenticator;
use crate::services::revocation::RevocationStore;

/// The default session cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "session";
/// The default session validity (two days).
pub const DEFAULT_SESSION_VALIDITY: Duration = Duration::from_secs(48 * 3600);
/// Value written into the cookie on logout.
const DELETED_VALUE: &str = "deleted";

/// Cookie attributes for issued sessions.
#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub cookie_name: String,
    /// Base domain; empty means host-only cookies and no scoping rule.
    pub cookie_domain: String,
    pub secure_cookie: bool,
    /// Cookie `Max-Age`, also how long a logout stays revoked.
    pub validity: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_domain: String::new(),
            secure_cookie: false,
            validity: DEFAULT_SESSION_VALIDITY,
        }
    }
}

/// What the request's session cookie turned out to be.
enum CookieState {
    Absent,
    Invalid,
    Valid(UserSession),
}

/// Issues and verifies encrypted session cookies.
///
/// See:
/// - `new_session_cookie`
/// - `verify` / `verify_and_extend`
/// - `destroy_session`
pub struct SessionStore {
    encrypter: Arc<Encrypter>,
    revocation: Arc<dyn RevocationStore>,
    settings: SessionSettings,
}

impl SessionStore {
    pub fn new(
        encrypter: Arc<Encrypter>,
        revocation: Arc<dyn RevocationStore>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            encrypter,
            revocation,
            settings,
        }
    }

    /// Encrypts `session` into a cookie scoped to the base cookie domain.
    pub fn new_session_cookie(&self, session: &UserSession) -> Result<Cookie<'static>> {
        let domain = self.settings.cookie_domain.clone();
        self.build_cookie(session, domain)
    }

    /// Encrypts `session` into a cookie for `domain`, which must be the base
    /// cookie domain or one of its subdomains.
    pub fn new_scoped_session_cookie(
        &self,
        session: &UserSession,
        domain: &str,
    ) -> Result<Cookie<'static>> {
        if !within_domain(domain, &self.settings.cookie_domain) {
            return Err(AppError::DomainScope {
                domain: domain.to_string(),
                base: self.settings.cookie_domain.clone(),
            });
        }
        self.build_cookie(session, domain.to_string())
    }

    fn build_cookie(&self, session: &UserSession, domain: String) -> Result<Cookie<'static>> {
        let payload = sonic_rs::to_vec(session)
            .map_err(|e| AppError::Internal(format!("Session serialization failed: {}", e)))?;
        let value = self.encrypter.encrypt(&payload)?;

        let mut cookie = Cookie::new(self.settings.cookie_name.clone(), value);
        cookie.set_http_only(true);
        cookie.set_path("/");
        let max_age = i64::try_from(self.settings.validity.as_secs())
            .map_err(|_| AppError::Config("Session validity out of range".to_string()))?;
        cookie.set_max_age(time::Duration::seconds(max_age));
        if !domain.is_empty() {
            cookie.set_domain(domain);
        }
        cookie.set_secure(self.settings.secure_cookie);
        cookie.set_same_site(SameSite::Lax);
        Ok(cookie)
    }

    /// Starts a new session for `user_token` and attaches its cookie.
    pub fn create_session(&self, user_token: &str, cookies: &Cookies) -> Result<UserSession> {
        let session = UserSession::new(user_token);
        let cookie = self.new_session_cookie(&session)?;
        cookies.add(cookie);
        tracing::debug!("🔑 Session created for user {}", user_token);
        Ok(session)
    }

    /// Like `create_session`, for a cookie scoped to `domain`.
    pub fn create_scoped_session(
        &self,
        user_token: &str,
        domain: &str,
        cookies: &Cookies,
    ) -> Result<UserSession> {
        let session = UserSession::new(user_token);
        let cookie = self.new_scoped_session_cookie(&session, domain)?;
        cookies.add(cookie);
        tracing::debug!("🔑 Session created for user {} on {}", user_token, domain);
        Ok(session)
    }

    /// Decrypts a cookie value. Any parse, decrypt or JSON failure is logged
    /// at info level and yields `None`.
    pub fn decode_cookie_value(&self, value: &str) -> Option<UserSession> {
        let payload = match self.encrypter.decrypt(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::info!("Ignoring undecryptable session cookie: {}", e);
                return None;
            }
        };
        match sonic_rs::from_slice::<UserSession>(&payload) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::info!("Ignoring malformed session payload: {}", e);
                None
            }
        }
    }

    async fn read_cookie(&self, cookies: &Cookies) -> CookieState {
        let Some(cookie) = cookies.get(&self.settings.cookie_name) else {
            return CookieState::Absent;
        };
        let Some(session) = self.decode_cookie_value(cookie.value()) else {
            return CookieState::Invalid;
        };
        if self.revocation.is_revoked(&session.session_id).await {
            tracing::debug!("Session {} is revoked", session.session_id);
            return CookieState::Invalid;
        }
        CookieState::Valid(session)
    }

    /// The current valid, non-revoked session, if any.
    pub async fn current_session(&self, cookies: &Cookies) -> Option<UserSession> {
        match self.read_cookie(cookies).await {
            CookieState::Valid(session) => Some(session),
            CookieState::Absent | CookieState::Invalid => None,
        }
    }

    /// The user of the current session. Absent, corrupt and revoked cookies
    /// all read as `None`.
    pub async fn verify(&self, cookies: &Cookies) -> Option<String> {
        self.current_session(cookies).await.map(|s| s.user_id)
    }

    /// Like `verify`, and re-issues the cookie with a fresh `Max-Age`. The
    /// session ID is kept.
    pub async fn verify_and_extend(&self, cookies: &Cookies) -> Option<String> {
        let session = self.current_session(cookies).await?;
        match self.new_session_cookie(&session) {
            Ok(cookie) => cookies.add(cookie),
            Err(e) => tracing::error!("Failed to extend session {}: {}", session.session_id, e),
        }
        Some(session.user_id)
    }

    /// Revokes the current session (if valid) and overwrites the cookie with
    /// an expired one scoped to the base cookie domain.
    pub async fn destroy_session(&self, cookies: &Cookies) {
        let domain = self.settings.cookie_domain.clone();
        self.destroy(cookies, domain).await;
    }

    /// Like `destroy_session`, for a cookie issued by
    /// `create_scoped_session`. Browsers only replace a cookie whose domain
    /// matches, so the same `domain` must be passed here.
    pub async fn destroy_scoped_session(&self, cookies: &Cookies, domain: &str) -> Result<()> {
        if !within_domain(domain, &self.settings.cookie_domain) {
            return Err(AppError::DomainScope {
                domain: domain.to_string(),
                base: self.settings.cookie_domain.clone(),
            });
        }
        self.destroy(cookies, domain.to_string()).await;
        Ok(())
    }

    async fn destroy(&self, cookies: &Cookies, domain: String) {
        match self.read_cookie(cookies).await {
            CookieState::Absent => return,
            CookieState::Invalid => {}
            CookieState::Valid(session) => {
                self.revocation
                    .revoke(&session.session_id, self.settings.validity)
                    .await;
                tracing::info!("👋 Session {} revoked", session.session_id);
            }
        }

        let mut cookie = Cookie::new(self.settings.cookie_name.clone(), DELETED_VALUE);
        cookie.set_max_age(time::Duration::seconds(-1));
        cookie.set_expires(OffsetDateTime::now_utc() - time::Duration::hours(1));
        cookie.set_http_only(true);
        cookie.set_path("/");
        if !domain.is_empty() {
            cookie.set_domain(domain);
        }
        cookie.set_secure(self.settings.secure_cookie);
        cookie.set_same_site(SameSite::Lax);
        cookies.add(cookie);
    }
}

#[async_trait]
impl Authenticator for SessionStore {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn authenticate(&self, _headers: &HeaderMap, cookies: &Cookies) -> Result<AuthOutcome> {
        Ok(match self.read_cookie(cookies).await {
            CookieState::Absent => AuthOutcome::Skipped,
            CookieState::Invalid => AuthOutcome::Anonymous,
            CookieState::Valid(session) => AuthOutcome::Authenticated(session.user_id),
        })
    }

    async fn logout(&self, _headers: &HeaderMap, cookies: &Cookies) {
        self.destroy_session(cookies).await;
    }
}

/// Whether `domain` is `base` or a subdomain of it. An empty base allows
/// any domain.
pub fn within_domain(domain: &str, base: &str) -> bool {
    let base = base.trim_start_matches('.').to_ascii_lowercase();
    if base.is_empty() {
        return true;
    }
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    domain == base || domain.ends_with(&format!(".{}", base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keystore::FileKeyStore;
    use crate::services::revocation::InMemoryRevocationStore;
    use crate::test_support;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: SessionStore,
    }

    fn fixture(settings: SessionSettings) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let keys = FileKeyStore::new(dir.path());
        let encrypter = Arc::new(Encrypter::from_key_store(&keys, "session.key").unwrap());
        let store = SessionStore::new(
            encrypter,
            Arc::new(InMemoryRevocationStore::default()),
            settings,
        );
        Fixture { _dir: dir, store }
    }

    async fn request_cookies(cookie: &Cookie<'_>) -> Cookies {
        let header = format!("{}={}", cookie.name(), cookie.value());
        test_support::cookies(&[&header]).await
    }

    #[test]
    fn new_session_cookie_has_fixed_attributes() {
        let f = fixture(SessionSettings::default());
        let session = UserSession {
            user_id: "abc".into(),
            session_id: "123".into(),
        };

        let cookie = f.store.new_session_cookie(&session).unwrap();
        assert_eq!(cookie.name(), "session");
        assert_eq!(cookie.domain(), None);
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(172_800)));

        assert_eq!(f.store.decode_cookie_value(cookie.value()), Some(session));
    }

    #[test]
    fn scoped_cookies_must_stay_within_the_base_domain() {
        let f = fixture(SessionSettings {
            cookie_domain: "example.com".into(),
            ..SessionSettings::default()
        });
        let session = UserSession::new("u1");

        let cookie = f
            .store
            .new_scoped_session_cookie(&session, "app.example.com")
            .unwrap();
        assert_eq!(cookie.domain(), Some("app.example.com"));

        assert!(matches!(
            f.store.new_scoped_session_cookie(&session, "example.com.evil.net"),
            Err(AppError::DomainScope { .. })
        ));
        assert!(matches!(
            f.store.new_scoped_session_cookie(&session, "notexample.com"),
            Err(AppError::DomainScope { .. })
        ));
    }

    #[tokio::test]
    async fn scoped_sessions_are_created_and_destroyed_on_their_domain() {
        let f = fixture(SessionSettings {
            cookie_domain: "example.com".into(),
            ..SessionSettings::default()
        });
        let cookies = test_support::cookies(&[]).await;

        let session = f
            .store
            .create_scoped_session("u1", "app.example.com", &cookies)
            .unwrap();
        let issued = cookies.get("session").unwrap();
        assert_eq!(issued.domain(), Some("app.example.com"));
        assert_eq!(
            f.store.decode_cookie_value(issued.value()),
            Some(session.clone())
        );
        assert!(matches!(
            f.store.create_scoped_session("u1", "other.org", &cookies),
            Err(AppError::DomainScope { .. })
        ));

        let request = request_cookies(&f.store.new_session_cookie(&session).unwrap()).await;
        f.store
            .destroy_scoped_session(&request, "app.example.com")
            .await
            .unwrap();
        let cleared = request.get("session").unwrap();
        assert_eq!(cleared.value(), "deleted");
        assert_eq!(cleared.domain(), Some("app.example.com"));
        assert_eq!(f.store.current_session(&request).await, None);

        let replayed = request_cookies(&f.store.new_session_cookie(&session).unwrap()).await;
        assert_eq!(f.store.verify(&replayed).await, None);
        assert!(matches!(
            f.store.destroy_scoped_session(&replayed, "other.org").await,
            Err(AppError::DomainScope { .. })
        ));
    }

    #[test]
    fn oversized_validity_is_an_error_not_a_panic() {
        let f = fixture(SessionSettings {
            validity: Duration::from_secs(u64::MAX),
            ..SessionSettings::default()
        });
        assert!(matches!(
            f.store.new_session_cookie(&UserSession::new("u1")),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn within_domain_matches_on_label_boundaries() {
        assert!(within_domain("example.com", "example.com"));
        assert!(within_domain("a.b.example.com", ".example.com"));
        assert!(within_domain("API.Example.com", "example.com"));
        assert!(!within_domain("badexample.com", "example.com"));
        assert!(within_domain("anything.org", ""));
    }

    #[tokio::test]
    async fn verify_round_trips_and_honours_revocation() {
        let f = fixture(SessionSettings::default());
        let session = UserSession::new("u1");
        let cookies = request_cookies(&f.store.new_session_cookie(&session).unwrap()).await;

        assert_eq!(f.store.verify(&cookies).await.as_deref(), Some("u1"));
        assert_eq!(f.store.current_session(&cookies).await, Some(session.clone()));

        f.store.destroy_session(&cookies).await;
        let replayed = request_cookies(&f.store.new_session_cookie(&session).unwrap()).await;
        assert_eq!(f.store.verify(&replayed).await, None);
    }

    #[tokio::test]
    async fn tampered_cookie_reads_as_no_session() {
        let f = fixture(SessionSettings::default());
        let cookie = f.store.new_session_cookie(&UserSession::new("u1")).unwrap();

        let mut parts: Vec<String> = cookie.value().split('.').map(str::to_string).collect();
        let flipped = if parts[3].starts_with('A') { "B" } else { "A" };
        parts[3].replace_range(0..1, flipped);
        let tampered = Cookie::new("session", parts.join("."));

        let cookies = request_cookies(&tampered).await;
        assert_eq!(f.store.verify(&cookies).await, None);
        let outcome = f.store.authenticate(&HeaderMap::new(), &cookies).await.unwrap();
        assert!(matches!(outcome, AuthOutcome::Anonymous));
    }

    #[tokio::test]
    async fn authenticate_skips_requests_without_cookie() {
        let f = fixture(SessionSettings::default());
        let outcome = f
            .store
            .authenticate(&HeaderMap::new(), &test_support::cookies(&[]).await)
            .await
            .unwrap();
        assert!(!outcome.is_handled());
    }

    #[tokio::test]
    async fn extend_keeps_the_session_id() {
        let f = fixture(SessionSettings::default());
        let session = UserSession::new("u1");
        let cookies = request_cookies(&f.store.new_session_cookie(&session).unwrap()).await;

        assert_eq!(f.store.verify_and_extend(&cookies).await.as_deref(), Some("u1"));
        let refreshed = cookies.get("session").unwrap();
        assert_eq!(
            f.store.decode_cookie_value(refreshed.value()).unwrap().session_id,
            session.session_id
        );
    }

    #[tokio::test]
    async fn destroy_writes_an_expired_cookie() {
        let f = fixture(SessionSettings::default());
        let cookies = test_support::cookies(&[]).await;
        let session = f.store.create_session("u1", &cookies).unwrap();

        f.store.destroy_session(&cookies).await;
        let cleared = cookies.get("session").unwrap();
        assert_eq!(cleared.value(), "deleted");
        assert_eq!(cleared.max_age(), Some(time::Duration::seconds(-1)));
        assert!(!session.session_id.is_empty());
    }
}
