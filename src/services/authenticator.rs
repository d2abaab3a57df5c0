use async_trait::async_trait;
use http::HeaderMap;
use std::sync::Arc;
use tower_cookies::Cookies;

use crate::error::Result;
use crate::models::auth::AuthOutcome;

/// One authentication strategy (session cookie, bearer token, OAuth session).
///
/// `authenticate` returns `Err` only for failures that should not stop the
/// chain: the chain logs them and moves on. A strategy that wants to claim
/// and reject a request returns `AuthOutcome::Rejected`.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn authenticate(&self, headers: &HeaderMap, cookies: &Cookies) -> Result<AuthOutcome>;

    /// Invalidates whatever artifact this strategy uses.
    async fn logout(&self, headers: &HeaderMap, cookies: &Cookies);
}

/// An ordered list of authenticators; the first one that handles a request
/// decides the outcome.
#[derive(Clone, Default)]
pub struct AuthChain {
    authenticators: Vec<Arc<dyn Authenticator>>,
}

impl AuthChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a strategy. Registration order is consultation order.
    pub fn with(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticators.push(authenticator);
        self
    }

    pub fn len(&self) -> usize {
        self.authenticators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authenticators.is_empty()
    }

    /// Runs the chain. Returns `Skipped` when no strategy handled the request.
    pub async fn authenticate(&self, headers: &HeaderMap, cookies: &Cookies) -> AuthOutcome {
        for authenticator in &self.authenticators {
            match authenticator.authenticate(headers, cookies).await {
                Ok(AuthOutcome::Skipped) => continue,
                Ok(outcome) => {
                    tracing::debug!(
                        authenticator = authenticator.name(),
                        handled = true,
                        authenticated = outcome.user_token().is_some(),
                        "Request claimed by authenticator"
                    );
                    return outcome;
                }
                Err(e) => {
                    tracing::error!(
                        authenticator = authenticator.name(),
                        error = %e,
                        "Authenticator failed"
                    );
                }
            }
        }
        AuthOutcome::Skipped
    }

    /// Logs out through the first strategy that handles the request.
    pub async fn logout(&self, headers: &HeaderMap, cookies: &Cookies) {
        for authenticator in &self.authenticators {
            let handled = matches!(
                authenticator.authenticate(headers, cookies).await,
                Ok(outcome) if outcome.is_handled()
            );
            if handled {
                tracing::debug!(authenticator = authenticator.name(), "Logging out");
                authenticator.logout(headers, cookies).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Skip,
        Fail,
        Anonymous,
        Accept(&'static str),
        Reject,
    }

    struct Fake {
        behaviour: Behaviour,
        calls: AtomicUsize,
        logouts: AtomicUsize,
    }

    impl Fake {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
                logouts: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Authenticator for Fake {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn authenticate(&self, _: &HeaderMap, _: &Cookies) -> Result<AuthOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Skip => Ok(AuthOutcome::Skipped),
                Behaviour::Fail => Err(AppError::Internal("boom".into())),
                Behaviour::Anonymous => Ok(AuthOutcome::Anonymous),
                Behaviour::Accept(user) => Ok(AuthOutcome::Authenticated(user.to_string())),
                Behaviour::Reject => Ok(AuthOutcome::Rejected(AppError::not_authorized())),
            }
        }

        async fn logout(&self, _: &HeaderMap, _: &Cookies) {
            self.logouts.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn cookies() -> Cookies {
        crate::test_support::cookies(&[]).await
    }

    #[tokio::test]
    async fn first_handling_strategy_wins() {
        let first = Fake::new(Behaviour::Skip);
        let second = Fake::new(Behaviour::Accept("u1"));
        let third = Fake::new(Behaviour::Accept("u2"));
        let chain = AuthChain::new()
            .with(first.clone())
            .with(second.clone())
            .with(third.clone());

        let outcome = chain.authenticate(&HeaderMap::new(), &cookies().await).await;
        assert_eq!(outcome.user_token(), Some("u1"));
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejection_short_circuits() {
        let rejecting = Fake::new(Behaviour::Reject);
        let later = Fake::new(Behaviour::Accept("u1"));
        let chain = AuthChain::new().with(rejecting).with(later.clone());

        let outcome = chain.authenticate(&HeaderMap::new(), &cookies().await).await;
        assert!(matches!(outcome, AuthOutcome::Rejected(AppError::NotAuthorized(_))));
        assert_eq!(later.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn errors_from_non_handling_strategies_are_skipped() {
        let failing = Fake::new(Behaviour::Fail);
        let anonymous = Fake::new(Behaviour::Anonymous);
        let chain = AuthChain::new().with(failing).with(anonymous.clone());

        let outcome = chain.authenticate(&HeaderMap::new(), &cookies().await).await;
        assert!(matches!(outcome, AuthOutcome::Anonymous));
        assert!(outcome.is_handled());
        assert_eq!(anonymous.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_chain_is_unhandled() {
        let outcome = AuthChain::new()
            .authenticate(&HeaderMap::new(), &cookies().await)
            .await;
        assert!(!outcome.is_handled());
    }

    #[tokio::test]
    async fn logout_goes_to_the_handling_strategy() {
        let skipping = Fake::new(Behaviour::Skip);
        let handling = Fake::new(Behaviour::Anonymous);
        let chain = AuthChain::new().with(skipping.clone()).with(handling.clone());

        chain.logout(&HeaderMap::new(), &cookies().await).await;
        assert_eq!(skipping.logouts.load(Ordering::SeqCst), 0);
        assert_eq!(handling.logouts.load(Ordering::SeqCst), 1);
    }
}
