use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower_cookies::Cookies;

use crate::{
    error::AppError,
    models::auth::{AuthOutcome, UserToken},
    services::authenticator::AuthChain,
};

/// Resolves the caller through `chain` and stores the user in the request
/// extensions. Anonymous callers pass through.
///
/// # Arguments
///
/// * `chain` - The authenticators for this route.
/// * `cookies` - The request cookies.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// The downstream response, or the error of a strategy that rejected the
/// request.
pub async fn with_auth(
    State(chain): State<Arc<AuthChain>>,
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Response {
    match chain.authenticate(request.headers(), &cookies).await {
        AuthOutcome::Authenticated(user) => {
            tracing::debug!("✅ User authenticated: {}", user);
            request.extensions_mut().insert(UserToken(user));
        }
        AuthOutcome::Rejected(e) => return e.into_response(),
        AuthOutcome::Anonymous | AuthOutcome::Skipped => {}
    }
    next.run(request).await
}

/// Like `with_auth`, but answers 401 unless a user was resolved.
pub async fn must_with_auth(
    State(chain): State<Arc<AuthChain>>,
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Response {
    match chain.authenticate(request.headers(), &cookies).await {
        AuthOutcome::Authenticated(user) => {
            tracing::debug!("✅ User authenticated: {}", user);
            request.extensions_mut().insert(UserToken(user));
            next.run(request).await
        }
        AuthOutcome::Rejected(e) => e.into_response(),
        AuthOutcome::Anonymous | AuthOutcome::Skipped => {
            tracing::debug!("❌ No identity for {}", request.uri().path());
            AppError::not_authorized().into_response()
        }
    }
}
