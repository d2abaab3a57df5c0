use axum::{
    Extension, Form, Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tower_cookies::Cookies;

use crate::{
    error::{AppError, Result},
    middleware_layer::csrf::CSRF_HEADER,
    models::auth::UserToken,
    state::AppState,
    validation::auth::{LoginForm, RegisterForm, validate_registration},
};

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// The response payload for user registration.
#[derive(Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
}

/// The resolved identity of the caller.
#[derive(Serialize)]
pub struct WhoAmI {
    pub user: Option<String>,
}

/// A CSRF token bound to the caller's session.
#[derive(Serialize)]
pub struct CsrfTokenResponse {
    pub token: String,
}

/// Handles the password login form.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt for {}", form.email);

    let user_id = state
        .db_auth
        .login(&form.email, &form.password)
        .await?
        .ok_or_else(|| AppError::NotAuthorized("invalid user".to_string()))?;

    state.sessions.create_session(&user_id, &cookies)?;
    tracing::info!("✅ User logged in: {}", user_id);

    let redirect = state.db_auth.redirect_path();
    if redirect.is_empty() {
        let response = AuthResponse {
            success: true,
            message: "Login successful".to_string(),
        };
        return Ok((StatusCode::OK, Json(response)).into_response());
    }

    let location = HeaderValue::from_str(redirect)
        .map_err(|e| AppError::Config(format!("Invalid redirect path: {}", e)))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

/// Handles user registration.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    tracing::info!("📝 Register attempt - Payload: {:?}", form);
    validate_registration(&form)?;

    let user_id = state.db_auth.create(&form.email, &form.password).await?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id })).into_response())
}

/// Logs the caller out through whichever authenticator handles the request.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Response> {
    state.chain.logout(&headers, &cookies).await;
    tracing::info!("👋 Logout completed");

    let response = AuthResponse {
        success: true,
        message: "Logged out".to_string(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Reports the identity the auth middleware resolved, if any.
pub async fn whoami(user: Option<Extension<UserToken>>) -> Json<WhoAmI> {
    Json(WhoAmI {
        user: user.map(|Extension(UserToken(id))| id),
    })
}

/// Issues a CSRF token for the caller's session. The token is returned in
/// the body and in the `x-csrf-token` header.
pub async fn csrf_token(State(state): State<AppState>, cookies: Cookies) -> Result<Response> {
    let session = state
        .sessions
        .current_session(&cookies)
        .await
        .ok_or_else(|| AppError::BadRequest("csrf tokens require a session".to_string()))?;

    let token = state.csrf.new_token(&session.session_id)?;
    let header_value = HeaderValue::from_str(&token)
        .map_err(|e| AppError::Internal(format!("CSRF token is not a header value: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(CSRF_HEADER, header_value)],
        Json(CsrfTokenResponse { token }),
    )
        .into_response())
}
