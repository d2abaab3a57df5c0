use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use http::{HeaderName, HeaderValue, Method, header};
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    handlers,
    middleware_layer::{
        auth::{must_with_auth, with_auth},
        csrf::{CSRF_HEADER, verify_csrf},
    },
    state::AppState,
};

fn cors(state: &AppState) -> CorsLayer {
    let port = state.config.bind_addr.port();
    let origins: Vec<HeaderValue> = [
        format!("http://localhost:{}", port),
        format!("http://127.0.0.1:{}", port),
        format!("http://[::1]:{}", port),
    ]
    .iter()
    .filter_map(|origin| HeaderValue::from_str(origin).ok())
    .collect();
    let csrf_header = HeaderName::from_static(CSRF_HEADER);

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::COOKIE,
            csrf_header.clone(),
        ])
        .allow_credentials(true)
        .expose_headers([csrf_header])
        .max_age(Duration::from_secs(86400))
}

/// Assembles the service: auth and CSRF middleware, the login/logout
/// endpoints, OAuth provider routes and the static fallback.
pub fn build_router(state: AppState) -> Router {
    let login_path = state.db_auth.login_path().to_string();

    let public_routes = Router::new()
        .route(&login_path, post(handlers::auth::login))
        .route("/register", post(handlers::auth::register))
        .route("/logout", post(handlers::auth::logout));

    let identified_routes = Router::new()
        .route("/whoami", get(handlers::auth::whoami))
        .route_layer(from_fn_with_state(state.chain.clone(), with_auth));

    let protected_routes = Router::new()
        .route("/csrf", get(handlers::auth::csrf_token))
        .route("/api", get(handlers::api::profile))
        .route("/api/update", post(handlers::api::update))
        .route_layer(from_fn_with_state(state.chain.clone(), must_with_auth));

    let mut app = Router::new()
        .merge(public_routes)
        .merge(identified_routes)
        .merge(protected_routes)
        .route_layer(from_fn_with_state(state.csrf_guard.clone(), verify_csrf))
        .with_state(state.clone())
        .merge(state.oauth.routes())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(cors(&state));

    if let Some(dir) = &state.config.static_dir {
        tracing::info!("📁 Serving static files from {}", dir.display());
        app = app.fallback_service(ServeDir::new(dir));
    }
    app
}
