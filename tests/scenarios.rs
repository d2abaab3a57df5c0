use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use std::sync::Arc;
use tower::ServiceExt;

use sessiongate::{
    config::Config,
    crypto::password::hash_password,
    repositories::memory::MemoryUserStore,
    routes::build_router,
    services::token_auth::StaticTokenSource,
    state::{AppState, Collaborators},
};

const FORM: &str = "application/x-www-form-urlencoded";

struct TestApp {
    _keys: tempfile::TempDir,
    state: AppState,
    app: Router,
}

impl TestApp {
    async fn new() -> Self {
        let keys = tempfile::tempdir().unwrap();
        let config = Config {
            key_dir: keys.path().to_path_buf(),
            ..Config::default()
        };

        let users = Arc::new(MemoryUserStore::new());
        users.insert("a@b", "u1", &hash_password("pw", "s")).await;
        let tokens = StaticTokenSource::parse("goodToken:api-user").unwrap();

        let state = AppState::new(
            &config,
            Collaborators {
                password_users: Some(users.clone()),
                oauth_users: Some(users),
                tokens: Some(Arc::new(tokens)),
            },
        )
        .unwrap();
        let app = build_router(state.clone());
        Self {
            _keys: keys,
            state,
            app,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Logs in as `a@b` and returns the `session=...` pair.
    async fn login(&self) -> String {
        let response = self
            .send(
                Request::post("/login")
                    .header(header::CONTENT_TYPE, FORM)
                    .body(Body::from("email=a@b&password=pw"))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        cookie_pair(&response)
    }

    async fn whoami(&self, cookie: &str) -> serde_json::Value {
        let response = self
            .send(
                Request::get("/whoami")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        json(response).await
    }

    async fn csrf_token(&self, cookie: &str) -> String {
        let response = self
            .send(
                Request::get("/csrf")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        json(response).await["token"].as_str().unwrap().to_string()
    }
}

fn set_cookie(response: &Response) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .expect("Set-Cookie header")
        .to_str()
        .unwrap()
        .to_string()
}

fn cookie_pair(response: &Response) -> String {
    set_cookie(response).split(';').next().unwrap().to_string()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

#[tokio::test]
async fn login_sets_session_cookie_and_identifies_user() {
    let app = TestApp::new().await;
    let response = app
        .send(
            Request::post("/login")
                .header(header::CONTENT_TYPE, FORM)
                .body(Body::from("email=a@b&password=pw"))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/");
    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("session="));
    for attribute in ["Max-Age=172800", "HttpOnly", "Path=/", "SameSite=Lax"] {
        assert!(cookie.contains(attribute), "{} missing from {}", attribute, cookie);
    }
    assert!(!cookie.contains("Secure"));

    let pair = cookie_pair(&response);
    let value = pair.trim_start_matches("session=");
    assert_eq!(value.split('.').count(), 5);

    assert_eq!(app.whoami(&pair).await["user"], "u1");
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::new().await;
    let response = app
        .send(
            Request::post("/login")
                .header(header::CONTENT_TYPE, FORM)
                .body(Body::from("email=a@b&password=nope"))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert!(body_text(response).await.contains("invalid user"));
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let app = TestApp::new().await;
    let cookie = app.login().await;
    let token = app.csrf_token(&cookie).await;

    let response = app
        .send(
            Request::post("/logout")
                .header(header::COOKIE, &cookie)
                .header("x-csrf-token", &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = set_cookie(&response);
    assert!(cleared.starts_with("session=deleted"));
    assert!(cleared.contains("Max-Age=-1"));

    // replaying the old cookie
    assert!(app.whoami(&cookie).await["user"].is_null());
    let response = app
        .send(
            Request::get("/api")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn state_change_without_csrf_token_is_rejected() {
    let app = TestApp::new().await;
    let cookie = app.login().await;

    let response = app
        .send(
            Request::post("/api/update")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("csrf token missing"));

    let token = app.csrf_token(&cookie).await;
    let response = app
        .send(
            Request::post("/api/update")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, FORM)
                .body(Body::from(format!("csrfToken={}", token)))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["user"], "u1");
}

#[tokio::test]
async fn csrf_token_from_another_session_is_invalid() {
    let app = TestApp::new().await;
    let first = app.login().await;
    let second = app.login().await;
    let foreign = app.csrf_token(&second).await;

    let response = app
        .send(
            Request::post("/api/update")
                .header(header::COOKIE, &first)
                .header("x-csrf-token", &foreign)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("invalid csrf token"));

    let own = app.state.csrf.new_token(
        &app.state
            .sessions
            .decode_cookie_value(first.trim_start_matches("session="))
            .unwrap()
            .session_id,
    );
    let response = app
        .send(
            Request::post("/api/update")
                .header(header::COOKIE, &first)
                .header("x-csrf-token", own.unwrap())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_api_token_short_circuits_the_chain() {
    let app = TestApp::new().await;
    let cookie = app.login().await;

    // a valid session cookie must not rescue a bad token
    let response = app
        .send(
            Request::get("/api")
                .header(header::AUTHORIZATION, "Token bad")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(
            Request::get("/api")
                .header(header::AUTHORIZATION, "token goodToken")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["user"], "api-user");
}

#[tokio::test]
async fn tampered_cookie_degrades_to_anonymous() {
    let app = TestApp::new().await;
    let cookie = app.login().await;

    let mut parts: Vec<String> = cookie.split('.').map(str::to_string).collect();
    let flipped = if parts[3].starts_with('A') { "B" } else { "A" };
    parts[3].replace_range(0..1, flipped);
    let tampered = parts.join(".");

    assert!(app.whoami(&tampered).await["user"].is_null());

    let response = app
        .send(
            Request::get("/api")
                .header(header::COOKIE, &tampered)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registered_users_can_log_in() {
    let app = TestApp::new().await;
    let response = app
        .send(
            Request::post("/register")
                .header(header::CONTENT_TYPE, FORM)
                .body(Body::from("email=new%40example.com&password=long-enough"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let user_id = json(response).await["user_id"].as_str().unwrap().to_string();

    let response = app
        .send(
            Request::post("/login")
                .header(header::CONTENT_TYPE, FORM)
                .body(Body::from("email=new%40example.com&password=long-enough"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(app.whoami(&cookie_pair(&response)).await["user"], user_id.as_str());
}

#[tokio::test]
async fn invalid_registration_is_a_bad_request() {
    let app = TestApp::new().await;
    let response = app
        .send(
            Request::post("/register")
                .header(header::CONTENT_TYPE, FORM)
                .body(Body::from("email=not-an-email&password=short"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
