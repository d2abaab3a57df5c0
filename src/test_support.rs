//! Helpers shared by unit tests.

use axum::body::Body;
use http::header::COOKIE;
use http::{Request, Response};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tower::{Layer, ServiceExt};
use tower_cookies::{CookieManagerLayer, Cookies};

/// Runs a request carrying `cookie_headers` through `CookieManagerLayer` and
/// hands back the jar it built.
pub(crate) async fn cookies(cookie_headers: &[&str]) -> Cookies {
    let captured: Arc<Mutex<Option<Cookies>>> = Arc::new(Mutex::new(None));
    let sink = captured.clone();
    let service = CookieManagerLayer::new().layer(tower::service_fn(move |req: Request<Body>| {
        let sink = sink.clone();
        async move {
            *sink.lock().unwrap() = req.extensions().get::<Cookies>().cloned();
            Ok::<_, Infallible>(Response::new(Body::empty()))
        }
    }));

    let mut request = Request::builder().uri("/");
    for header in cookie_headers {
        request = request.header(COOKIE, *header);
    }
    service
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let jar = captured.lock().unwrap().take();
    jar.expect("CookieManagerLayer did not insert Cookies")
}
