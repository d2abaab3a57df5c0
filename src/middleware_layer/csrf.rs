use axum::{
    body::{self, Body, Bytes},
    extract::{FromRequest, Multipart, Request, State},
    http::{HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower_cookies::Cookies;
use url::form_urlencoded;

use crate::{
    error::AppError,
    services::{csrf::CsrfStore, session::SessionStore},
};

/// Header carrying the CSRF token.
pub const CSRF_HEADER: &str = "x-csrf-token";
/// Form field carrying the CSRF token on POST.
pub const CSRF_FORM_FIELD: &str = "csrfToken";
/// Largest form body buffered while looking for the token field.
const MAX_FORM_BYTES: usize = 2 * 1024 * 1024;
/// Largest multipart body buffered while looking for the token field.
const MAX_MULTIPART_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param,
    CatchAll,
}

/// A route pattern such as `/items/:id`, `/items/{id}` or `/files/*path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = split_path(pattern)
            .map(|segment| {
                if segment.starts_with(':')
                    || (segment.starts_with('{') && segment.ends_with('}'))
                {
                    Segment::Param
                } else if segment.starts_with('*') {
                    Segment::CatchAll
                } else {
                    Segment::Static(segment.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    pub fn matches(&self, path: &str) -> bool {
        let mut parts = split_path(path);
        for segment in &self.segments {
            match segment {
                Segment::CatchAll => return true,
                Segment::Param => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Segment::Static(expected) => {
                    if parts.next() != Some(expected.as_str()) {
                        return false;
                    }
                }
            }
        }
        parts.next().is_none()
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.trim_end_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
}

/// Everything the CSRF middleware needs.
pub struct CsrfGuard {
    sessions: Arc<SessionStore>,
    csrf: Arc<CsrfStore>,
    ignore: Vec<PathPattern>,
}

impl CsrfGuard {
    pub fn new(sessions: Arc<SessionStore>, csrf: Arc<CsrfStore>) -> Self {
        Self {
            sessions,
            csrf,
            ignore: Vec::new(),
        }
    }

    /// Adds paths that are never checked.
    pub fn ignore<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        self.ignore
            .extend(paths.into_iter().map(|p| PathPattern::parse(p.as_ref())));
        self
    }

    fn is_ignored(&self, path: &str) -> bool {
        self.ignore.iter().any(|pattern| pattern.matches(path))
    }
}

fn is_safe_method(method: &Method) -> bool {
    [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE].contains(method)
}

/// Body encodings that can carry the `csrfToken` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormKind {
    UrlEncoded,
    Multipart,
}

impl FormKind {
    fn body_limit(self) -> usize {
        match self {
            FormKind::UrlEncoded => MAX_FORM_BYTES,
            FormKind::Multipart => MAX_MULTIPART_BYTES,
        }
    }
}

/// Matches the media type (parameters stripped) case-insensitively.
fn form_kind(content_type: &str) -> Option<FormKind> {
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    if media_type.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        Some(FormKind::UrlEncoded)
    } else if media_type.eq_ignore_ascii_case("multipart/form-data") {
        Some(FormKind::Multipart)
    } else {
        None
    }
}

fn urlencoded_token(bytes: &[u8]) -> Option<String> {
    form_urlencoded::parse(bytes)
        .find(|(key, _)| key == CSRF_FORM_FIELD)
        .map(|(_, value)| value.into_owned())
}

async fn multipart_token(content_type: HeaderValue, bytes: Bytes) -> Option<String> {
    let request = http::Request::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .ok()?;
    let mut multipart = match Multipart::from_request(request, &()).await {
        Ok(multipart) => multipart,
        Err(e) => {
            tracing::debug!("Unreadable multipart form: {}", e);
            return None;
        }
    };
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some(CSRF_FORM_FIELD) {
                    return field.text().await.ok();
                }
            }
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!("Malformed multipart field: {}", e);
                return None;
            }
        }
    }
}

/// Finds the token in the header, or for form POSTs (urlencoded or
/// multipart) in the `csrfToken` field. The body is buffered and put back
/// for the handler.
async fn extract_token(request: Request) -> Result<(Option<String>, Request), AppError> {
    let from_header = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    if from_header.is_some() || request.method() != Method::POST {
        return Ok((from_header, request));
    }

    let Some(content_type) = request.headers().get(header::CONTENT_TYPE).cloned() else {
        return Ok((None, request));
    };
    let Some(kind) = content_type.to_str().ok().and_then(form_kind) else {
        return Ok((None, request));
    };

    let (parts, body) = request.into_parts();
    let bytes = body::to_bytes(body, kind.body_limit())
        .await
        .map_err(|e| AppError::BadRequest(format!("Unreadable form body: {}", e)))?;
    let token = match kind {
        FormKind::UrlEncoded => urlencoded_token(&bytes),
        FormKind::Multipart => multipart_token(content_type, bytes.clone()).await,
    }
    .filter(|value| !value.is_empty());
    Ok((token, Request::from_parts(parts, Body::from(bytes))))
}

/// Rejects state-changing requests from logged-in users that lack a valid
/// CSRF token.
///
/// # Arguments
///
/// * `guard` - Session and CSRF stores plus the ignore list.
/// * `cookies` - The request cookies.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// The downstream response, or a 400 when the token is missing or invalid.
pub async fn verify_csrf(
    State(guard): State<Arc<CsrfGuard>>,
    cookies: Cookies,
    request: Request,
    next: Next,
) -> Response {
    if is_safe_method(request.method()) {
        return next.run(request).await;
    }

    if guard.is_ignored(request.uri().path()) {
        tracing::debug!("CSRF check skipped for {}", request.uri().path());
        return next.run(request).await;
    }

    // anonymous callers are not checked
    let Some(session) = guard.sessions.current_session(&cookies).await else {
        return next.run(request).await;
    };

    let (token, request) = match extract_token(request).await {
        Ok(found) => found,
        Err(e) => return e.into_response(),
    };
    let Some(token) = token else {
        tracing::warn!("❌ CSRF token missing for session {}", session.session_id);
        return AppError::BadRequest("csrf token missing".to_string()).into_response();
    };

    let valid = match guard.csrf.verify(&session.session_id, &token) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::error!("❌ CSRF token could not be decoded: {}", e);
            false
        }
    };
    if !valid {
        tracing::warn!("❌ Invalid CSRF token for session {}", session.session_id);
        return AppError::BadRequest("invalid csrf token".to_string()).into_response();
    }

    next.run(request).await
}
