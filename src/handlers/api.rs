use axum::{Extension, Json};
use serde::Serialize;

use crate::models::auth::UserToken;

/// The caller's identity on protected routes.
#[derive(Serialize)]
pub struct Profile {
    pub user: String,
}

/// Result of a state-changing API call.
#[derive(Serialize)]
pub struct UpdateResponse {
    pub updated: bool,
    pub user: String,
}

/// Returns the authenticated user.
pub async fn profile(Extension(user): Extension<UserToken>) -> Json<Profile> {
    Json(Profile { user: user.0 })
}

/// A state-changing endpoint; reaching it means CSRF checks passed.
pub async fn update(Extension(user): Extension<UserToken>) -> Json<UpdateResponse> {
    tracing::info!("✏️ Update by {}", user.as_str());
    Json(UpdateResponse {
        updated: true,
        user: user.0,
    })
}
