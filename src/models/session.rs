use serde::{Deserialize, Serialize};

/// The payload carried inside the session cookie.
///
/// `session_id` is unique per login (`<user_id>-<unix nanos>`) and is the
/// key used for revocation. It is opaque: nothing parses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// The identifier the application uses to look the user up.
    pub user_id: String,
    /// Globally unique per-login identifier.
    pub session_id: String,
}

impl UserSession {
    /// Creates a fresh session for `user_id`, stamped with the current time.
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let now = chrono::Utc::now();
        // out of i64 range after 2262
        let nanos = now.timestamp_nanos_opt().unwrap_or(now.timestamp_micros());
        let session_id = format!("{}-{}", user_id, nanos);
        Self {
            user_id,
            session_id,
        }
    }
}
