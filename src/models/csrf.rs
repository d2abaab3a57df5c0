use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The payload inside a CSRF token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CsrfPayload {
    /// The `session_id` the token is bound to.
    pub state: String,
    /// Random filler.
    pub token: String,
    /// Absolute expiry, serialized as RFC 3339.
    pub expire_after: DateTime<Utc>,
}

impl CsrfPayload {
    /// Whether the token has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expire_after
    }
}
