use crate::error::AppError;

/// The resolved user identity of a request.
///
/// Inserted into request extensions by the auth middleware and never mutated
/// afterwards. Handlers read it with `Extension<UserToken>` (or
/// `Option<Extension<UserToken>>` on routes that allow anonymous callers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserToken(pub String);

impl UserToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What a single authenticator made of a request.
#[derive(Debug)]
pub enum AuthOutcome {
    /// No credential of this strategy's form was present.
    Skipped,
    /// A credential was present but did not resolve to a user
    /// (e.g. a tampered or revoked cookie).
    Anonymous,
    /// The credential resolved to this user.
    Authenticated(String),
    /// The credential was claimed and rejected; the chain stops here and
    /// surfaces the error.
    Rejected(AppError),
}

impl AuthOutcome {
    /// Whether the strategy recognised the credential form.
    pub fn is_handled(&self) -> bool {
        !matches!(self, AuthOutcome::Skipped)
    }

    /// The resolved user, if any.
    pub fn user_token(&self) -> Option<&str> {
        match self {
            AuthOutcome::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}
