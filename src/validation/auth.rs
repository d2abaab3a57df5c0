use garde::Validate;
use serde::Deserialize;

use crate::error::Result;

/// The `email`/`password` form posted to the login path.
#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// The registration form.
#[derive(Deserialize, Validate)]
pub struct RegisterForm {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 8, max = 128))]
    pub password: String,
}

impl std::fmt::Debug for RegisterForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterForm")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validates a registration form.
///
/// # Arguments
///
/// * `form` - The submitted form.
///
/// # Returns
///
/// A `Result<()>` indicating whether the form is valid.
pub fn validate_registration(form: &RegisterForm) -> Result<()> {
    form.validate()?;
    Ok(())
}
