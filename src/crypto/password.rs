use base64::{Engine as _, engine::general_purpose};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 8192;
/// Length of the derived key in bytes.
pub const DERIVED_KEY_LEN: usize = 32;
/// Separator between the salt and the encoded hash.
const SALT_SEPARATOR: char = '#';

/// Hashes a password with PBKDF2-HMAC-SHA256.
///
/// # Arguments
///
/// * `password` - The plaintext password.
/// * `salt` - The salt; must not contain `#`.
///
/// # Returns
///
/// `<salt>#<base64(derived key)>`.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut key = [0u8; DERIVED_KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), PBKDF2_ITERATIONS, &mut key);
    let encoded = general_purpose::STANDARD.encode(key);
    key.zeroize();
    format!("{}{}{}", salt, SALT_SEPARATOR, encoded)
}

/// Verifies a plaintext password against a stored `salt#hash` string.
///
/// The salt is taken from the stored value and the comparison of the full
/// strings runs in constant time.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, _)) = stored.split_once(SALT_SEPARATOR) else {
        tracing::debug!("Stored password hash has no salt");
        return false;
    };
    let mut candidate = hash_password(password, salt);
    let valid: bool = candidate.as_bytes().ct_eq(stored.as_bytes()).into();
    candidate.zeroize();
    valid
}
