use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use rand::rngs::OsRng;

/// Bytes of entropy behind a short token (40 bits, rendered as text).
const SHORT_TOKEN_SIZE: usize = 5;

/// Bytes of entropy behind a long token.
const LONG_TOKEN_SIZE: usize = 32;

/// Returns `n` random bytes from the OS generator.
pub fn rand_bytes(n: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; n];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generates a short random token, used as a password salt.
pub fn new_short() -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(rand_bytes(SHORT_TOKEN_SIZE))
}

/// Generates a long random token, the nonce inside CSRF payloads.
///
/// # Returns
///
/// A URL-safe base64-encoded token.
pub fn new_long() -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(rand_bytes(LONG_TOKEN_SIZE))
}
