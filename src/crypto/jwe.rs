use josekit::jwe::{
    self, JweHeader, RSA_OAEP,
    alg::rsaes::{RsaesJweDecrypter, RsaesJweEncrypter},
};

use crate::crypto::keystore::KeyStore;
use crate::error::{AppError, Result};

/// Content encryption used for every token this crate issues.
pub const CONTENT_ENCRYPTION: &str = "A128GCM";

/// JWE encrypter/decrypter pair over one RSA key.
///
/// Key wrapping is RSA-OAEP and content encryption AES-128-GCM. Output is
/// always the compact serialization. Immutable after construction, so it is
/// shared between requests behind an `Arc`.
pub struct Encrypter {
    encrypter: RsaesJweEncrypter,
    decrypter: RsaesJweDecrypter,
}

impl Encrypter {
    /// Loads `key_file` from the key store and builds the pair. The public
    /// key encrypts, the private key decrypts.
    pub fn from_key_store(store: &dyn KeyStore, key_file: &str) -> Result<Self> {
        let (private_der, _) = store.load_private_key(key_file)?;
        let decrypter = RSA_OAEP.decrypter_from_der(&private_der)?;

        let public_der = store.load_public_key(key_file)?;
        let encrypter = RSA_OAEP.encrypter_from_der(&public_der)?;

        Ok(Self {
            encrypter,
            decrypter,
        })
    }

    /// Encrypts `payload` and returns `<header>.<encKey>.<iv>.<ciphertext>.<tag>`.
    pub fn encrypt(&self, payload: &[u8]) -> Result<String> {
        let mut header = JweHeader::new();
        header.set_content_encryption(CONTENT_ENCRYPTION);
        jwe::serialize_compact(payload, &header, &self.encrypter)
            .map_err(|e| AppError::Crypto(format!("Encryption failed: {}", e)))
    }

    /// Parses and decrypts a compact serialization.
    pub fn decrypt(&self, token: &str) -> Result<Vec<u8>> {
        let (payload, header) = jwe::deserialize_compact(token, &self.decrypter)
            .map_err(|e| AppError::Crypto(format!("Decryption failed: {}", e)))?;

        if header.content_encryption() != Some(CONTENT_ENCRYPTION) {
            return Err(AppError::Crypto(format!(
                "Unexpected content encryption: {:?}",
                header.content_encryption()
            )));
        }

        Ok(payload)
    }
}
