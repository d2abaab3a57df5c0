use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use josekit::jwk::alg::rsa::RsaKeyPair;

use crate::error::{AppError, Result};

/// The size of generated RSA keys in bits.
pub const RSA_KEY_BITS: u32 = 2048;

/// The default file name of the session key.
pub const DEFAULT_KEY_FILE: &str = "session.key";

/// Source of the RSA key material used to encrypt cookies and CSRF tokens.
pub trait KeyStore: Send + Sync {
    /// Returns the PKCS#1 DER encoding of the private key together with the
    /// parsed key pair.
    fn load_private_key(&self, name: &str) -> Result<(Vec<u8>, RsaKeyPair)>;

    /// Returns the DER encoded SubjectPublicKeyInfo of the key.
    fn load_public_key(&self, name: &str) -> Result<Vec<u8>>;
}

/// A `KeyStore` backed by PEM files in a directory. Missing keys are
/// generated on first use and written with owner-only permissions.
#[derive(Clone, Debug, Default)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Creates a key store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn get_private_key(&self, name: &str) -> Result<RsaKeyPair> {
        let path = self.dir.join(name);
        match fs::read(&path) {
            Ok(pem) => {
                tracing::debug!("🔑 Loading RSA key from {}", path.display());
                RsaKeyPair::from_pem(&pem)
                    .map_err(|e| AppError::Crypto(format!("Malformed key {}: {}", path.display(), e)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("⚠️  Key {} not found, generating...", path.display());
                let key_pair = RsaKeyPair::generate(RSA_KEY_BITS)
                    .map_err(|e| AppError::Crypto(format!("RSA key generation failed: {}", e)))?;
                write_private_key(&path, &key_pair.to_traditional_pem_private_key())?;
                tracing::info!("✅ RSA key written to {}", path.display());
                Ok(key_pair)
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

impl KeyStore for FileKeyStore {
    fn load_private_key(&self, name: &str) -> Result<(Vec<u8>, RsaKeyPair)> {
        let key_pair = self.get_private_key(name)?;
        Ok((key_pair.to_raw_private_key(), key_pair))
    }

    fn load_public_key(&self, name: &str) -> Result<Vec<u8>> {
        Ok(self.get_private_key(name)?.to_der_public_key())
    }
}

#[cfg(unix)]
fn write_private_key(path: &Path, pem: &[u8]) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(pem)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private_key(path: &Path, pem: &[u8]) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(pem)?;
    Ok(())
}
