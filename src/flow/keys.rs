//! Flow key material

use super::error::KeyError;
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Modulus size of generated keys
pub const KEY_BITS: usize = 2048;

/// RSA key pair used to unwrap the per-request AES keys.
///
/// Built once at startup and shared read-only. Regenerating it breaks every
/// flow whose endpoint was configured with the previous public key.
#[derive(Clone)]
pub struct FlowKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl FlowKeyPair {
    pub fn generate() -> Result<Self, KeyError> {
        let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS)?;
        tracing::info!(bits = KEY_BITS, "Generated flow key pair");
        Ok(Self::from_private(private))
    }

    fn from_private(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        Self { private, public }
    }

    /// Load a private key PEM.
    ///
    /// With a passphrase the PEM must be an encrypted PKCS#8 document;
    /// without one both PKCS#8 (`PRIVATE KEY`) and PKCS#1 (`RSA PRIVATE KEY`)
    /// are accepted.
    pub fn from_pem(pem: &str, passphrase: Option<&str>) -> Result<Self, KeyError> {
        let private = match passphrase {
            Some(passphrase) => RsaPrivateKey::from_pkcs8_encrypted_pem(pem, passphrase)
                .map_err(|e| KeyError::Decode(e.to_string()))?,
            None => RsaPrivateKey::from_pkcs8_pem(pem)
                .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
                .map_err(|e| KeyError::Decode(e.to_string()))?,
        };
        Ok(Self::from_private(private))
    }

    pub fn load(path: impl AsRef<Path>, passphrase: Option<&str>) -> Result<Self, KeyError> {
        let pem = std::fs::read_to_string(path.as_ref())?;
        let pair = Self::from_pem(&pem, passphrase)?;
        tracing::info!(path = %path.as_ref().display(), "Loaded flow private key");
        Ok(pair)
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// SubjectPublicKeyInfo PEM, the form the platform expects on upload
    pub fn public_key_pem(&self) -> Result<String, KeyError> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::Encode(e.to_string()))
    }

    pub fn public_key_der(&self) -> Result<Vec<u8>, KeyError> {
        self.public
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| KeyError::Encode(e.to_string()))
    }

    /// PKCS#8 PEM of the private key, encrypted when a passphrase is given
    pub fn private_key_pem(&self, passphrase: Option<&str>) -> Result<String, KeyError> {
        let pem = match passphrase {
            Some(passphrase) => {
                self.private
                    .to_pkcs8_encrypted_pem(&mut OsRng, passphrase, LineEnding::LF)
            }
            None => self.private.to_pkcs8_pem(LineEnding::LF),
        }
        .map_err(|e| KeyError::Encode(e.to_string()))?;
        Ok(pem.to_string())
    }

    /// Write the private key PEM to a new file readable by the owner only.
    ///
    /// Fails with `AlreadyExists` rather than replacing an existing key.
    pub fn write_private_key(
        &self,
        path: impl AsRef<Path>,
        passphrase: Option<&str>,
    ) -> Result<(), KeyError> {
        let pem = self.private_key_pem(passphrase)?;
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path.as_ref())?;
        file.write_all(pem.as_bytes())?;
        file.sync_all()?;
        tracing::info!(path = %path.as_ref().display(), encrypted = passphrase.is_some(), "Wrote flow private key");
        Ok(())
    }

    /// Recover a wrapped AES key (RSA-OAEP, SHA-256 for hash and MGF1)
    pub(crate) fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, rsa::Error> {
        self.private.decrypt(Oaep::new::<Sha256>(), wrapped)
    }
}

impl fmt::Debug for FlowKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowKeyPair")
            .field("bits", &KEY_BITS)
            .finish_non_exhaustive()
    }
}

/// Generate a fresh key pair; the caller persists it
pub fn generate_keypair() -> Result<FlowKeyPair, KeyError> {
    FlowKeyPair::generate()
}

/// PEM bytes of the public half, ready to upload
pub fn export_public_key(pair: &FlowKeyPair) -> Result<Vec<u8>, KeyError> {
    pair.public_key_pem().map(String::into_bytes)
}
