//! Flow error types

use std::time::Duration;
use thiserror::Error;

/// Failure of one flow request/response cycle
#[derive(Debug, Error)]
pub enum FlowError {
    /// Wrong key, tampered ciphertext or tag mismatch. The platform must be
    /// told apart from other failures: it treats this as a stale key.
    #[error("Could not decrypt flow request: {0}")]
    Decryption(String),
    #[error("Malformed flow envelope: {0}")]
    MalformedEnvelope(String),
    #[error("Unsupported flow action: {0}")]
    UnsupportedAction(String),
    #[error("Decrypted flow payload is not a valid request: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("Could not encrypt flow response: {0}")]
    Encryption(String),
    #[error("Flow response not ready within {0:?}")]
    DeadlineExceeded(Duration),
    #[error("Flow handler failed: {0}")]
    Handler(String),
}

impl FlowError {
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Whether the platform should see this as a key mismatch
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, Self::Decryption(_) | Self::MalformedEnvelope(_))
    }
}

/// Failure to create, load or export the flow key pair.
///
/// Always fatal at startup: without a key no flow traffic can be served.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("RSA key generation failed: {0}")]
    Generation(#[from] rsa::Error),
    #[error("Private key PEM could not be decoded: {0}")]
    Decode(String),
    #[error("Key could not be encoded: {0}")]
    Encode(String),
    #[error("Key file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Verification or decryption failure of downloaded flow media
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Encryption metadata field {field} is not valid base64")]
    Metadata { field: &'static str },
    #[error("SHA-256 of the encrypted content does not match encrypted_hash")]
    EncryptedHashMismatch,
    #[error("HMAC of the encrypted content does not verify")]
    HmacMismatch,
    #[error("Media ciphertext could not be decrypted: {0}")]
    Decryption(String),
    #[error("SHA-256 of the decrypted content does not match plaintext_hash")]
    PlaintextHashMismatch,
}
