//! Decryption of media uploaded through a flow
//!
//! CDN objects are `AES-256-CBC(plaintext) || HMAC-SHA256(iv || ciphertext)[..10]`.

use super::error::MediaError;
use super::payload::MediaEncryptionMetadata;
use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

const HMAC_LEN: usize = 10;

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Verify and decrypt a downloaded CDN object.
///
/// Checks run in order: hash of the encrypted bytes, truncated HMAC,
/// decryption with PKCS#7 unpadding, hash of the plaintext.
pub fn decrypt_media(
    metadata: &MediaEncryptionMetadata,
    cdn_content: &[u8],
) -> Result<Vec<u8>, MediaError> {
    let encrypted_hash = decode("encrypted_hash", &metadata.encrypted_hash)?;
    let hmac_key = decode("hmac_key", &metadata.hmac_key)?;
    let iv = decode("iv", &metadata.iv)?;
    let plaintext_hash = decode("plaintext_hash", &metadata.plaintext_hash)?;
    let encryption_key = decode("encryption_key", &metadata.encryption_key)?;

    if Sha256::digest(cdn_content).as_slice() != encrypted_hash.as_slice() {
        return Err(MediaError::EncryptedHashMismatch);
    }

    let Some(split) = cdn_content.len().checked_sub(HMAC_LEN) else {
        return Err(MediaError::HmacMismatch);
    };
    let (ciphertext, tag) = cdn_content.split_at(split);

    let mut mac = HmacSha256::new_from_slice(&hmac_key).map_err(|_| MediaError::HmacMismatch)?;
    mac.update(&iv);
    mac.update(ciphertext);
    mac.verify_truncated_left(tag)
        .map_err(|_| MediaError::HmacMismatch)?;

    let plaintext = Aes256CbcDec::new_from_slices(&encryption_key, &iv)
        .map_err(|e| MediaError::Decryption(e.to_string()))?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| MediaError::Decryption(e.to_string()))?;

    if Sha256::digest(&plaintext).as_slice() != plaintext_hash.as_slice() {
        return Err(MediaError::PlaintextHashMismatch);
    }

    tracing::debug!(bytes = plaintext.len(), "Decrypted flow media");
    Ok(plaintext)
}

fn decode(field: &'static str, value: &str) -> Result<Vec<u8>, MediaError> {
    BASE64
        .decode(value)
        .map_err(|_| MediaError::Metadata { field })
}
