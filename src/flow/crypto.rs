//! Flow request/response encryption

use super::error::FlowError;
use super::keys::FlowKeyPair;
use super::payload::FlowRequest;
use aes::{Aes128, Aes256};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{AesGcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Oaep, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;

/// Flow IVs are 16 bytes, not the usual 12-byte GCM nonce
pub const IV_LEN: usize = 16;

type Aes128Gcm16 = AesGcm<Aes128, U16>;
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Wire shape of every inbound flow POST
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRequestEnvelope {
    pub encrypted_flow_data: String,
    pub encrypted_aes_key: String,
    pub initial_vector: String,
}

/// Symmetric key and IV recovered from a request.
///
/// Only usable for encrypting the matching response.
#[derive(Clone)]
pub struct ResponseKey {
    key: Vec<u8>,
    iv: [u8; IV_LEN],
}

impl ResponseKey {
    /// Encrypt a response payload under the flipped request IV
    pub fn encrypt<T: Serialize>(&self, response: &T) -> Result<Vec<u8>, FlowError> {
        let plaintext = serde_json::to_vec(response).map_err(|e| FlowError::Encryption(e.to_string()))?;
        gcm_encrypt(&self.key, &flip_iv(&self.iv), &plaintext)
    }
}

impl fmt::Debug for ResponseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseKey")
            .field("key_len", &self.key.len())
            .finish_non_exhaustive()
    }
}

/// A decrypted request together with the key its response must use
#[derive(Debug, Clone)]
pub struct DecryptedRequest {
    pub payload: FlowRequest,
    pub key: ResponseKey,
}

/// Stateless decrypt/encrypt service over a shared key pair
#[derive(Debug, Clone)]
pub struct FlowCrypto {
    keys: Arc<FlowKeyPair>,
}

impl FlowCrypto {
    pub fn new(keys: Arc<FlowKeyPair>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &FlowKeyPair {
        &self.keys
    }

    /// Unwrap the AES key, authenticate and decrypt the payload, parse it.
    ///
    /// Anything that goes wrong before a verified plaintext exists is a
    /// [`FlowError::Decryption`] or [`FlowError::MalformedEnvelope`]; a
    /// tampered ciphertext never yields a parsed payload.
    pub fn decrypt(&self, envelope: &FlowRequestEnvelope) -> Result<DecryptedRequest, FlowError> {
        let flow_data = decode_field("encrypted_flow_data", &envelope.encrypted_flow_data)?;
        let wrapped_key = decode_field("encrypted_aes_key", &envelope.encrypted_aes_key)?;
        let iv: [u8; IV_LEN] = decode_field("initial_vector", &envelope.initial_vector)?
            .try_into()
            .map_err(|iv: Vec<u8>| {
                FlowError::MalformedEnvelope(format!("initial_vector is {} bytes, expected {IV_LEN}", iv.len()))
            })?;

        let key = self
            .keys
            .unwrap_key(&wrapped_key)
            .map_err(|e| FlowError::Decryption(format!("AES key unwrap failed: {e}")))?;

        let plaintext = gcm_decrypt(&key, &iv, &flow_data)?;
        let payload: FlowRequest = serde_json::from_slice(&plaintext)?;

        Ok(DecryptedRequest {
            payload,
            key: ResponseKey { key, iv },
        })
    }

    /// Encrypt `response` for the request `key` was recovered from
    pub fn encrypt<T: Serialize>(&self, response: &T, key: &ResponseKey) -> Result<Vec<u8>, FlowError> {
        key.encrypt(response)
    }
}

/// Invert every bit of the IV
pub fn flip_iv(iv: &[u8; IV_LEN]) -> [u8; IV_LEN] {
    iv.map(|b| !b)
}

/// Encrypt a response with an explicit key and request IV
pub fn encrypt_response<T: Serialize>(response: &T, aes_key: &[u8], iv: &[u8; IV_LEN]) -> Result<Vec<u8>, FlowError> {
    ResponseKey {
        key: aes_key.to_vec(),
        iv: *iv,
    }
    .encrypt(response)
}

/// Build a request envelope the way the platform does.
///
/// Used to exercise endpoints without the platform; `aes_key` must be 16 or
/// 32 bytes.
pub fn seal_request<T: Serialize>(
    request: &T,
    public_key: &RsaPublicKey,
    aes_key: &[u8],
    iv: &[u8; IV_LEN],
) -> Result<FlowRequestEnvelope, FlowError> {
    let plaintext = serde_json::to_vec(request).map_err(|e| FlowError::Encryption(e.to_string()))?;
    let flow_data = gcm_encrypt(aes_key, iv, &plaintext)?;
    let wrapped = public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), aes_key)
        .map_err(|e| FlowError::Encryption(e.to_string()))?;

    Ok(FlowRequestEnvelope {
        encrypted_flow_data: BASE64.encode(flow_data),
        encrypted_aes_key: BASE64.encode(wrapped),
        initial_vector: BASE64.encode(iv),
    })
}

/// Decrypt a response body the way the platform does (key + flipped IV)
pub fn open_response(body: &[u8], aes_key: &[u8], request_iv: &[u8; IV_LEN]) -> Result<Vec<u8>, FlowError> {
    gcm_decrypt(aes_key, &flip_iv(request_iv), body)
}

/// Random 16-byte AES key and IV, as the platform picks per request
pub fn random_request_key() -> (Vec<u8>, [u8; IV_LEN]) {
    let mut key = vec![0u8; 16];
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut key);
    OsRng.fill_bytes(&mut iv);
    (key, iv)
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, FlowError> {
    BASE64
        .decode(value.trim())
        .map_err(|e| FlowError::MalformedEnvelope(format!("{name} is not valid base64: {e}")))
}

fn gcm_encrypt(key: &[u8], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Result<Vec<u8>, FlowError> {
    let nonce = Nonce::<U16>::from_slice(iv);
    let sealed = match key.len() {
        16 => Aes128Gcm16::new_from_slice(key)
            .map_err(|e| FlowError::Encryption(e.to_string()))?
            .encrypt(nonce, plaintext),
        32 => Aes256Gcm16::new_from_slice(key)
            .map_err(|e| FlowError::Encryption(e.to_string()))?
            .encrypt(nonce, plaintext),
        n => return Err(FlowError::Encryption(format!("unsupported AES key length {n}"))),
    };
    sealed.map_err(|e| FlowError::Encryption(e.to_string()))
}

/// Ciphertext carries the 16-byte tag at its end
fn gcm_decrypt(key: &[u8], iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, FlowError> {
    let nonce = Nonce::<U16>::from_slice(iv);
    let opened = match key.len() {
        16 => Aes128Gcm16::new_from_slice(key)
            .map_err(|e| FlowError::Decryption(e.to_string()))?
            .decrypt(nonce, ciphertext),
        32 => Aes256Gcm16::new_from_slice(key)
            .map_err(|e| FlowError::Decryption(e.to_string()))?
            .decrypt(nonce, ciphertext),
        n => return Err(FlowError::Decryption(format!("unsupported AES key length {n}"))),
    };
    opened.map_err(|_| FlowError::Decryption("authentication tag mismatch".to_string()))
}
