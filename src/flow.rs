//! WhatsApp Flows data exchange
//!
//! Requests arrive as an RSA-OAEP wrapped AES key plus an AES-GCM encrypted
//! JSON payload. The response goes back encrypted under the same key with
//! every bit of the request IV inverted.

mod crypto;
mod endpoint;
mod error;
mod keys;
mod media;
mod payload;

pub use crypto::{
    encrypt_response, flip_iv, open_response, random_request_key, seal_request, DecryptedRequest,
    FlowCrypto, FlowRequestEnvelope, ResponseKey, IV_LEN,
};
pub use endpoint::{FlowEndpoint, FlowHandler, DEFAULT_RESPONSE_DEADLINE};
pub use error::{FlowError, KeyError, MediaError};
pub use keys::{export_public_key, generate_keypair, FlowKeyPair, KEY_BITS};
pub use media::decrypt_media;
pub use payload::{
    FlowAction, FlowMediaReference, FlowRequest, FlowResponse, MediaEncryptionMetadata,
};
