//! WhatsApp Cloud API message shapes
//!
//! `incoming` mirrors the webhook delivery schema; `outgoing` builds the
//! payloads posted to the `/messages` edge.

mod incoming;
pub mod outgoing;

pub use incoming::*;
pub use outgoing::OutgoingMessage;
