//! Trait abstractions for runtime I/O
//!
//! The dispatcher only talks to storage and to the messaging platform
//! through these traits, which lets tests drive it with mocks.

use super::session::{ConversationId, ConversationSession};
use crate::message::OutgoingMessage;
use crate::state_machine::State;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("Session store unavailable: {0}")]
    Unavailable(String),
    #[error("Session record could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of an outbound call to the messaging platform
#[derive(Debug, Clone, Error)]
pub enum OutboundError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Platform returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Unexpected response body: {0}")]
    Decode(String),
    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
}

/// Platform acknowledgement of a sent message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    #[serde(default)]
    pub messages: Vec<SentMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: String,
}

impl SendReceipt {
    /// Id the platform assigned to the (first) sent message
    pub fn message_id(&self) -> Option<&str> {
        self.messages.first().map(|m| m.id.as_str())
    }
}

/// Storage of per-identity conversation sessions.
///
/// Callers serialize access per identity; implementations only need to be
/// safe for concurrent use across identities.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Full session record, or `None` if the identity was never seen
    async fn get_session(
        &self,
        identity: &ConversationId,
    ) -> Result<Option<ConversationSession>, SessionStoreError>;

    /// Insert or replace the session record
    async fn put_session(&self, session: &ConversationSession) -> Result<(), SessionStoreError>;

    async fn get_state(&self, identity: &ConversationId) -> Result<Option<State>, SessionStoreError> {
        Ok(self.get_session(identity).await?.map(|s| s.state))
    }

    /// Move `identity` to `state`, keeping any flow token it already had
    async fn set_state(
        &self,
        identity: &ConversationId,
        state: State,
    ) -> Result<(), SessionStoreError> {
        let session = match self.get_session(identity).await? {
            Some(mut session) => {
                session.state = state;
                session.last_updated = Utc::now();
                session
            }
            None => ConversationSession::new(identity.clone(), state),
        };
        self.put_session(&session).await
    }
}

/// Outbound messaging capability handed to handlers
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Post `message` from the business number `bot_number_id`
    async fn send_message(
        &self,
        bot_number_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SendReceipt, OutboundError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn get_session(
        &self,
        identity: &ConversationId,
    ) -> Result<Option<ConversationSession>, SessionStoreError> {
        (**self).get_session(identity).await
    }

    async fn put_session(&self, session: &ConversationSession) -> Result<(), SessionStoreError> {
        (**self).put_session(session).await
    }

    async fn get_state(&self, identity: &ConversationId) -> Result<Option<State>, SessionStoreError> {
        (**self).get_state(identity).await
    }

    async fn set_state(
        &self,
        identity: &ConversationId,
        state: State,
    ) -> Result<(), SessionStoreError> {
        (**self).set_state(identity, state).await
    }
}

#[async_trait]
impl<T: MessageSender + ?Sized> MessageSender for Arc<T> {
    async fn send_message(
        &self,
        bot_number_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SendReceipt, OutboundError> {
        (**self).send_message(bot_number_id, message).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

use crate::db::SessionDatabase;

#[async_trait]
impl SessionStore for SessionDatabase {
    async fn get_session(
        &self,
        identity: &ConversationId,
    ) -> Result<Option<ConversationSession>, SessionStoreError> {
        self.load_session(identity)
            .map_err(|e| SessionStoreError::Unavailable(e.to_string()))
    }

    async fn put_session(&self, session: &ConversationSession) -> Result<(), SessionStoreError> {
        self.upsert_session(session)
            .map_err(|e| SessionStoreError::Unavailable(e.to_string()))
    }
}
