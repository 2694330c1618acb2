//! Conversation identity and session records

use super::traits::{SessionStore, SessionStoreError};
use crate::state_machine::State;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Platform-assigned (bot number, customer) pair a session belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId {
    /// Phone number id of the business number that received the message
    pub bot_number_id: String,
    /// WhatsApp id of the customer
    pub user_id: String,
}

impl ConversationId {
    pub fn new(bot_number_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            bot_number_id: bot_number_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bot_number_id, self.user_id)
    }
}

/// Per-identity record of where a conversation stands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub identity: ConversationId,
    pub state: State,
    /// Opaque token of the flow the application last started, if any
    pub flow_token: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(identity: ConversationId, state: State) -> Self {
        Self {
            identity,
            state,
            flow_token: None,
            last_updated: Utc::now(),
        }
    }

    pub fn with_flow_token(mut self, token: impl Into<String>) -> Self {
        self.flow_token = Some(token.into());
        self
    }
}

/// Process-local session store.
///
/// Sessions are lost on restart; use [`crate::db::SessionDatabase`] to keep
/// them.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<ConversationId, ConversationSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_session(
        &self,
        identity: &ConversationId,
    ) -> Result<Option<ConversationSession>, SessionStoreError> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions.get(identity).cloned())
    }

    async fn put_session(&self, session: &ConversationSession) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(session.identity.clone(), session.clone());
        Ok(())
    }
}
