//! Mock implementations for testing
//!
//! These mocks let the dispatcher and the HTTP layer run without a real
//! platform or database.

use super::session::{ConversationId, ConversationSession};
use super::traits::*;
use crate::message::{IncomingMessage, OutgoingMessage};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// ============================================================================
// Fixtures
// ============================================================================

/// Text message from the customer `5511988887777`
pub fn text_message(body: &str) -> IncomingMessage {
    static NEXT_ID: AtomicUsize = AtomicUsize::new(1);
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    IncomingMessage::text(format!("wamid.test{id}"), "5511988887777", body)
}

// ============================================================================
// Mock Message Sender
// ============================================================================

/// Sender that records every message instead of posting it
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, OutgoingMessage)>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// (bot number id, message) pairs in send order
    pub fn sent(&self) -> Vec<(String, OutgoingMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_message(
        &self,
        bot_number_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SendReceipt, OutboundError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((bot_number_id.to_string(), message.clone()));
        Ok(SendReceipt {
            messages: vec![SentMessage {
                id: format!("wamid.out{}", sent.len()),
            }],
        })
    }
}

/// Sender whose every call fails with an API error
pub struct FailingSender;

#[async_trait]
impl MessageSender for FailingSender {
    async fn send_message(
        &self,
        _bot_number_id: &str,
        _message: &OutgoingMessage,
    ) -> Result<SendReceipt, OutboundError> {
        Err(OutboundError::Api {
            status: 400,
            body: r#"{"error":{"message":"Invalid parameter"}}"#.to_string(),
        })
    }
}

// ============================================================================
// Mock Session Store
// ============================================================================

/// Store that is always down
pub struct FailingSessionStore;

#[async_trait]
impl SessionStore for FailingSessionStore {
    async fn get_session(
        &self,
        _identity: &ConversationId,
    ) -> Result<Option<ConversationSession>, SessionStoreError> {
        Err(SessionStoreError::Unavailable("connection refused".to_string()))
    }

    async fn put_session(&self, _session: &ConversationSession) -> Result<(), SessionStoreError> {
        Err(SessionStoreError::Unavailable("connection refused".to_string()))
    }
}
