//! Handlers: application code run when a binding fires

use super::State;
use crate::message::{Contact, IncomingMessage, OutgoingMessage};
use crate::runtime::{ConversationId, MessageSender, OutboundError, SendReceipt};
use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Next state, or the failure that aborts the transition
pub type HandlerResult = Result<State, HandlerError>;

/// Failure raised by application handler code.
///
/// The dispatcher never swallows these: the session keeps its pre-handler
/// state and the error reaches the webhook boundary unchanged.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Outbound call failed: {0}")]
    Outbound(#[from] OutboundError),
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Code bound to a state.
///
/// Runs with a [`HandlerContext`] carrying the message and a narrow outbound
/// capability, and returns the state the conversation moves to. Returning
/// the current state is a valid self-loop.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: HandlerContext) -> HandlerResult;
}

#[async_trait]
impl<T: Handler + ?Sized> Handler for Arc<T> {
    async fn handle(&self, ctx: HandlerContext) -> HandlerResult {
        (**self).handle(ctx).await
    }
}

/// Adapter turning an async closure into a [`Handler`]
pub struct FnHandler<F>(F);

/// Wrap `|ctx: HandlerContext| async move { ... }` as a handler
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(HandlerContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(HandlerContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, ctx: HandlerContext) -> HandlerResult {
        (self.0)(ctx).await
    }
}

#[derive(Debug, Default)]
struct FlowTokenSlot {
    current: Option<String>,
    changed: bool,
}

/// Everything a handler may look at or act through
#[derive(Clone)]
pub struct HandlerContext {
    pub identity: ConversationId,
    /// State the conversation was in when the message arrived
    pub state: State,
    pub message: Arc<IncomingMessage>,
    /// Sender profile, when the platform included it
    pub contact: Option<Contact>,
    sender: Arc<dyn MessageSender>,
    flow_token: Arc<Mutex<FlowTokenSlot>>,
}

impl HandlerContext {
    pub fn new(
        identity: ConversationId,
        state: State,
        message: Arc<IncomingMessage>,
        contact: Option<Contact>,
        sender: Arc<dyn MessageSender>,
        flow_token: Option<String>,
    ) -> Self {
        Self {
            identity,
            state,
            message,
            contact,
            sender,
            flow_token: Arc::new(Mutex::new(FlowTokenSlot {
                current: flow_token,
                changed: false,
            })),
        }
    }

    /// Post a message on behalf of the business number that received this one
    pub async fn send(&self, message: &OutgoingMessage) -> Result<SendReceipt, OutboundError> {
        self.sender
            .send_message(&self.identity.bot_number_id, message)
            .await
    }

    /// Send a text message back to the customer
    pub async fn reply_text(&self, body: impl Into<String>) -> Result<SendReceipt, OutboundError> {
        self.send(&OutgoingMessage::text(self.identity.user_id.clone(), body))
            .await
    }

    /// Raw outbound capability, for calls beyond the convenience helpers
    pub fn sender(&self) -> &Arc<dyn MessageSender> {
        &self.sender
    }

    /// Flow token of the session (including one set by this handler)
    pub fn flow_token(&self) -> Option<String> {
        self.lock_slot().current.clone()
    }

    /// Record the token of a flow this handler is starting.
    ///
    /// It is committed together with the next state, and only if the
    /// handler succeeds.
    pub fn start_flow(&self, token: impl Into<String>) {
        let mut slot = self.lock_slot();
        slot.current = Some(token.into());
        slot.changed = true;
    }

    /// The token set through [`start_flow`](Self::start_flow), if any
    pub(crate) fn flow_token_update(&self) -> Option<String> {
        let slot = self.lock_slot();
        if slot.changed {
            slot.current.clone()
        } else {
            None
        }
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, FlowTokenSlot> {
        self.flow_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("message", &self.message.id)
            .finish_non_exhaustive()
    }
}
