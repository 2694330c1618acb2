//! Conversation dispatcher
//!
//! Drives one message through read session → select binding → run handler →
//! commit next state. Dispatches for the same identity are serialized in
//! arrival order; different identities run fully in parallel.

use super::session::{ConversationId, ConversationSession};
use super::traits::{MessageSender, SessionStore, SessionStoreError};
use crate::message::{Contact, Incoming, IncomingMessage};
use crate::state_machine::{select, Handler, HandlerContext, HandlerError, Selection, State, StateRegistry};
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

/// Dispatcher over a type-erased store, as shared by the HTTP layer
pub type SharedDispatcher = Dispatcher<Arc<dyn SessionStore>>;

/// How many committed message ids are remembered for redelivery detection
pub const RECENT_MESSAGE_CAPACITY: usize = 4096;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Handler failed: {0}")]
    Handler(#[from] HandlerError),
    #[error(transparent)]
    SessionStore(#[from] SessionStoreError),
    #[error("No states registered; cannot pick an initial state")]
    EmptyRegistry,
}

/// How the handler for a message was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Binding at `index` (registration order) of the current state
    Binding { index: usize },
    /// The invalid-state handler
    Fallback,
    /// Nothing matched and no fallback exists; no handler ran
    Ignored,
    /// The message id was already dispatched successfully; nothing ran
    Duplicate,
}

/// Result of a successful dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub identity: ConversationId,
    pub previous: State,
    pub next: State,
    pub resolution: Resolution,
}

/// Every message of one webhook change, each dispatched independently
#[derive(Debug, Default)]
pub struct IncomingReport {
    pub outcomes: Vec<DispatchOutcome>,
    /// (message id, error) for each message whose dispatch failed
    pub failures: Vec<(String, DispatchError)>,
}

impl IncomingReport {
    /// Outcomes that actually ran the state machine
    pub fn dispatched(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.resolution != Resolution::Duplicate)
            .count()
    }

    pub fn duplicates(&self) -> usize {
        self.outcomes.len() - self.dispatched()
    }
}

/// Bounded set of message ids, oldest evicted first
struct RecentMessages {
    capacity: usize,
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl RecentMessages {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ids: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: &str) {
        if id.is_empty() || self.capacity == 0 || !self.ids.insert(id.to_string()) {
            return;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }
}

type IdentityLocks = Mutex<HashMap<ConversationId, Arc<tokio::sync::Mutex<()>>>>;

/// Per-identity lock, from the moment a dispatch starts waiting for it.
///
/// Dropping the lease, whether held or still waiting, removes the map entry
/// once no other lease refers to it.
struct IdentityLease<'a> {
    locks: &'a IdentityLocks,
    identity: ConversationId,
    lock: Option<Arc<tokio::sync::Mutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentityLease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        drop(self.lock.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.identity)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.identity);
        }
    }
}

/// The per-user state machine driver.
///
/// Holds the frozen registry, the session store and the outbound capability
/// handed to every handler.
pub struct Dispatcher<S: SessionStore> {
    registry: Arc<StateRegistry>,
    store: S,
    sender: Arc<dyn MessageSender>,
    locks: IdentityLocks,
    recent: Mutex<RecentMessages>,
}

impl<S: SessionStore> Dispatcher<S> {
    pub fn new(registry: Arc<StateRegistry>, store: S, sender: Arc<dyn MessageSender>) -> Self {
        Self {
            registry,
            store,
            sender,
            locks: Mutex::new(HashMap::new()),
            recent: Mutex::new(RecentMessages::new(RECENT_MESSAGE_CAPACITY)),
        }
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Dispatch one message from `identity`.
    ///
    /// The session is only written after the handler returns successfully;
    /// a handler error leaves it exactly as it was and is returned as
    /// [`DispatchError::Handler`]. A message id that already dispatched
    /// successfully is not run again ([`Resolution::Duplicate`]).
    pub async fn handle(
        &self,
        identity: ConversationId,
        message: IncomingMessage,
        contact: Option<Contact>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let _lease = self.lease(&identity).await;

        let session = self.store.get_session(&identity).await?;
        let (current, flow_token) = match &session {
            Some(session) => (session.state.clone(), session.flow_token.clone()),
            None => (self.initial_state()?, None),
        };

        let message_id = message.id.clone();
        if self.is_recent(&message_id) {
            tracing::info!(identity = %identity, message_id = %message_id, "Skipping redelivered message");
            return Ok(DispatchOutcome {
                identity,
                previous: current.clone(),
                next: current,
                resolution: Resolution::Duplicate,
            });
        }

        let (handler, resolution): (Arc<dyn Handler>, Resolution) =
            match select(&self.registry, &current, &message) {
                Selection::Binding { index, binding } => {
                    (Arc::clone(binding.handler()), Resolution::Binding { index })
                }
                Selection::Fallback(handler) => (Arc::clone(handler), Resolution::Fallback),
                Selection::Unmatched => {
                    tracing::warn!(
                        identity = %identity,
                        state = ?current,
                        kind = ?message.kind,
                        "No binding matched and no invalid-state handler is registered"
                    );
                    if session.is_none() {
                        let fresh = ConversationSession::new(identity.clone(), current.clone());
                        self.store.put_session(&fresh).await?;
                    }
                    self.remember(&message_id);
                    return Ok(DispatchOutcome {
                        identity,
                        previous: current.clone(),
                        next: current,
                        resolution: Resolution::Ignored,
                    });
                }
            };

        tracing::debug!(identity = %identity, state = ?current, ?resolution, "Running handler");

        let ctx = HandlerContext::new(
            identity.clone(),
            current.clone(),
            Arc::new(message),
            contact,
            Arc::clone(&self.sender),
            flow_token,
        );
        let next = match handler.handle(ctx.clone()).await {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(identity = %identity, state = ?current, error = %e, "Handler failed");
                return Err(e.into());
            }
        };

        let token_update = ctx.flow_token_update();
        let unchanged = session.is_some() && next == current && token_update.is_none();
        if !unchanged {
            let mut record =
                session.unwrap_or_else(|| ConversationSession::new(identity.clone(), next.clone()));
            record.state = next.clone();
            if token_update.is_some() {
                record.flow_token = token_update;
            }
            record.last_updated = Utc::now();
            self.store.put_session(&record).await?;
        }
        self.remember(&message_id);

        tracing::info!(identity = %identity, from = ?current, to = ?next, "Transition committed");

        Ok(DispatchOutcome {
            identity,
            previous: current,
            next,
            resolution,
        })
    }

    /// Dispatch every message of a webhook change, in delivery order.
    ///
    /// A failed message is logged and reported; the ones after it are
    /// still dispatched.
    pub async fn handle_incoming(&self, incoming: &Incoming) -> IncomingReport {
        for status in &incoming.statuses {
            tracing::debug!(
                message_id = %status.id,
                status = ?status.status,
                recipient = %status.recipient_id,
                "Delivery status update"
            );
        }
        for error in &incoming.errors {
            tracing::warn!(code = error.code, title = ?error.title, "Platform reported an error");
        }

        let mut report = IncomingReport::default();
        for message in &incoming.messages {
            let identity =
                ConversationId::new(incoming.metadata.phone_number_id.clone(), message.from.clone());
            let contact = incoming.contact_for(message).cloned();
            match self.handle(identity.clone(), message.clone(), contact).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    tracing::error!(
                        identity = %identity,
                        message_id = %message.id,
                        error = %e,
                        "Dispatch failed"
                    );
                    report.failures.push((message.id.clone(), e));
                }
            }
        }
        report
    }

    /// Create or overwrite the session of `identity`, e.g. before sending
    /// the customer a flow.
    pub async fn seed_session(
        &self,
        identity: ConversationId,
        state: State,
        flow_token: Option<String>,
    ) -> Result<(), DispatchError> {
        let _lease = self.lease(&identity).await;
        let mut session = ConversationSession::new(identity, state);
        session.flow_token = flow_token;
        self.store.put_session(&session).await?;
        tracing::info!(identity = %session.identity, state = ?session.state, "Session seeded");
        Ok(())
    }

    pub async fn session(
        &self,
        identity: &ConversationId,
    ) -> Result<Option<ConversationSession>, DispatchError> {
        Ok(self.store.get_session(identity).await?)
    }

    fn initial_state(&self) -> Result<State, DispatchError> {
        self.registry
            .initial_state()
            .cloned()
            .ok_or(DispatchError::EmptyRegistry)
    }

    fn is_recent(&self, message_id: &str) -> bool {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(message_id)
    }

    fn remember(&self, message_id: &str) {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(message_id);
    }

    async fn lease(&self, identity: &ConversationId) -> IdentityLease<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(identity.clone()).or_default())
        };
        let mut lease = IdentityLease {
            locks: &self.locks,
            identity: identity.clone(),
            lock: Some(Arc::clone(&lock)),
            guard: None,
        };
        lease.guard = Some(lock.lock_owned().await);
        lease
    }

    #[cfg(test)]
    fn tracked_identities(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
