//! Runtime driving conversations
//!
//! The dispatcher reads a session, runs the pure matcher, executes the
//! selected handler and commits the next state. Storage and outbound
//! messaging sit behind the traits in [`traits`] so both can be swapped for
//! mocks in tests.

mod dispatcher;
mod session;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use dispatcher::{
    DispatchError, DispatchOutcome, Dispatcher, IncomingReport, Resolution, SharedDispatcher,
    RECENT_MESSAGE_CAPACITY,
};
pub use session::{ConversationId, ConversationSession, InMemorySessionStore};
pub use traits::*;
