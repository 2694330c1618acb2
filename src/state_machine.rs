//! Conversation state machine
//!
//! The declarative state table (which handlers run in which state) and the
//! pure matcher that picks one of them for an incoming message. Nothing in
//! here performs I/O; the runtime drives it.

mod handler;
mod registry;
pub mod state;
mod transition;
mod trigger;

#[cfg(test)]
mod proptests;

pub use handler::{handler_fn, FnHandler, Handler, HandlerContext, HandlerError, HandlerResult};
pub use registry::{RegistryError, StateBinding, StateRegistry};
pub use state::State;
pub use transition::{select, select_binding, Selection};
pub use trigger::Trigger;
