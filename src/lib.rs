//! chatflow - conversational state machines for WhatsApp Cloud API bots
//!
//! Inbound messages are routed to handlers by the customer's current state;
//! the handler's returned state is committed per conversation. Encrypted
//! WhatsApp Flows data exchange is served from the same process.

pub mod api;
pub mod config;
pub mod db;
pub mod flow;
pub mod graph;
pub mod message;
pub mod runtime;
pub mod state_machine;
