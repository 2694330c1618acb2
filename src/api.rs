//! HTTP surface of a bot
//!
//! Webhook verification and delivery, the flow data-exchange endpoint and a
//! liveness probe.

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::flow::FlowEndpoint;
use crate::runtime::SharedDispatcher;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<SharedDispatcher>,
    /// `None` disables `POST /flow`
    pub flow: Option<Arc<FlowEndpoint>>,
    /// Token the platform must present during verification
    pub verify_token: Option<String>,
}

impl AppState {
    pub fn new(dispatcher: SharedDispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            flow: None,
            verify_token: None,
        }
    }

    #[must_use]
    pub fn with_flow(mut self, endpoint: FlowEndpoint) -> Self {
        self.flow = Some(Arc::new(endpoint));
        self
    }

    #[must_use]
    pub fn with_verify_token(mut self, token: impl Into<String>) -> Self {
        self.verify_token = Some(token.into());
        self
    }
}
