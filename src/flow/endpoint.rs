//! Flow data-exchange endpoint logic

use super::crypto::{FlowCrypto, FlowRequestEnvelope};
use super::error::FlowError;
use super::payload::{FlowAction, FlowRequest, FlowResponse};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long the platform waits for a data-exchange response
pub const DEFAULT_RESPONSE_DEADLINE: Duration = Duration::from_secs(10);

/// Application logic behind a flow endpoint.
///
/// Pings never reach it; they are answered by the endpoint itself.
#[async_trait]
pub trait FlowHandler: Send + Sync {
    /// `INIT`, `data_exchange` and `BACK` requests, error notifications included
    async fn handle(&self, request: FlowRequest) -> Result<FlowResponse, FlowError>;

    /// Actions this crate does not know about
    async fn unsupported_action(&self, request: FlowRequest) -> Result<FlowResponse, FlowError> {
        Err(FlowError::UnsupportedAction(request.action.to_string()))
    }
}

#[async_trait]
impl<T: FlowHandler + ?Sized> FlowHandler for Arc<T> {
    async fn handle(&self, request: FlowRequest) -> Result<FlowResponse, FlowError> {
        (**self).handle(request).await
    }

    async fn unsupported_action(&self, request: FlowRequest) -> Result<FlowResponse, FlowError> {
        (**self).unsupported_action(request).await
    }
}

/// Decrypt → handle → encrypt, bounded by a deadline
pub struct FlowEndpoint {
    crypto: FlowCrypto,
    handler: Arc<dyn FlowHandler>,
    deadline: Duration,
}

impl FlowEndpoint {
    pub fn new(crypto: FlowCrypto, handler: Arc<dyn FlowHandler>) -> Self {
        Self {
            crypto,
            handler,
            deadline: DEFAULT_RESPONSE_DEADLINE,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run one request through the full cycle and return the encrypted body.
    ///
    /// Past the deadline the work is dropped and
    /// [`FlowError::DeadlineExceeded`] returned; the platform has already
    /// shown its timeout by then, so nothing is sent late.
    pub async fn respond(&self, envelope: FlowRequestEnvelope) -> Result<Vec<u8>, FlowError> {
        let started = Instant::now();
        match tokio::time::timeout(self.deadline, self.cycle(envelope)).await {
            Ok(result) => {
                tracing::debug!(elapsed = ?started.elapsed(), ok = result.is_ok(), "Flow cycle finished");
                result
            }
            Err(_) => {
                tracing::warn!(deadline = ?self.deadline, "Flow response deadline exceeded");
                Err(FlowError::DeadlineExceeded(self.deadline))
            }
        }
    }

    async fn cycle(&self, envelope: FlowRequestEnvelope) -> Result<Vec<u8>, FlowError> {
        // RSA unwrap is CPU-bound; keep it off the async workers
        let crypto = self.crypto.clone();
        let decrypted = tokio::task::spawn_blocking(move || crypto.decrypt(&envelope))
            .await
            .map_err(|e| FlowError::handler(format!("decryption task failed: {e}")))??;

        let request = decrypted.payload;
        let action = request.action.clone();
        tracing::info!(
            action = %action,
            screen = ?request.screen,
            flow_token = ?request.flow_token,
            "Flow request"
        );

        let response = match action {
            FlowAction::Ping => FlowResponse::health_check(),
            FlowAction::Other(_) => self.handler.unsupported_action(request).await?,
            FlowAction::Init | FlowAction::DataExchange | FlowAction::Back => {
                if let Some((error, message)) = request.error_notification() {
                    tracing::warn!(error, error_message = ?message, "Flow client reported an error");
                }
                self.handler.handle(request).await?
            }
        };

        decrypted.key.encrypt(&response)
    }
}
