//! chatflow echo bot
//!
//! Reference deployment: `/echo <text>` replies with the text reversed,
//! other text gets usage help, anything else the invalid-state reply.
//! Serves a demo flow when a private key is configured.

use async_trait::async_trait;
use chatflow::api::{create_router, AppState};
use chatflow::config::BotConfig;
use chatflow::db::SessionDatabase;
use chatflow::flow::{
    FlowAction, FlowCrypto, FlowEndpoint, FlowError, FlowHandler, FlowKeyPair, FlowRequest,
    FlowResponse,
};
use chatflow::graph::GraphApiClient;
use chatflow::message::MessageType;
use chatflow::runtime::{Dispatcher, MessageSender, SessionStore};
use chatflow::state_machine::{handler_fn, HandlerContext, StateRegistry, Trigger};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatflow=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = BotConfig::from_env();
    let token = config.token.clone().ok_or("WHATSAPP_TOKEN is not set")?;

    tracing::info!(path = %config.db_path.display(), "Opening session database");
    let store: Arc<dyn SessionStore> = Arc::new(SessionDatabase::open(&config.db_path)?);

    let graph = GraphApiClient::new(token, &config.graph_api_endpoint, &config.graph_api_version)?;
    tracing::info!(base_url = %graph.base_url(), "Graph API client ready");
    let sender: Arc<dyn MessageSender> = Arc::new(graph);

    let dispatcher = Dispatcher::new(Arc::new(echo_registry()?), store, sender);
    let mut state = AppState::new(dispatcher);

    match &config.verify_token {
        Some(verify_token) => state = state.with_verify_token(verify_token.clone()),
        None => tracing::warn!(
            "WHATSAPP_VERIFY_TOKEN not set; webhook verification will always fail"
        ),
    }

    match &config.flow_private_key_path {
        Some(path) => {
            // A configured key that cannot be loaded is fatal
            let keys = FlowKeyPair::load(path, config.flow_private_key_passphrase.as_deref())?;
            let endpoint = FlowEndpoint::new(FlowCrypto::new(Arc::new(keys)), Arc::new(DemoFlow))
                .with_deadline(config.flow_response_deadline);
            tracing::info!(deadline = ?endpoint.deadline(), "Flow endpoint enabled");
            state = state.with_flow(endpoint);
        }
        None => tracing::warn!("FLOW_PRIVATE_KEY_PATH not set; flow endpoint disabled"),
    }

    let app = create_router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("chatflow listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn echo_registry() -> Result<StateRegistry, Box<dyn std::error::Error>> {
    let mut registry = StateRegistry::new();
    registry
        .register(
            "START",
            Trigger::command("echo"),
            handler_fn(|ctx: HandlerContext| async move {
                let text = ctx.message.text_content().unwrap_or_default();
                let argument = text.trim_start_matches("/echo").trim();
                if argument.is_empty() {
                    ctx.reply_text("Nothing to echo").await?;
                } else {
                    ctx.reply_text(argument.chars().rev().collect::<String>())
                        .await?;
                }
                Ok(ctx.state)
            }),
        )
        .register(
            "START",
            MessageType::Text,
            handler_fn(|ctx: HandlerContext| async move {
                ctx.reply_text("Send /echo <text> and I will say it backwards")
                    .await?;
                Ok(ctx.state)
            }),
        );
    registry.register_invalid_handler(handler_fn(|ctx: HandlerContext| async move {
        ctx.reply_text("Sorry, I only understand text").await?;
        Ok(ctx.state)
    }))?;
    Ok(registry)
}

/// Two-screen demo: a form, then completion with the submitted fields
struct DemoFlow;

#[async_trait]
impl FlowHandler for DemoFlow {
    async fn handle(&self, request: FlowRequest) -> Result<FlowResponse, FlowError> {
        if request.error_notification().is_some() {
            return Ok(FlowResponse::acknowledged());
        }
        match request.action {
            FlowAction::Init | FlowAction::Back => {
                Ok(FlowResponse::screen("FORM", json!({"greeting": "Tell us about you"})))
            }
            _ => {
                let token = request
                    .flow_token
                    .clone()
                    .ok_or_else(|| FlowError::handler("data exchange without a flow token"))?;
                let params = match request.data {
                    Value::Object(fields) => fields,
                    _ => Map::new(),
                };
                Ok(FlowResponse::complete(token, params))
            }
        }
    }
}
