//! Bot configuration from the environment

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GRAPH_API_ENDPOINT: &str = "https://graph.facebook.com";
pub const DEFAULT_GRAPH_API_VERSION: &str = "v19.0";
pub const DEFAULT_PORT: u16 = 8000;
const DEFAULT_FLOW_DEADLINE_MS: u64 = 10_000;

/// Configuration for a bot process
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Cloud API access token
    pub token: Option<String>,
    pub verify_token: Option<String>,
    pub graph_api_endpoint: String,
    pub graph_api_version: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// No key path means no flow endpoint
    pub flow_private_key_path: Option<PathBuf>,
    pub flow_private_key_passphrase: Option<String>,
    pub flow_response_deadline: Duration,
}

impl BotConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = var("CHATFLOW_DB_PATH").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".chatflow").join("sessions.db")
            },
            PathBuf::from,
        );

        Self {
            token: var("WHATSAPP_TOKEN"),
            verify_token: var("WHATSAPP_VERIFY_TOKEN"),
            graph_api_endpoint: var("GRAPH_API_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_GRAPH_API_ENDPOINT.to_string()),
            graph_api_version: var("GRAPH_API_VERSION")
                .unwrap_or_else(|| DEFAULT_GRAPH_API_VERSION.to_string()),
            port: var("CHATFLOW_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            db_path,
            flow_private_key_path: var("FLOW_PRIVATE_KEY_PATH").map(PathBuf::from),
            flow_private_key_passphrase: var("FLOW_PRIVATE_KEY_PASSPHRASE"),
            flow_response_deadline: Duration::from_millis(
                var("FLOW_RESPONSE_DEADLINE_MS")
                    .and_then(|ms| ms.parse().ok())
                    .unwrap_or(DEFAULT_FLOW_DEADLINE_MS),
            ),
        }
    }
}
