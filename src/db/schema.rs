//! Database schema

/// SQL schema for initialization
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    bot_number_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    state TEXT NOT NULL,
    flow_token TEXT,
    updated_at TEXT NOT NULL,

    PRIMARY KEY (bot_number_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at);
CREATE INDEX IF NOT EXISTS idx_sessions_flow_token ON sessions(flow_token);
"#;

/// Columns selected by every session query, in row-parsing order
pub const SESSION_COLUMNS: &str = "bot_number_id, user_id, state, flow_token, updated_at";
