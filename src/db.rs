//! Database module
//!
//! SQLite persistence for conversation sessions, one row per
//! (bot number, customer) pair.

mod schema;

use schema::{SCHEMA, SESSION_COLUMNS};

use crate::runtime::{ConversationId, ConversationSession};
use crate::state_machine::State;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Stored state is not valid JSON: {0}")]
    CorruptState(#[from] serde_json::Error),
    #[error("Stored timestamp {value:?} is not RFC 3339: {source}")]
    CorruptTimestamp {
        value: String,
        source: chrono::ParseError,
    },
    #[error("Could not create database directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe session database handle
#[derive(Clone)]
pub struct SessionDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SessionDatabase {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session of `identity`, if one was ever stored
    pub fn load_session(&self, identity: &ConversationId) -> DbResult<Option<ConversationSession>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE bot_number_id = ?1 AND user_id = ?2"
        ))?;

        let row = stmt
            .query_row(params![identity.bot_number_id, identity.user_id], read_row)
            .optional()?;
        row.map(SessionRow::into_session).transpose()
    }

    /// Insert the session, or replace the stored one for the same identity
    pub fn upsert_session(&self, session: &ConversationSession) -> DbResult<()> {
        let state = serde_json::to_string(&session.state)?;
        self.conn().execute(
            "INSERT INTO sessions (bot_number_id, user_id, state, flow_token, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (bot_number_id, user_id) DO UPDATE SET
                state = excluded.state,
                flow_token = excluded.flow_token,
                updated_at = excluded.updated_at",
            params![
                session.identity.bot_number_id,
                session.identity.user_id,
                state,
                session.flow_token,
                timestamp(&session.last_updated),
            ],
        )?;
        Ok(())
    }

    /// Find the session a flow token was issued to
    pub fn find_by_flow_token(&self, flow_token: &str) -> DbResult<Option<ConversationSession>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE flow_token = ?1
             ORDER BY updated_at DESC LIMIT 1"
        ))?;

        let row = stmt.query_row(params![flow_token], read_row).optional()?;
        row.map(SessionRow::into_session).transpose()
    }

    /// Returns whether a row was removed
    pub fn delete_session(&self, identity: &ConversationId) -> DbResult<bool> {
        let removed = self.conn().execute(
            "DELETE FROM sessions WHERE bot_number_id = ?1 AND user_id = ?2",
            params![identity.bot_number_id, identity.user_id],
        )?;
        Ok(removed > 0)
    }

    /// Drop sessions idle since before `cutoff`; returns how many went
    pub fn prune_sessions_before(&self, cutoff: DateTime<Utc>) -> DbResult<usize> {
        let removed = self.conn().execute(
            "DELETE FROM sessions WHERE updated_at < ?1",
            params![timestamp(&cutoff)],
        )?;
        if removed > 0 {
            tracing::info!(removed, %cutoff, "Pruned idle sessions");
        }
        Ok(removed)
    }
}

struct SessionRow {
    bot_number_id: String,
    user_id: String,
    state: String,
    flow_token: Option<String>,
    updated_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        bot_number_id: row.get(0)?,
        user_id: row.get(1)?,
        state: row.get(2)?,
        flow_token: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

impl SessionRow {
    fn into_session(self) -> DbResult<ConversationSession> {
        let state: State = serde_json::from_str(&self.state)?;
        Ok(ConversationSession {
            identity: ConversationId::new(self.bot_number_id, self.user_id),
            state,
            flow_token: self.flow_token,
            last_updated: parse_datetime(self.updated_at)?,
        })
    }
}

/// Fixed-width UTC timestamps so `updated_at` compares lexically
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(value: String) -> DbResult<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(&value) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(source) => Err(DbError::CorruptTimestamp { value, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::SessionStore;
    use chrono::Duration;

    fn identity(user: &str) -> ConversationId {
        ConversationId::new("1001", user)
    }

    #[test]
    fn test_upsert_and_load_session() {
        let db = SessionDatabase::open_in_memory().unwrap();
        assert!(db.load_session(&identity("a")).unwrap().is_none());

        let session = ConversationSession::new(identity("a"), State::from("START"));
        db.upsert_session(&session).unwrap();

        let mut updated = session.clone().with_flow_token("flow-1");
        updated.state = State::Id(7);
        db.upsert_session(&updated).unwrap();

        let loaded = db.load_session(&identity("a")).unwrap().unwrap();
        assert_eq!(loaded.state, State::Id(7));
        assert_eq!(loaded.flow_token.as_deref(), Some("flow-1"));
        assert_eq!(
            loaded.last_updated.timestamp_millis(),
            updated.last_updated.timestamp_millis()
        );
    }

    #[test]
    fn test_find_by_flow_token() {
        let db = SessionDatabase::open_in_memory().unwrap();
        db.upsert_session(&ConversationSession::new(identity("a"), "START".into()))
            .unwrap();
        db.upsert_session(
            &ConversationSession::new(identity("b"), "SURVEY".into()).with_flow_token("tok-b"),
        )
        .unwrap();

        let found = db.find_by_flow_token("tok-b").unwrap().unwrap();
        assert_eq!(found.identity, identity("b"));
        assert!(db.find_by_flow_token("missing").unwrap().is_none());
    }

    #[test]
    fn test_delete_and_prune() {
        let db = SessionDatabase::open_in_memory().unwrap();
        let mut stale = ConversationSession::new(identity("old"), "START".into());
        stale.last_updated = Utc::now() - Duration::days(30);
        db.upsert_session(&stale).unwrap();
        db.upsert_session(&ConversationSession::new(identity("new"), "START".into()))
            .unwrap();

        assert_eq!(db.prune_sessions_before(Utc::now() - Duration::days(1)).unwrap(), 1);
        assert!(db.load_session(&identity("old")).unwrap().is_none());

        assert!(db.delete_session(&identity("new")).unwrap());
        assert!(!db.delete_session(&identity("new")).unwrap());
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.db");

        let db = SessionDatabase::open(&path).unwrap();
        db.upsert_session(&ConversationSession::new(identity("a"), "START".into()))
            .unwrap();

        let reopened = SessionDatabase::open(&path).unwrap();
        assert!(reopened.load_session(&identity("a")).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_timestamp_is_an_error() {
        let db = SessionDatabase::open_in_memory().unwrap();
        db.upsert_session(&ConversationSession::new(identity("a"), "START".into()))
            .unwrap();
        db.conn()
            .execute("UPDATE sessions SET updated_at = 'yesterday-ish'", [])
            .unwrap();

        let err = db.load_session(&identity("a")).unwrap_err();
        assert!(matches!(err, DbError::CorruptTimestamp { ref value, .. } if value == "yesterday-ish"));
    }

    #[tokio::test]
    async fn test_session_store_contract() {
        let db = SessionDatabase::open_in_memory().unwrap();

        assert_eq!(db.get_state(&identity("a")).await.unwrap(), None);
        db.set_state(&identity("a"), "MENU".into()).await.unwrap();
        assert_eq!(db.get_state(&identity("a")).await.unwrap(), Some("MENU".into()));
    }
}
