//! Durable state: the settings table and the per-sender conversation
//! history, both in sqlite.
//!
//! Every call funnels through `spawn_blocking` so the async handlers never
//! block on disk I/O. Settings writes are find-then-save rather than an
//! atomic upsert; contention is one conversational partner at a time, so
//! the check-then-act window is accepted (see DESIGN.md before reusing this
//! in a multi-tenant setting). History is append-only with no retention —
//! the windowed read bounds what generation ever sees.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const SETTING_AI_ACTIVE: &str = "is_ai_active";
pub const SETTING_CURRENT_STATUS: &str = "current_status";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS chat_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id TEXT NOT NULL,
    message TEXT NOT NULL,
    role TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chat_history_sender_id ON chat_history(sender_id);
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRole {
    User,
    Assistant,
}

impl HistoryRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(anyhow!("unknown history role {other:?}")),
        }
    }
}

/// One conversation turn as stored.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub sender_id: String,
    pub message: String,
    pub role: HistoryRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("open sqlite db {}", path.as_ref().display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("apply sqlite schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard)
        })
        .await
        .context("store task join failed")?
    }

    /// Read a setting, falling back to `default` when the row was never
    /// written.
    pub async fn setting_or(&self, key: &str, default: &str) -> Result<String> {
        let key = key.to_string();
        let default = default.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached("SELECT value FROM settings WHERE key = ?1")?;
            let value = stmt
                .query_map(params![key], |row| row.get::<_, String>(0))?
                .next()
                .transpose()?;
            Ok(value.unwrap_or(default))
        })
        .await
    }

    /// Write a setting, creating the row lazily on first use.
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            // find-then-save, not an atomic upsert; see module docs.
            let existing: Option<i64> = conn
                .prepare_cached("SELECT id FROM settings WHERE key = ?1")?
                .query_map(params![key], |row| row.get(0))?
                .next()
                .transpose()?;
            match existing {
                Some(id) => {
                    conn.execute(
                        "UPDATE settings SET value = ?1, updated_at = ?2 WHERE id = ?3",
                        params![value, now, id],
                    )?;
                }
                None => {
                    conn.execute(
                        "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
                        params![key, value, now],
                    )?;
                }
            }
            Ok(())
        })
        .await
    }

    /// Auto-reply is active unless explicitly toggled off.
    pub async fn is_ai_active(&self) -> Result<bool> {
        Ok(self.setting_or(SETTING_AI_ACTIVE, "true").await? != "false")
    }

    pub async fn set_ai_active(&self, active: bool) -> Result<()> {
        self.set_setting(SETTING_AI_ACTIVE, if active { "true" } else { "false" })
            .await
    }

    /// The `limit` most recent turns for a sender, re-ordered oldest-first
    /// for prompt assembly. Older context is simply dropped.
    pub async fn recent_history(&self, sender_id: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let sender_id = sender_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT sender_id, message, role, created_at
                 FROM chat_history
                 WHERE sender_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![sender_id, limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut entries = Vec::with_capacity(rows.len());
            for (sender_id, message, role, created_at) in rows {
                entries.push(HistoryEntry {
                    sender_id,
                    message,
                    role: HistoryRole::parse(&role)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .with_context(|| format!("bad history timestamp {created_at:?}"))?
                        .with_timezone(&Utc),
                });
            }
            entries.reverse();
            Ok(entries)
        })
        .await
    }

    /// Persist one completed exchange: the user turn, then the produced
    /// reply, as a single logical append.
    pub async fn append_exchange(
        &self,
        sender_id: &str,
        user_text: &str,
        reply_text: &str,
    ) -> Result<()> {
        let sender_id = sender_id.to_string();
        let user_text = user_text.to_string();
        let reply_text = reply_text.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO chat_history (sender_id, message, role, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![sender_id, user_text, HistoryRole::User.as_str(), now],
            )?;
            tx.execute(
                "INSERT INTO chat_history (sender_id, message, role, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![sender_id, reply_text, HistoryRole::Assistant.as_str(), now],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Total number of stored turns for a sender (diagnostics and tests).
    pub async fn history_len(&self, sender_id: &str) -> Result<usize> {
        let sender_id = sender_id.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chat_history WHERE sender_id = ?1",
                params![sender_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }
}
