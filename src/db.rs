//! Database module
//!
//! Checkpoint persistence for conversation threads.

mod schema;

pub use schema::*;

use crate::graph::{ConversationState, Node, StepSource};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt checkpoint row: {0}")]
    Corrupt(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
///
/// One connection, opened at startup and shared by every session. Access is
/// serialized through the mutex.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn();
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Checkpoint Operations ====================

    /// Append a checkpoint for a thread.
    ///
    /// The step is one past the thread's latest; the parent is the latest
    /// checkpoint's id. Both are read and written in one transaction.
    pub fn put_checkpoint(
        &self,
        thread_id: &str,
        source: StepSource,
        next: Option<Node>,
        state: &ConversationState,
    ) -> DbResult<Checkpoint> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Utc::now();

        let parent: Option<(i64, String)> = tx
            .query_row(
                "SELECT step, checkpoint_id FROM checkpoints
                 WHERE thread_id = ?1 ORDER BY step DESC LIMIT 1",
                params![thread_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let step = parent.as_ref().map_or(0, |(s, _)| s + 1);
        let parent_checkpoint_id = parent.map(|(_, id)| id);
        let checkpoint_id = uuid::Uuid::new_v4().to_string();
        let state_json = serde_json::to_string(state)?;

        tx.execute(
            "INSERT INTO checkpoints (thread_id, step, checkpoint_id, parent_checkpoint_id, source, next_node, state, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                thread_id,
                step,
                checkpoint_id,
                parent_checkpoint_id,
                source.as_str(),
                next.map(Node::as_str),
                state_json,
                now.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        Ok(Checkpoint {
            checkpoint_id,
            thread_id: thread_id.to_string(),
            step,
            parent_checkpoint_id,
            source,
            next,
            state: state.clone(),
            created_at: now,
        })
    }

    /// Latest checkpoint of a thread, if it has any
    pub fn latest_checkpoint(&self, thread_id: &str) -> DbResult<Option<Checkpoint>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT checkpoint_id, thread_id, step, parent_checkpoint_id, source, next_node, state, created_at
             FROM checkpoints WHERE thread_id = ?1 ORDER BY step DESC LIMIT 1",
        )?;

        let row = stmt
            .query_row(params![thread_id], read_checkpoint_row)
            .optional()?;
        row.map(CheckpointRow::into_checkpoint).transpose()
    }

    /// Latest conversation state of a thread; empty for unknown threads
    pub fn get_state(&self, thread_id: &str) -> DbResult<ConversationState> {
        Ok(self
            .latest_checkpoint(thread_id)?
            .map(|cp| cp.state)
            .unwrap_or_default())
    }

    /// Every checkpoint of a thread, oldest first
    pub fn list_checkpoints(&self, thread_id: &str) -> DbResult<Vec<Checkpoint>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT checkpoint_id, thread_id, step, parent_checkpoint_id, source, next_node, state, created_at
             FROM checkpoints WHERE thread_id = ?1 ORDER BY step ASC",
        )?;

        let rows = stmt.query_map(params![thread_id], read_checkpoint_row)?;
        rows.map(|row| row.map_err(DbError::from).and_then(CheckpointRow::into_checkpoint))
            .collect()
    }

    /// Every thread that has ever been checkpointed, ordered by first checkpoint
    pub fn list_threads(&self) -> DbResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT thread_id FROM checkpoints GROUP BY thread_id ORDER BY MIN(rowid) ASC",
        )?;

        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<String>, _>>().map_err(DbError::from)
    }

    /// Delete every checkpoint of a thread.
    ///
    /// Returns how many checkpoints were removed; unknown threads remove none.
    pub fn delete_thread(&self, thread_id: &str) -> DbResult<usize> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM checkpoints WHERE thread_id = ?1",
            params![thread_id],
        )?;
        Ok(deleted)
    }
}

/// Raw checkpoint columns, decoded outside the rusqlite row callback
struct CheckpointRow {
    checkpoint_id: String,
    thread_id: String,
    step: i64,
    parent_checkpoint_id: Option<String>,
    source: String,
    next_node: Option<String>,
    state: String,
    created_at: String,
}

fn read_checkpoint_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CheckpointRow> {
    Ok(CheckpointRow {
        checkpoint_id: row.get(0)?,
        thread_id: row.get(1)?,
        step: row.get(2)?,
        parent_checkpoint_id: row.get(3)?,
        source: row.get(4)?,
        next_node: row.get(5)?,
        state: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl CheckpointRow {
    fn into_checkpoint(self) -> DbResult<Checkpoint> {
        let source = StepSource::parse(&self.source)
            .ok_or_else(|| DbError::Corrupt(format!("unknown source {}", self.source)))?;
        let next = match self.next_node.as_deref() {
            None => None,
            Some(s) => Some(
                Node::parse(s).ok_or_else(|| DbError::Corrupt(format!("unknown node {s}")))?,
            ),
        };

        Ok(Checkpoint {
            checkpoint_id: self.checkpoint_id,
            thread_id: self.thread_id,
            step: self.step,
            parent_checkpoint_id: self.parent_checkpoint_id,
            source,
            next,
            state: serde_json::from_str(&self.state)?,
            created_at: parse_datetime(&self.created_at),
        })
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
