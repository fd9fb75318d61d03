//! Durable local cache with bounded freshness windows
//!
//! Every entry carries its write timestamp. A read is authoritative only
//! inside the freshness window for its key; after that the value is a hint
//! and the engine revalidates from the server. The window check is a pure
//! function on the entry so the trust policy is independently testable.
//!
//! Values are CBOR blobs in a single SQLite table. A row that fails to
//! decode (schema drift, torn write) is treated as absent, never as fatal.

use crate::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;

use crate::auth::UserProfile;
use crate::storage::bubble::BubbleSet;
use crate::storage::conversation::ConversationPreview;

/// Freshness window for the counterpart directory snapshot (~5 minutes)
pub const DIRECTORY_TTL_MS: i64 = 5 * 60 * 1_000;

/// Freshness window for the conversation-preview snapshot (~2 minutes)
pub const CONVERSATIONS_TTL_MS: i64 = 2 * 60 * 1_000;

/// Persisted cache keys
pub mod keys {
    /// Counterpart directory snapshot
    pub const DIRECTORY: &str = "directory";
    /// Conversation-preview snapshot
    pub const CONVERSATIONS: &str = "conversations";
    /// Minimized-bubble metadata list
    pub const BUBBLES: &str = "bubbles";
    /// Active-conversation pointer for reload restoration
    pub const ACTIVE_CONVERSATION: &str = "active_conversation";
}

/// A cached value together with its write timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached value
    pub value: T,
    /// Unix-epoch milliseconds of the write
    pub written_at: i64,
}

impl<T> CacheEntry<T> {
    /// Wrap a value with its write timestamp
    pub fn new(value: T, written_at: i64) -> Self {
        Self { value, written_at }
    }

    /// Whether the entry is still inside its freshness window
    pub fn is_fresh(&self, ttl_ms: i64, now_ms: i64) -> bool {
        now_ms - self.written_at <= ttl_ms
    }
}

/// SQLite-backed cache store
pub struct CacheStore {
    conn: Mutex<Connection>,
}

impl CacheStore {
    /// Open a cache store backed by a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::Cache(format!("Failed to open cache database: {}", e)))?;
        Self::with_connection(conn)
    }

    /// Open an in-memory cache store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Cache(format!("Failed to create in-memory cache: {}", e)))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Write a value under `key` with the given write timestamp
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, written_at: i64) -> Result<()> {
        let blob = serde_cbor::to_vec(value)
            .map_err(|e| Error::CborSerialization(format!("Failed to serialize cache value: {}", e)))?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO cache_entries (key, value, written_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, written_at = ?3",
            params![key, blob, written_at],
        )?;
        Ok(())
    }

    /// Read the entry under `key`
    ///
    /// Returns `Ok(None)` when the key is absent or the stored blob does not
    /// decode; a corrupt row is logged and treated as a cache miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheEntry<T>>> {
        let conn = self.conn.lock().await;
        let row: Option<(Vec<u8>, i64)> = conn
            .query_row(
                "SELECT value, written_at FROM cache_entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((blob, written_at)) = row else {
            return Ok(None);
        };
        match serde_cbor::from_slice(&blob) {
            Ok(value) => Ok(Some(CacheEntry::new(value, written_at))),
            Err(e) => {
                tracing::warn!("Discarding corrupt cache entry {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Remove the entry under `key`
    pub async fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    // ========== Typed snapshot accessors ==========

    /// Persist the counterpart directory snapshot
    pub async fn put_directory(&self, profiles: &[UserProfile], now_ms: i64) -> Result<()> {
        self.put(keys::DIRECTORY, &profiles, now_ms).await
    }

    /// Read the counterpart directory snapshot
    pub async fn get_directory(&self) -> Result<Option<CacheEntry<Vec<UserProfile>>>> {
        self.get(keys::DIRECTORY).await
    }

    /// Persist the conversation-preview snapshot
    pub async fn put_conversations(
        &self,
        entries: &[ConversationPreview],
        now_ms: i64,
    ) -> Result<()> {
        self.put(keys::CONVERSATIONS, &entries, now_ms).await
    }

    /// Read the conversation-preview snapshot
    pub async fn get_conversations(&self) -> Result<Option<CacheEntry<Vec<ConversationPreview>>>> {
        self.get(keys::CONVERSATIONS).await
    }

    /// Persist the bubble metadata list (never message bodies)
    pub async fn put_bubbles(&self, bubbles: &BubbleSet, now_ms: i64) -> Result<()> {
        self.put(keys::BUBBLES, bubbles, now_ms).await
    }

    /// Read the bubble metadata list
    pub async fn get_bubbles(&self) -> Result<Option<CacheEntry<BubbleSet>>> {
        self.get(keys::BUBBLES).await
    }

    /// Persist or clear the active-conversation pointer
    pub async fn put_active_conversation(
        &self,
        counterpart_id: Option<&str>,
        now_ms: i64,
    ) -> Result<()> {
        match counterpart_id {
            Some(id) => self.put(keys::ACTIVE_CONVERSATION, &id, now_ms).await,
            None => self.remove(keys::ACTIVE_CONVERSATION).await,
        }
    }

    /// Read the active-conversation pointer
    pub async fn get_active_conversation(&self) -> Result<Option<CacheEntry<String>>> {
        self.get(keys::ACTIVE_CONVERSATION).await
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            value BLOB NOT NULL,
            written_at INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}
