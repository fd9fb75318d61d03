//! TripTalk messaging core
//!
//! This library is the client-resident synchronization engine behind the
//! TripTalk travel client's conversations feature. It reconciles a persistent
//! socket feed, an optimistic local send path, a paginated REST history API,
//! and a durable local cache into a single consistent message/conversation
//! view for the UI layer.
//!
//! Delivery model: at-least-once from the server, deduplicated client-side.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod engine;
pub mod protocol;
pub mod rest;
pub mod socket;
pub mod storage;

/// Result type alias for TripTalk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for TripTalk operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No authenticated identity available for the operation
    #[error("Auth error: {0}")]
    Auth(String),

    /// Precondition violation on a public action (blank content, unknown counterpart)
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// Socket session error
    #[error("Socket error: {0}")]
    Socket(String),

    /// REST API error
    #[error("API error: {0}")]
    Api(String),

    /// Local cache error
    #[error("Cache error: {0}")]
    Cache(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// CBOR serialization error
    #[error("CBOR serialization error: {0}")]
    CborSerialization(String),

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Initialize the TripTalk library with logging
pub fn init() {
    tracing_subscriber::fmt::init();
}
