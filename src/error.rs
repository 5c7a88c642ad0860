//! Error types for redis-streams-trigger.
//!
//! This module provides error types with helpful, actionable messages
//! to help users diagnose and fix common issues.

use thiserror::Error;

/// Result type alias for redis-streams-trigger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by a batch handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by a batch handler.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Errors that can occur in redis-streams-trigger operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Redis connection error (transport open or read failure).
    ///
    /// Fatal to the current read loop; restarting is the caller's
    /// responsibility.
    #[error("{}", format_connection_error(.0))]
    Connection(#[from] redis::RedisError),

    /// Operation attempted against a session that has been shut down.
    #[error(
        "Connection already shut down

The consumer session is terminal once closed. Construct a new
StreamConsumer to resume reading."
    )]
    ConnectionClosed,

    /// Consumer group creation failed for a reason other than the group
    /// already existing. The read loop never starts after this.
    #[error("Failed to create consumer group '{group}' on stream '{stream}': {source}")]
    GroupCreation {
        stream: String,
        group: String,
        #[source]
        source: redis::RedisError,
    },

    /// Appending an entry to the stream failed.
    #[error("Failed to append entry to stream '{stream}': {source}")]
    Append {
        stream: String,
        #[source]
        source: redis::RedisError,
    },

    /// The store returned an entry id that does not parse as
    /// `millis-sequence`.
    #[error("Malformed entry id '{0}' returned by the store")]
    MalformedEntryId(String),

    /// Invalid input parameter (e.g., an empty stream or group name).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A batch handler failed and the consumer is configured to abort.
    #[error("Handler error: {0}")]
    Handler(HandlerError),

    /// Tokio runtime error (e.g., the consumer task panicked).
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Format connection errors with helpful suggestions.
fn format_connection_error(err: &redis::RedisError) -> String {
    let msg = err.to_string();
    let mut result = format!("Redis connection error: {}", msg);

    if msg.contains("Connection refused") || msg.contains("connection refused") {
        result.push_str(
            "

Possible causes:
  - Redis server is not running
  - Wrong host or port in the connection config
  - Firewall blocking connection

To verify Redis is running:
  $ redis-cli ping",
        );
    } else if msg.contains("Authentication")
        || msg.contains("NOAUTH")
        || msg.contains("invalid password")
    {
        result.push_str(
            "

Authentication failed. Check:
  - The password in the connection config
  - Redis ACL configuration",
        );
    }

    result
}

impl Error {
    /// Check if this is the "consumer group already exists" server error.
    ///
    /// `XGROUP CREATE` reports this as the `BUSYGROUP` error code; creation
    /// races between consumers sharing a group name are expected, so callers
    /// treat it as success.
    pub fn is_busy_group(err: &redis::RedisError) -> bool {
        err.code() == Some("BUSYGROUP")
    }
}
