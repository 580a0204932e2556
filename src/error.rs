//! Error types for pulse-redis.

use thiserror::Error;

/// Connection and protocol error kinds.
///
/// A server error reply is *not* represented here; it decodes to
/// [`crate::Value::Error`] and is delivered as an ordinary value.
#[derive(Debug, Error)]
pub enum RedisError {
    /// The session is gone. Requests whose promise was pending when the
    /// connection reset fail with this; they are never replayed.
    #[error("disconnected from Redis")]
    Disconnected,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// Unknown RESP type byte at the start of a reply.
    #[error("bad RESP type byte 0x{0:02x}")]
    BadType(u8),

    /// Unparseable integer in a `:` reply or a length line. Carries the
    /// offending bytes for diagnostics.
    #[error("bad RESP integer {0:?}")]
    BadInteger(Vec<u8>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// More bytes are needed to decode a complete reply. Internal to the
    /// read loop; never surfaced to requestors.
    #[error("incomplete data")]
    Incomplete,
}

/// Result type for Redis operations.
pub type RedisResult<T> = Result<T, RedisError>;
