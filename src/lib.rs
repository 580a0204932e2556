//! Prioritized, pipelined connection to a Redis-compatible server.
//!
//! One long-lived session multiplexes many producers onto a single RESP-2
//! socket. Producers enqueue work at a [`QueryPriority`]; a writer task
//! drains the most important non-suppressed class first, a reader task
//! matches pipelined replies back to the requestors in wire order, and a
//! connector task transparently reconnects (with back-off) whenever the
//! session fails. Requests pending at the moment of a reset fail with
//! [`RedisError::Disconnected`]; nothing is replayed.
//!
//! # Example
//! ```ignore
//! use pulse_redis::{ConnectInfo, Query, QueryPriority, RedisConnection};
//!
//! let con = RedisConnection::new(ConnectInfo::new("127.0.0.1", 6379));
//! con.start();
//!
//! con.fire_and_forget(
//!     Query::cmd("XADD").arg("pulse:history").arg("*").arg("state").arg("up"),
//!     QueryPriority::History,
//! );
//!
//! let pong = con.get_result(Query::cmd("PING"), QueryPriority::Heartbeat).await?;
//! assert_eq!(pong.as_str(), Some("PONG"));
//! ```

pub mod cmd;
pub mod connection;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod queue;
mod transport;
pub mod value;

pub use cmd::Query;
pub use connection::{ConnectInfo, RedisConnection};
pub use error::{RedisError, RedisResult};
pub use queue::QueryPriority;
pub use value::Value;
