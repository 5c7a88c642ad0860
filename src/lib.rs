//! # redis-streams-trigger
//!
//! Consumer-group trigger loop for Redis Streams.
//!
//! This crate provides a long-lived stream reader: it joins a named consumer
//! group on an append-only stream, repeatedly performs blocking batched reads
//! on behalf of one named consumer, and forwards each decoded [`Batch`] to a
//! caller-supplied handler. Consumer offsets are tracked server-side by the
//! group, so each entry is delivered to at most one consumer in the group.
//!
//! Two run modes are supported: [`RunMode::Continuous`] polls indefinitely
//! until stopped; [`RunMode::SinglePass`] performs exactly one read attempt
//! and closes, suitable for manual one-shot invocation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use redis_streams_trigger::{
//!     ConnectionConfig, ConsumerConfig, RunMode, StreamConsumer, StreamIdentity,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> redis_streams_trigger::Result<()> {
//! let connection = ConnectionConfig::new("localhost", 6379).with_database(0);
//! let identity = StreamIdentity::new("events", "workers", "worker-1")?;
//!
//! let mut consumer = StreamConsumer::new(RunMode::Continuous, connection, identity)?
//!     .with_config(ConsumerConfig::new().with_batch_size(100));
//!
//! consumer
//!     .run(|batch| {
//!         for entry in &batch {
//!             println!("{}: {:?}", entry.id, entry.fields);
//!         }
//!         Ok(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Stopping a continuous loop
//!
//! ```no_run
//! # use redis_streams_trigger::{ConnectionConfig, RunMode, StreamConsumer, StreamIdentity};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> redis_streams_trigger::Result<()> {
//! # let connection = ConnectionConfig::new("localhost", 6379);
//! # let identity = StreamIdentity::new("events", "workers", "worker-1")?;
//! let consumer = StreamConsumer::new(RunMode::Continuous, connection, identity)?;
//! let handle = consumer.spawn(|batch| {
//!     println!("got {} entries", batch.len());
//!     Ok(())
//! });
//!
//! // ... later, from another execution context:
//! handle.stop().await?;
//! # Ok(())
//! # }
//! ```

// Module organization:
// - stream/     : consumer-group read loop and entry decoding
// - (top-level) : shared infrastructure (connection, error)

mod connection;
mod error;
pub mod stream;

pub use connection::{ConnectionConfig, RedisConnection};
pub use error::{Error, HandlerError, HandlerResult, Result};
pub use stream::{
    Batch, ConsumerConfig, ConsumerHandle, ConsumerStats, EntryId, OnHandlerError, RunMode,
    StartPosition, StreamConsumer, StreamEntry, StreamIdentity, DEFAULT_BLOCK,
};
