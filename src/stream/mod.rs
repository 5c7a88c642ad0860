//! Redis Stream consumer-group support.
//!
//! The `consumer` submodule provides [`StreamConsumer`], the read loop that
//! joins a consumer group and forwards decoded batches to a handler; the
//! `reader` submodule holds the entry decoding it builds on.

mod consumer;
mod reader;

pub use consumer::{
    ConsumerConfig, ConsumerHandle, ConsumerStats, OnHandlerError, RunMode, StartPosition,
    StreamConsumer, StreamIdentity, DEFAULT_BLOCK,
};
pub use reader::{Batch, EntryId, StreamEntry};
