//! Consumer-group read loop over a single Redis stream.
//!
//! This module provides [`StreamConsumer`]: it owns one connection, ensures
//! its consumer group exists (idempotently), and repeatedly performs blocking
//! batched `XREADGROUP` reads on behalf of one named consumer, forwarding
//! each decoded [`Batch`] to a caller-supplied handler.
//!
//! # Example
//!
//! ```ignore
//! use redis_streams_trigger::{
//!     ConnectionConfig, ConsumerConfig, RunMode, StreamConsumer, StreamIdentity,
//! };
//!
//! let connection = ConnectionConfig::new("localhost", 6379);
//! let identity = StreamIdentity::new("events", "workers", "worker-1")?;
//!
//! let mut consumer = StreamConsumer::new(RunMode::Continuous, connection, identity)?
//!     .with_config(ConsumerConfig::new().with_batch_size(100));
//!
//! consumer
//!     .run(|batch| {
//!         println!("got {} entries", batch.len());
//!         Ok(())
//!     })
//!     .await?;
//! ```

use std::time::{Duration, Instant};

use redis::aio::MultiplexedConnection;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reader::{flatten_reply, Batch, EntryId, XReadGroupReply};
use crate::connection::{ConnectionConfig, RedisConnection};
use crate::error::{Error, HandlerResult, Result};

/// Default duration one read blocks waiting for new entries.
pub const DEFAULT_BLOCK: Duration = Duration::from_secs(30);

// ============================================================================
// Consumer Configuration
// ============================================================================

/// How the read loop is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Poll indefinitely; exit only via shutdown or an unrecovered read error.
    #[default]
    Continuous,
    /// Perform exactly one read attempt (data, idle timeout, or error), then
    /// close the connection and exit. Suitable for manual one-shot invocation.
    SinglePass,
}

/// Where a newly created consumer group starts reading.
///
/// The default replays the stream's full retained history; `Tail` delivers
/// only entries appended after group creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// Start at the stream's origin offset (`0`).
    #[default]
    Origin,
    /// Start at the current tail (`$`).
    Tail,
}

impl StartPosition {
    /// The id argument `XGROUP CREATE` expects for this position.
    pub fn as_id(self) -> &'static str {
        match self {
            StartPosition::Origin => "0",
            StartPosition::Tail => "$",
        }
    }
}

/// What the read loop does when a handler invocation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnHandlerError {
    /// Terminate the loop, surfacing [`Error::Handler`] to the caller.
    #[default]
    Abort,
    /// Log a warning and continue with the next read.
    Skip,
}

/// Names identifying this consumer on the stream.
///
/// Invariant: all three names are non-empty, enforced at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamIdentity {
    stream: String,
    group: String,
    consumer: String,
}

impl StreamIdentity {
    /// Create a stream identity, validating that no name is empty.
    pub fn new(
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self> {
        let identity = Self {
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
        };
        if identity.stream.is_empty() {
            return Err(Error::InvalidConfig(
                "stream name must not be empty".to_string(),
            ));
        }
        if identity.group.is_empty() {
            return Err(Error::InvalidConfig(
                "group name must not be empty".to_string(),
            ));
        }
        if identity.consumer.is_empty() {
            return Err(Error::InvalidConfig(
                "consumer name must not be empty".to_string(),
            ));
        }
        Ok(identity)
    }

    /// The stream key read from.
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// The consumer group name.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The consumer name within the group.
    pub fn consumer(&self) -> &str {
        &self.consumer
    }
}

/// Configuration for the consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Duration one read blocks waiting for new entries.
    pub block: Duration,
    /// Maximum entries per read (`None` = store default, unbounded).
    pub batch_size: Option<usize>,
    /// Where a newly created group starts reading.
    pub start_position: StartPosition,
    /// Whether to create the stream if it doesn't exist yet (`MKSTREAM`),
    /// letting a consumer come up before its producer.
    pub mkstream: bool,
    /// Whether to acknowledge each batch after a successful handler call.
    pub auto_ack: bool,
    /// What to do when a handler invocation fails.
    pub on_handler_error: OnHandlerError,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            block: DEFAULT_BLOCK,
            batch_size: None,
            start_position: StartPosition::Origin,
            mkstream: true,
            auto_ack: false,
            on_handler_error: OnHandlerError::Abort,
        }
    }
}

impl ConsumerConfig {
    /// Create a new consumer configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block duration for each read.
    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = block;
        self
    }

    /// Set the maximum number of entries per read.
    ///
    /// `0` means unbounded, matching the store default.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = if size == 0 { None } else { Some(size) };
        self
    }

    /// Set where a newly created group starts reading.
    pub fn with_start_position(mut self, position: StartPosition) -> Self {
        self.start_position = position;
        self
    }

    /// Set whether group creation also creates the stream (`MKSTREAM`).
    pub fn with_mkstream(mut self, mkstream: bool) -> Self {
        self.mkstream = mkstream;
        self
    }

    /// Set whether to acknowledge each batch after a successful handler call.
    pub fn with_auto_ack(mut self, auto_ack: bool) -> Self {
        self.auto_ack = auto_ack;
        self
    }

    /// Set the handler-failure policy.
    pub fn with_on_handler_error(mut self, policy: OnHandlerError) -> Self {
        self.on_handler_error = policy;
        self
    }
}

// ============================================================================
// Consumer Statistics
// ============================================================================

/// Statistics about stream consumption.
#[derive(Debug, Clone, Default)]
pub struct ConsumerStats {
    /// Number of non-empty batches delivered.
    pub batches_processed: u64,
    /// Total number of entries delivered.
    pub entries_processed: u64,
    /// Last entry id that was delivered.
    pub last_entry_id: Option<EntryId>,
    /// Time when consumption started.
    pub started_at: Option<Instant>,
    /// Total time spent in blocking reads.
    pub read_time: Duration,
    /// Total time spent in handler invocations.
    pub process_time: Duration,
}

impl ConsumerStats {
    /// Get entries delivered per second since the loop started.
    pub fn entries_per_second(&self) -> f64 {
        if let Some(started) = self.started_at {
            let elapsed = started.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                return self.entries_processed as f64 / elapsed;
            }
        }
        0.0
    }

    /// Get the total elapsed time since the loop started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|s| s.elapsed()).unwrap_or_default()
    }
}

// ============================================================================
// Session State
// ============================================================================

/// Connection lifecycle for one consumer session.
///
/// `Closed` is terminal: a consumer instance is not reused after shutdown.
enum Session {
    Unconnected,
    Connected(MultiplexedConnection),
    Closed,
}

impl Session {
    fn is_open(&self) -> bool {
        matches!(self, Session::Connected(_))
    }
}

// ============================================================================
// Stream Consumer
// ============================================================================

/// A consumer-group reader over a single Redis stream.
///
/// Owns exactly one connection, one group membership, and one read loop.
/// Construction performs no I/O; the transport is opened lazily by
/// [`StreamConsumer::ensure_connection`] or the first loop iteration.
pub struct StreamConsumer {
    /// Client holder; allocates the transport lazily.
    connection: RedisConnection,
    /// Explicit session state; read and append require `Connected`.
    session: Session,
    identity: StreamIdentity,
    config: ConsumerConfig,
    mode: RunMode,
    /// Whether the consumer group has been ensured.
    group_ready: bool,
    /// Entry ids from the last delivered batch (for acknowledgment).
    pending_ids: Vec<EntryId>,
    stats: ConsumerStats,
    shutdown_token: CancellationToken,
}

impl StreamConsumer {
    /// Create a new stream consumer.
    ///
    /// Fails only on malformed inputs; no I/O is performed.
    pub fn new(
        mode: RunMode,
        connection: ConnectionConfig,
        identity: StreamIdentity,
    ) -> Result<Self> {
        let connection = RedisConnection::new(&connection)?;
        Ok(Self {
            connection,
            session: Session::Unconnected,
            identity,
            config: ConsumerConfig::default(),
            mode,
            group_ready: false,
            pending_ids: Vec::new(),
            stats: ConsumerStats::default(),
            shutdown_token: CancellationToken::new(),
        })
    }

    /// Set the consumer configuration.
    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    /// The identity this consumer reads under.
    pub fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    /// The configured run mode.
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Get the consumption statistics.
    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    /// A clone of the shutdown token.
    ///
    /// Cancelling it terminates an in-flight [`StreamConsumer::run`] at its
    /// current blocking read, without waiting out the block duration.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// The live connection, opening it first if the session is fresh.
    ///
    /// This is the only way read, group, and append operations obtain a
    /// connection, so none of them can run without a connected session.
    async fn connected(&mut self) -> Result<MultiplexedConnection> {
        match &self.session {
            Session::Connected(conn) => Ok(conn.clone()),
            Session::Closed => Err(Error::ConnectionClosed),
            Session::Unconnected => {
                let conn = self.connection.get_async_connection().await?;
                self.session = Session::Connected(conn.clone());
                debug!(
                    stream = self.identity.stream(),
                    consumer = self.identity.consumer(),
                    "connection established"
                );
                Ok(conn)
            },
        }
    }

    /// Idempotent connect: opens the transport if the session is fresh.
    ///
    /// On failure the session stays unconnected, permitting a retry by
    /// re-invocation. A closed session is terminal and yields
    /// [`Error::ConnectionClosed`].
    pub async fn ensure_connection(&mut self) -> Result<()> {
        self.connected().await.map(|_| ())
    }

    /// Idempotent group creation at the configured start position.
    ///
    /// The `BUSYGROUP` reply (group already exists) is treated as success:
    /// creation races between consumers sharing a group name are expected and
    /// harmless. Any other failure is fatal; the read loop must not start.
    pub async fn ensure_group(&mut self) -> Result<()> {
        if self.group_ready {
            return Ok(());
        }

        let mut conn = self.connected().await?;
        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE")
            .arg(self.identity.stream())
            .arg(self.identity.group())
            .arg(self.config.start_position.as_id());
        if self.config.mkstream {
            cmd.arg("MKSTREAM");
        }

        match cmd.query_async::<()>(&mut conn).await {
            Ok(()) => {
                debug!(
                    stream = self.identity.stream(),
                    group = self.identity.group(),
                    "consumer group created"
                );
            },
            Err(err) if Error::is_busy_group(&err) => {
                info!(
                    group = self.identity.group(),
                    "consumer group already exists"
                );
            },
            Err(err) => {
                return Err(Error::GroupCreation {
                    stream: self.identity.stream().to_string(),
                    group: self.identity.group().to_string(),
                    source: err,
                });
            },
        }

        self.group_ready = true;
        Ok(())
    }

    /// One blocking batched read of entries never delivered to any consumer
    /// in the group. A nil reply after the block duration yields an empty
    /// batch.
    async fn read_batch(&mut self) -> Result<Batch> {
        let mut conn = self.connected().await?;
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(self.identity.group())
            .arg(self.identity.consumer());
        if let Some(count) = self.config.batch_size {
            cmd.arg("COUNT").arg(count);
        }
        cmd.arg("BLOCK")
            .arg(self.config.block.as_millis() as u64)
            .arg("STREAMS")
            .arg(self.identity.stream())
            .arg(">");

        let reply: XReadGroupReply = cmd.query_async(&mut conn).await?;
        Ok(flatten_reply(reply))
    }

    /// Record a delivered batch and invoke the handler, applying the
    /// configured failure policy.
    async fn deliver<H>(&mut self, batch: Batch, handler: &mut H) -> Result<()>
    where
        H: FnMut(Batch) -> HandlerResult,
    {
        self.pending_ids = batch.ids().collect();
        self.stats.batches_processed += 1;
        self.stats.entries_processed += batch.len() as u64;
        self.stats.last_entry_id = batch.last_id();
        debug!(entries = batch.len(), "delivering batch");

        let process_start = Instant::now();
        let outcome = handler(batch);
        self.stats.process_time += process_start.elapsed();

        match outcome {
            Ok(()) => {
                if self.config.auto_ack {
                    self.ack_batch().await?;
                }
                Ok(())
            },
            Err(err) => match self.config.on_handler_error {
                OnHandlerError::Abort => Err(Error::Handler(err)),
                OnHandlerError::Skip => {
                    warn!(error = %err, "handler failed, skipping batch");
                    Ok(())
                },
            },
        }
    }

    /// Run the read loop to completion.
    ///
    /// Connects and ensures the consumer group, then repeats: blocking read,
    /// decode, handler. An idle timeout is normal behavior and continues the
    /// loop; a read error terminates it. In [`RunMode::SinglePass`] exactly
    /// one read attempt executes. On every loop exit the connection is
    /// closed.
    ///
    /// Cancelling the [`StreamConsumer::shutdown_token`] stops the loop at
    /// its current blocking read.
    pub async fn run<H>(&mut self, mut handler: H) -> Result<()>
    where
        H: FnMut(Batch) -> HandlerResult,
    {
        self.ensure_connection().await?;
        self.ensure_group().await?;

        if self.stats.started_at.is_none() {
            self.stats.started_at = Some(Instant::now());
        }

        let shutdown = self.shutdown_token.clone();
        let mut result = Ok(());

        while self.session.is_open() && !shutdown.is_cancelled() {
            debug!(
                stream = self.identity.stream(),
                consumer = self.identity.consumer(),
                "awaiting entries"
            );

            let read_start = Instant::now();
            let read = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("shutdown requested, stopping read loop");
                    break;
                },
                read = self.read_batch() => read,
            };
            self.stats.read_time += read_start.elapsed();

            match read {
                Ok(batch) if !batch.is_empty() => {
                    if let Err(err) = self.deliver(batch, &mut handler).await {
                        result = Err(err);
                        break;
                    }
                },
                Ok(_) => {
                    debug!(
                        stream = self.identity.stream(),
                        "no new entries within block window"
                    );
                },
                Err(err) => {
                    result = Err(err);
                    break;
                },
            }

            if self.mode == RunMode::SinglePass {
                break;
            }
        }

        self.shutdown();
        result
    }

    /// Launch the read loop as a background task.
    ///
    /// Returns once the task has been spawned, not once the loop completes.
    /// Stop it through the returned [`ConsumerHandle`].
    pub fn spawn<H>(mut self, handler: H) -> ConsumerHandle
    where
        H: FnMut(Batch) -> HandlerResult + Send + 'static,
    {
        let shutdown = self.shutdown_token.clone();
        let join = tokio::spawn(async move { self.run(handler).await });
        ConsumerHandle { shutdown, join }
    }

    /// Append one field-mapping as a new entry at the stream's tail.
    ///
    /// The store assigns the entry id, which is returned. No batching, no
    /// retry.
    pub async fn append(&mut self, fields: &[(String, String)]) -> Result<EntryId> {
        let mut conn = self.connected().await?;
        let mut cmd = redis::cmd("XADD");
        cmd.arg(self.identity.stream()).arg("*");
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }

        let id: String =
            cmd.query_async(&mut conn)
                .await
                .map_err(|source| Error::Append {
                    stream: self.identity.stream().to_string(),
                    source,
                })?;
        EntryId::parse(&id).ok_or(Error::MalformedEntryId(id))
    }

    /// Acknowledge the entries from the last delivered batch.
    ///
    /// Returns the number of entries acknowledged.
    pub async fn ack_batch(&mut self) -> Result<usize> {
        if self.pending_ids.is_empty() {
            return Ok(0);
        }
        let acked = self.ack_entries(&self.pending_ids.clone()).await?;
        self.pending_ids.clear();
        Ok(acked)
    }

    /// Acknowledge specific entry ids.
    pub async fn ack_entries(&mut self, ids: &[EntryId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connected().await?;
        let mut cmd = redis::cmd("XACK");
        cmd.arg(self.identity.stream()).arg(self.identity.group());
        for id in ids {
            cmd.arg(id.to_string());
        }

        let acked: usize = cmd.query_async(&mut conn).await?;
        Ok(acked)
    }

    /// Close the connection and mark the session terminal.
    ///
    /// Idempotent: a no-op when already closed. A `Continuous` loop running
    /// in the background is stopped through [`ConsumerHandle::stop`] instead,
    /// which cancels the shutdown token.
    pub fn shutdown(&mut self) {
        if self.session.is_open() {
            debug!(
                consumer = self.identity.consumer(),
                "closing connection"
            );
        }
        self.session = Session::Closed;
    }
}

// ============================================================================
// Consumer Handle
// ============================================================================

/// Handle to a consumer loop launched with [`StreamConsumer::spawn`].
pub struct ConsumerHandle {
    shutdown: CancellationToken,
    join: JoinHandle<Result<()>>,
}

impl ConsumerHandle {
    /// Signal shutdown and wait for the loop to finish.
    ///
    /// The cancellation is observed at the in-flight blocking read, so this
    /// returns well within one block window.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        self.join().await
    }

    /// Wait for the loop to finish without requesting shutdown.
    pub async fn join(self) -> Result<()> {
        match self.join.await {
            Ok(result) => result,
            Err(err) => Err(Error::Runtime(format!("consumer task failed: {}", err))),
        }
    }

    /// A clone of the loop's shutdown token.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether the loop has already terminated.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
