//! The connection actor: one long-lived session shared by many producers.
//!
//! Three cooperating tasks own the socket. The *connector* opens it,
//! performs the AUTH/SELECT handshake and supervises the session; the
//! *writer* drains the priority queues onto the wire; the *reader*
//! decodes pipelined replies and fulfils the matching promises in wire
//! order. When either task fails, the connector wipes the pipeline
//! (failing every outstanding requestor with
//! [`RedisError::Disconnected`]) and reconnects with back-off. Nothing is
//! replayed across a reconnect; idempotency is query-dependent, so retry
//! is a caller concern.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinError;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::cmd::Query;
use crate::error::{RedisError, RedisResult};
use crate::queue::{
    BoxFuture, Queues, QueryPriority, ResponseAction, SpliceCallback, WriteQueueItem,
};
use crate::transport::{self, RedisReader, RedisWriter};
use crate::value::Value;

/// Base delay between failed connect attempts.
const RECONNECT_BASE: Duration = Duration::from_millis(250);
/// Upper bound on the reconnect delay, jitter included.
const RECONNECT_CAP: Duration = Duration::from_secs(5);

type ConnectedCallback = Arc<dyn Fn() -> BoxFuture + Send + Sync>;

/// Where and how to reach the server.
///
/// A non-empty `path` selects a Unix-domain socket over TCP; an empty
/// `password` skips AUTH; a zero `db_index` skips SELECT.
#[derive(Clone)]
pub struct ConnectInfo {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub password: String,
    pub db_index: u32,
}

impl Default for ConnectInfo {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            path: String::new(),
            password: String::new(),
            db_index: 0,
        }
    }
}

impl ConnectInfo {
    /// Connect over TCP.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Connect over a Unix-domain socket.
    pub fn unix(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Authenticate with AUTH after connecting.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// SELECT this database after connecting.
    pub fn db_index(mut self, db_index: u32) -> Self {
        self.db_index = db_index;
        self
    }
}

impl fmt::Debug for ConnectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field(
                "password",
                if self.password.is_empty() { &"" } else { &"<redacted>" },
            )
            .field("db_index", &self.db_index)
            .finish()
    }
}

struct Shared {
    info: ConnectInfo,
    queues: Mutex<Queues>,
    /// Signalled when a write item is enqueued or a class is unsuppressed.
    queued_writes: Notify,
    /// Signalled when the writer records replies to expect.
    queued_reads: Notify,
    connected: AtomicBool,
    started: AtomicBool,
    connected_callback: Mutex<Option<ConnectedCallback>>,
}

/// Handle to one connection. Cheap to clone; all clones share the same
/// session and queues.
#[derive(Clone)]
pub struct RedisConnection {
    shared: Arc<Shared>,
}

impl RedisConnection {
    /// Create an inert connection. No socket is opened until [`start`].
    ///
    /// [`start`]: RedisConnection::start
    pub fn new(info: ConnectInfo) -> Self {
        Self {
            shared: Arc::new(Shared {
                info,
                queues: Mutex::new(Queues::new()),
                queued_writes: Notify::new(),
                queued_reads: Notify::new(),
                connected: AtomicBool::new(false),
                started: AtomicBool::new(false),
                connected_callback: Mutex::new(None),
            }),
        }
    }

    /// Spawn the connector. Idempotent; only the first call has an
    /// effect. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(connect_loop(self.shared.clone()));
    }

    /// Whether a session is currently established. Lock-free; safe to
    /// call from anywhere.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Enqueue a query and discard its reply. Returns immediately.
    ///
    /// A fire-and-forget query already written when the connection is
    /// lost is simply gone; it is never replayed.
    pub fn fire_and_forget(&self, query: Query, priority: QueryPriority) {
        self.enqueue(priority, WriteQueueItem::FireOne(query));
    }

    /// Enqueue a batch written contiguously, all replies discarded.
    pub fn fire_and_forget_many(&self, queries: Vec<Query>, priority: QueryPriority) {
        self.enqueue(priority, WriteQueueItem::FireMany(queries));
    }

    /// Enqueue a query and await its reply.
    ///
    /// The query is enqueued before this returns; the returned future
    /// resolves when the reply arrives. An error reply from the server is
    /// a *successful* result carrying [`Value::Error`]; the future fails
    /// only with [`RedisError::Disconnected`] when the session resets
    /// before the reply.
    pub fn get_result(
        &self,
        query: Query,
        priority: QueryPriority,
    ) -> impl Future<Output = RedisResult<Value>> {
        let (promise, reply) = oneshot::channel();
        self.enqueue(priority, WriteQueueItem::AwaitOne(query, promise));
        async move { reply.await.map_err(|_| RedisError::Disconnected) }
    }

    /// Enqueue a batch written contiguously and await all replies as one
    /// ordered vector. Same failure semantics as [`get_result`].
    ///
    /// [`get_result`]: RedisConnection::get_result
    pub fn get_results(
        &self,
        queries: Vec<Query>,
        priority: QueryPriority,
    ) -> impl Future<Output = RedisResult<Vec<Value>>> {
        let (promise, replies) = oneshot::channel();
        self.enqueue(priority, WriteQueueItem::AwaitMany(queries, promise));
        async move { replies.await.map_err(|_| RedisError::Disconnected) }
    }

    /// Splice an arbitrary action into the serialized stream of socket
    /// operations; it runs when its queue position is reached.
    ///
    /// The callback must not await replies of work queued on this same
    /// connection: the writer is blocked while it runs, so that would
    /// deadlock.
    pub fn enqueue_callback<F, Fut>(&self, callback: F, priority: QueryPriority)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let splice: SpliceCallback = Box::new(move || Box::pin(callback()));
        self.enqueue(priority, WriteQueueItem::Callback(splice));
    }

    /// Barrier: resolves once everything enqueued before it at any
    /// priority has been written and acknowledged.
    pub async fn sync(&self) -> RedisResult<()> {
        self.get_result(Query::cmd("PING"), QueryPriority::SyncConnection)
            .await?;
        Ok(())
    }

    /// Stop sending queries of this kind until unsuppressed. Queued items
    /// are deferred, never dropped or reordered within their class.
    pub fn suppress_query_kind(&self, kind: QueryPriority) {
        self.shared.queues.lock().suppress(kind);
    }

    /// Resume sending queries of this kind.
    pub fn unsuppress_query_kind(&self, kind: QueryPriority) {
        let removed = self.shared.queues.lock().unsuppress(kind);
        if removed {
            // Wake the writer even though nothing new was enqueued.
            self.shared.queued_writes.notify_one();
        }
    }

    /// Register a callback run inline after every successful connect,
    /// before any queued item of the new session is written.
    pub fn set_connected_callback<F, Fut>(&self, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: ConnectedCallback = Arc::new(move || Box::pin(callback()));
        *self.shared.connected_callback.lock() = Some(callback);
    }

    fn enqueue(&self, priority: QueryPriority, item: WriteQueueItem) {
        self.shared.queues.lock().push_write(priority, item);
        self.shared.queued_writes.notify_one();
    }
}

/// Connector: opens sessions and supervises them for the lifetime of the
/// process.
async fn connect_loop(shared: Arc<Shared>) {
    let mut attempt: u32 = 0;

    loop {
        debug!("connecting to {:?}", shared.info);

        let (reader, writer) = match establish(&shared).await {
            Ok(halves) => halves,
            Err(err) => {
                let delay = reconnect_delay(attempt);
                attempt = attempt.saturating_add(1);
                warn!("connect attempt failed: {} (retrying in {:?})", err, delay);
                sleep(delay).await;
                continue;
            }
        };

        attempt = 0;
        shared.connected.store(true, Ordering::SeqCst);
        info!("connected");

        let callback = shared.connected_callback.lock().clone();
        if let Some(callback) = callback {
            callback().await;
        }

        let mut write_task = tokio::spawn(write_loop(shared.clone(), writer));
        let mut read_task = tokio::spawn(read_loop(shared.clone(), reader));

        let err = tokio::select! {
            res = &mut write_task => {
                read_task.abort();
                task_error(res)
            }
            res = &mut read_task => {
                write_task.abort();
                task_error(res)
            }
        };

        shared.connected.store(false, Ordering::SeqCst);
        let (singles, bulks) = shared.queues.lock().reset();
        warn!(
            "connection lost: {} ({} single and {} bulk requestors failed)",
            err, singles, bulks
        );
    }
}

/// Open the socket and run the handshake. Any failure here counts as a
/// failed attempt; nothing of the pipeline has been touched yet.
async fn establish(shared: &Arc<Shared>) -> RedisResult<(RedisReader, RedisWriter)> {
    let info = &shared.info;
    let (mut reader, mut writer) = transport::connect(info).await?;

    if !info.password.is_empty() {
        let auth = Query::cmd("AUTH").arg(info.password.as_str());
        handshake(&mut reader, &mut writer, auth, "AUTH").await?;
    }

    if info.db_index != 0 {
        let select = Query::cmd("SELECT").arg(info.db_index.to_string());
        handshake(&mut reader, &mut writer, select, "SELECT").await?;
    }

    Ok((reader, writer))
}

async fn handshake(
    reader: &mut RedisReader,
    writer: &mut RedisWriter,
    query: Query,
    what: &str,
) -> RedisResult<()> {
    writer.write_query(&query).await?;
    writer.flush().await?;

    match reader.read_reply().await? {
        Value::String(status) if status == "OK" => Ok(()),
        Value::Error(message) => Err(RedisError::Connection(format!("{} failed: {}", what, message))),
        other => Err(RedisError::Connection(format!(
            "unexpected {} reply: {:?}",
            what, other
        ))),
    }
}

/// Writer: drains the priority queues onto the wire.
async fn write_loop(shared: Arc<Shared>, mut writer: RedisWriter) -> RedisResult<()> {
    loop {
        let next = shared.queues.lock().next_write();
        let Some(item) = next else {
            shared.queued_writes.notified().await;
            continue;
        };

        write_item(&shared, &mut writer, item).await?;
    }
}

/// Write one queue item. Once an item begins writing it completes before
/// any other is chosen, so batches are contiguous at the byte level.
async fn write_item(
    shared: &Shared,
    writer: &mut RedisWriter,
    item: WriteQueueItem,
) -> RedisResult<()> {
    match item {
        WriteQueueItem::FireOne(query) => {
            writer.write_query(&query).await?;
            expect_replies(shared, 1, ResponseAction::Ignore);
        }
        WriteQueueItem::FireMany(queries) => {
            for query in &queries {
                writer.write_query(query).await?;
            }
            if !queries.is_empty() {
                expect_replies(shared, queries.len(), ResponseAction::Ignore);
            }
        }
        WriteQueueItem::AwaitOne(query, promise) => {
            // Promise first: if the write fails mid-item, the reset still
            // finds and fails it.
            shared.queues.lock().push_reply_promise(promise);
            writer.write_query(&query).await?;
            expect_replies(shared, 1, ResponseAction::DeliverOne);
        }
        WriteQueueItem::AwaitMany(queries, promise) => {
            if queries.is_empty() {
                let _ = promise.send(Vec::new());
                return Ok(());
            }
            shared.queues.lock().push_replies_promise(promise);
            for query in &queries {
                writer.write_query(query).await?;
            }
            expect_replies(shared, queries.len(), ResponseAction::DeliverBulk);
        }
        WriteQueueItem::Callback(callback) => {
            callback().await;
            return Ok(());
        }
    }

    writer.flush().await?;
    Ok(())
}

fn expect_replies(shared: &Shared, amount: usize, action: ResponseAction) {
    shared.queues.lock().push_pending_response(amount, action);
    shared.queued_reads.notify_one();
}

/// Reader: decodes replies in wire order and disposes of each per the
/// front pending-response descriptor.
async fn read_loop(shared: Arc<Shared>, mut reader: RedisReader) -> RedisResult<()> {
    let mut bulk: Vec<Value> = Vec::new();

    loop {
        let pending = shared.queues.lock().has_pending_responses();
        if !pending {
            shared.queued_reads.notified().await;
            continue;
        }

        let value = reader.read_reply().await?;

        let mut queues = shared.queues.lock();
        let (action, remaining) = match queues.front_pending_response() {
            Some(pending) => (pending.action, pending.remaining),
            None => {
                return Err(RedisError::Protocol(
                    "reply without a pending response".into(),
                ))
            }
        };

        match action {
            ResponseAction::Ignore => {}
            ResponseAction::DeliverOne => {
                let Some(promise) = queues.pop_reply_promise() else {
                    return Err(RedisError::Protocol(
                        "single-reply requestor missing".into(),
                    ));
                };
                let _ = promise.send(value);
            }
            ResponseAction::DeliverBulk => {
                bulk.push(value);
                if remaining == 1 {
                    let Some(promise) = queues.pop_replies_promise() else {
                        return Err(RedisError::Protocol(
                            "bulk-reply requestor missing".into(),
                        ));
                    };
                    let _ = promise.send(std::mem::take(&mut bulk));
                }
            }
        }

        queues.consume_pending_response();
    }
}

fn task_error(res: Result<RedisResult<()>, JoinError>) -> RedisError {
    match res {
        Ok(Err(err)) => err,
        Ok(Ok(())) | Err(_) => RedisError::Disconnected,
    }
}

/// Exponential back-off with bounded jitter, capped.
fn reconnect_delay(attempt: u32) -> Duration {
    let base = RECONNECT_BASE * (1u32 << attempt.min(4));
    let jitter = rand::rng().random_range(0..=base.as_millis() as u64 / 2);
    (base + Duration::from_millis(jitter)).min(RECONNECT_CAP)
}
