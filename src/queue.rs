//! Write scheduling state shared between producers and the session tasks.
//!
//! Producers append [`WriteQueueItem`]s to the per-priority write queues;
//! the writer drains the most important non-suppressed class first and
//! records, per wire write, what to do with the reply. The reader walks
//! that record FIFO and fulfils the matching promises.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;

use tokio::sync::oneshot;

use crate::cmd::Query;
use crate::value::Value;

/// Query priorities, most important first.
///
/// The writer always picks the front item of the most important
/// non-suppressed, non-empty class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryPriority {
    /// Liveness pings; must not be blocked.
    Heartbeat,
    /// Bulky config dump.
    Config,
    /// Live state updates.
    State,
    /// Append-only history stream.
    History,
    /// Frequent telemetry.
    CheckResult,
    /// Catch-all and sync barrier work.
    SyncConnection,
}

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// An action spliced into the serialized stream of socket operations.
pub(crate) type SpliceCallback = Box<dyn FnOnce() -> BoxFuture + Send + 'static>;

/// Something to be sent to the server.
pub(crate) enum WriteQueueItem {
    /// A single query; its reply is discarded.
    FireOne(Query),
    /// A batch written contiguously; all replies are discarded.
    FireMany(Vec<Query>),
    /// A single query whose reply completes the promise.
    AwaitOne(Query, oneshot::Sender<Value>),
    /// A batch whose replies are delivered as one ordered vector.
    AwaitMany(Vec<Query>, oneshot::Sender<Vec<Value>>),
    /// An arbitrary action run at its queue position.
    Callback(SpliceCallback),
}

/// What to do with a decoded reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseAction {
    /// Discard.
    Ignore,
    /// Complete the front single-reply promise.
    DeliverOne,
    /// Accumulate; complete the front bulk promise once all have arrived.
    DeliverBulk,
}

/// One descriptor per write, covering `remaining` consecutive replies.
#[derive(Debug)]
pub(crate) struct PendingResponse {
    pub remaining: usize,
    pub action: ResponseAction,
}

/// All queues of one connection. Mutation is serialized behind one lock,
/// never held across a suspension point.
pub(crate) struct Queues {
    /// Items to be sent, per priority.
    writes: BTreeMap<QueryPriority, VecDeque<WriteQueueItem>>,
    /// Requestors, each waiting for a single reply.
    reply_promises: VecDeque<oneshot::Sender<Value>>,
    /// Requestors, each waiting for several replies at once.
    replies_promises: VecDeque<oneshot::Sender<Vec<Value>>>,
    /// Metadata about all of the above, in wire order.
    pending_responses: VecDeque<PendingResponse>,
    /// Kinds of queries not to actually send yet.
    suppressed: HashSet<QueryPriority>,
}

impl Queues {
    pub fn new() -> Self {
        Self {
            writes: BTreeMap::new(),
            reply_promises: VecDeque::new(),
            replies_promises: VecDeque::new(),
            pending_responses: VecDeque::new(),
            suppressed: HashSet::new(),
        }
    }

    pub fn push_write(&mut self, priority: QueryPriority, item: WriteQueueItem) {
        self.writes.entry(priority).or_default().push_back(item);
    }

    /// Pop the front item of the most important non-suppressed, non-empty
    /// class. Suppression defers a whole class; it never reorders within
    /// one.
    pub fn next_write(&mut self) -> Option<WriteQueueItem> {
        for (priority, queue) in self.writes.iter_mut() {
            if self.suppressed.contains(priority) {
                continue;
            }
            if let Some(item) = queue.pop_front() {
                return Some(item);
            }
        }
        None
    }

    pub fn push_reply_promise(&mut self, promise: oneshot::Sender<Value>) {
        self.reply_promises.push_back(promise);
    }

    pub fn push_replies_promise(&mut self, promise: oneshot::Sender<Vec<Value>>) {
        self.replies_promises.push_back(promise);
    }

    pub fn pop_reply_promise(&mut self) -> Option<oneshot::Sender<Value>> {
        self.reply_promises.pop_front()
    }

    pub fn pop_replies_promise(&mut self) -> Option<oneshot::Sender<Vec<Value>>> {
        self.replies_promises.pop_front()
    }

    pub fn push_pending_response(&mut self, amount: usize, action: ResponseAction) {
        self.pending_responses.push_back(PendingResponse {
            remaining: amount,
            action,
        });
    }

    pub fn front_pending_response(&self) -> Option<&PendingResponse> {
        self.pending_responses.front()
    }

    pub fn has_pending_responses(&self) -> bool {
        !self.pending_responses.is_empty()
    }

    /// Count one consumed reply against the front descriptor, popping it
    /// once exhausted.
    pub fn consume_pending_response(&mut self) {
        if let Some(front) = self.pending_responses.front_mut() {
            front.remaining -= 1;
            if front.remaining == 0 {
                self.pending_responses.pop_front();
            }
        }
    }

    pub fn suppress(&mut self, kind: QueryPriority) {
        self.suppressed.insert(kind);
    }

    pub fn unsuppress(&mut self, kind: QueryPriority) -> bool {
        self.suppressed.remove(&kind)
    }

    /// Wipe the pipeline after a connection loss. Dropping the promise
    /// senders fails every outstanding requestor; items still queued for
    /// write are discarded along with their promises. The suppression set
    /// is producer policy and survives.
    ///
    /// Returns how many single and bulk requestors were failed.
    pub fn reset(&mut self) -> (usize, usize) {
        self.writes.clear();
        let singles = self.reply_promises.len();
        let bulks = self.replies_promises.len();
        self.reply_promises.clear();
        self.replies_promises.clear();
        self.pending_responses.clear();
        (singles, bulks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fire(name: &str) -> WriteQueueItem {
        WriteQueueItem::FireOne(Query::cmd(name))
    }

    fn name_of(item: WriteQueueItem) -> Vec<u8> {
        match item {
            WriteQueueItem::FireOne(q) => q.iter().next().unwrap().to_vec(),
            _ => panic!("expected FireOne"),
        }
    }

    #[test]
    fn test_priority_selection_order() {
        let mut queues = Queues::new();
        queues.push_write(QueryPriority::CheckResult, fire("CR"));
        queues.push_write(QueryPriority::Heartbeat, fire("HB"));
        queues.push_write(QueryPriority::State, fire("ST"));

        assert_eq!(name_of(queues.next_write().unwrap()), b"HB");
        assert_eq!(name_of(queues.next_write().unwrap()), b"ST");
        assert_eq!(name_of(queues.next_write().unwrap()), b"CR");
        assert!(queues.next_write().is_none());
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut queues = Queues::new();
        for name in ["A", "B", "C"] {
            queues.push_write(QueryPriority::History, fire(name));
        }

        assert_eq!(name_of(queues.next_write().unwrap()), b"A");
        assert_eq!(name_of(queues.next_write().unwrap()), b"B");
        assert_eq!(name_of(queues.next_write().unwrap()), b"C");
    }

    #[test]
    fn test_suppression_defers_whole_class() {
        let mut queues = Queues::new();
        queues.push_write(QueryPriority::State, fire("S1"));
        queues.push_write(QueryPriority::State, fire("S2"));
        queues.push_write(QueryPriority::CheckResult, fire("CR"));

        queues.suppress(QueryPriority::State);
        assert_eq!(name_of(queues.next_write().unwrap()), b"CR");
        assert!(queues.next_write().is_none());

        queues.unsuppress(QueryPriority::State);
        assert_eq!(name_of(queues.next_write().unwrap()), b"S1");
        assert_eq!(name_of(queues.next_write().unwrap()), b"S2");
    }

    #[test]
    fn test_suppress_is_idempotent() {
        let mut queues = Queues::new();
        queues.suppress(QueryPriority::State);
        queues.suppress(QueryPriority::State);
        assert!(queues.unsuppress(QueryPriority::State));
        assert!(!queues.unsuppress(QueryPriority::State));
    }

    #[test]
    fn test_pending_response_counting() {
        let mut queues = Queues::new();
        queues.push_pending_response(2, ResponseAction::Ignore);
        queues.push_pending_response(1, ResponseAction::DeliverOne);

        assert_eq!(
            queues.front_pending_response().unwrap().action,
            ResponseAction::Ignore
        );
        queues.consume_pending_response();
        assert_eq!(queues.front_pending_response().unwrap().remaining, 1);
        queues.consume_pending_response();

        assert_eq!(
            queues.front_pending_response().unwrap().action,
            ResponseAction::DeliverOne
        );
        queues.consume_pending_response();
        assert!(!queues.has_pending_responses());
    }

    #[test]
    fn test_reset_fails_outstanding_promises() {
        let mut queues = Queues::new();
        let (tx_one, mut rx_one) = oneshot::channel::<Value>();
        let (tx_many, mut rx_many) = oneshot::channel::<Vec<Value>>();
        queues.push_reply_promise(tx_one);
        queues.push_replies_promise(tx_many);
        queues.push_pending_response(1, ResponseAction::DeliverOne);
        queues.push_write(QueryPriority::Config, fire("CFG"));
        queues.suppress(QueryPriority::CheckResult);

        let (singles, bulks) = queues.reset();
        assert_eq!((singles, bulks), (1, 1));

        assert!(rx_one.try_recv().is_err());
        assert!(rx_many.try_recv().is_err());
        assert!(queues.next_write().is_none());
        assert!(!queues.has_pending_responses());
        // Suppression survives a reset.
        assert!(queues.unsuppress(QueryPriority::CheckResult));
    }
}
