//! Result sinks.
//!
//! Rules report values outward by calling `Put` on the sink bound under the
//! ruleset's `resultKey` (`.D.result.Put .D.demo.T2`). Two variants exist:
//!
//! - [`CallbackSink`]: invokes a caller-supplied closure synchronously.
//! - [`QueueSink`]: pushes onto an unbounded FIFO channel that a consumer
//!   (typically the queue executor's drain task) reads from.
//!
//! Both honor the previous-result guard: `Put v prev` with a falsy `prev`
//! returns false without forwarding `v`. This is what lets rule authors
//! chain `p1 | p2 | .result.Put .v` with AND semantics.
//!
//! ## Shutdown handshake
//!
//! The queue variant keeps the `Quit` sentinel protocol: [`QueueSink::close`]
//! sends [`QueueItem::Quit`] and then grants consumers a 10 ms grace period
//! to drain before giving up. Consumers stop at the first `Quit` they see.
//! (The original design also multiplexed `empty` sentinels through the
//! channel so producers could always send; an explicit unbounded queue makes
//! that lookahead slot unnecessary: `put` never blocks.)

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::value::Value;

/// One element of the queue sink's channel.
pub enum QueueItem {
    /// A value emitted by a rule.
    Value(Value),
    /// Shutdown sentinel; consumers stop reading when they see it.
    Quit,
}

/// Destination for values emitted by truthy rules.
pub trait ResultSink: Send + Sync {
    /// Forward `val`. A falsy `prev` short-circuits to false without
    /// forwarding; returns true when the value was accepted.
    fn put(&self, val: Value, prev: Option<bool>) -> bool;

    /// The queue variant's receiving end; `None` for synchronous sinks.
    fn receiver(&self) -> Option<Receiver<QueueItem>> {
        None
    }

    /// Initiate shutdown. No-op for synchronous sinks.
    fn close(&self) {}
}

/// Synchronous sink wrapping a callback.
pub struct CallbackSink {
    fn_: Box<dyn Fn(Value) + Send + Sync>,
}

impl CallbackSink {
    pub fn new(fn_: impl Fn(Value) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(CallbackSink { fn_: Box::new(fn_) })
    }
}

impl ResultSink for CallbackSink {
    fn put(&self, val: Value, prev: Option<bool>) -> bool {
        if prev == Some(false) {
            return false;
        }
        (self.fn_)(val);
        true
    }
}

/// Asynchronous sink backed by an unbounded FIFO channel.
///
/// `put` never blocks; relative order of values from a single producer is
/// preserved.
pub struct QueueSink {
    tx: Sender<QueueItem>,
    rx: Receiver<QueueItem>,
}

impl QueueSink {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = unbounded();
        Arc::new(QueueSink { tx, rx })
    }
}

impl ResultSink for QueueSink {
    fn put(&self, val: Value, prev: Option<bool>) -> bool {
        if prev == Some(false) {
            return false;
        }
        // Send can only fail once every receiver is gone; the value is
        // dropped in that case, same as a closed channel.
        let _ = self.tx.send(QueueItem::Value(val));
        true
    }

    fn receiver(&self) -> Option<Receiver<QueueItem>> {
        Some(self.rx.clone())
    }

    fn close(&self) {
        let _ = self.tx.send(QueueItem::Quit);

        // Grace period for consumers to drain the quit sentinel.
        let deadline = Instant::now() + Duration::from_millis(10);
        while !self.rx.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_micros(200));
        }
    }
}
