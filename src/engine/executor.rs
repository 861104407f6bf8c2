//! Executors.
//!
//! Two ways to drive a [`Parser`]:
//!
//! - [`SimpleExecutor`]: synchronous fan-out on the caller's thread.
//! - [`QueueExecutor`]: channel-driven relay for streaming workloads.
//!
//! ## Queue executor anatomy
//!
//! ```text
//!  in ──▶ fill thread ──▶ rendezvous channel ──▶ worker pool (N threads)
//!                                                    │ parser.execute
//!                                                    ▼
//!  out ◀── drain thread ◀─────────────── queue result sink (rules Put here)
//! ```
//!
//! The worker pool is bounded (`Options::queue_workers`); when every worker
//! is busy the rendezvous send blocks the fill thread, which in turn stops
//! reading `in`; that is the backpressure contract. When `in` disconnects
//! the fill thread waits for the workers to finish and closes the sink,
//! which makes the drain thread flush remaining values and drop `out`.
//!
//! [`QueueExecutor::close_result`] is the abrupt path: it injects the quit
//! sentinel directly, stopping the drain without waiting for workers.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::warn;

use super::parser::Parser;
use crate::sink::QueueItem;
use crate::value::Value;

/// Synchronous executor; evaluation runs to completion on the caller's
/// thread.
pub struct SimpleExecutor {
    parser: Arc<Parser>,
}

impl SimpleExecutor {
    pub fn new(parser: Arc<Parser>) -> Self {
        SimpleExecutor { parser }
    }

    /// Execute the parser's rulesets against `vals`.
    pub fn execute(&self, vals: &[Value]) {
        self.parser.execute(vals);
    }
}

/// Asynchronous executor: values stream in on a channel, sink emissions
/// stream out on another.
pub struct QueueExecutor {
    parser: Arc<Parser>,
    workers: usize,
}

impl QueueExecutor {
    pub fn new(parser: Arc<Parser>) -> Self {
        let workers = parser.queue_workers().max(1);
        QueueExecutor { parser, workers }
    }

    /// Start the relay: each batch received on `in_rx` is executed by the
    /// worker pool; values the rules `Put` into the queue sink are
    /// forwarded to `out_tx`. `out_tx` is dropped (closing the channel)
    /// once `in_rx` disconnects and all pending work has drained.
    pub fn execute(&self, in_rx: Receiver<Vec<Value>>, out_tx: Sender<Value>) {
        let sink = self.parser.result();
        let Some(sink_rx) = sink.as_ref().and_then(|s| s.receiver()) else {
            warn!("queue executor needs a queue result sink; closing output");
            drop(out_tx);
            return;
        };

        // Drain: sink → out. Stops at the quit sentinel (or when every
        // sink handle is gone), then closes out by dropping it.
        thread::spawn(move || {
            for item in sink_rx.iter() {
                match item {
                    QueueItem::Value(v) => {
                        if out_tx.send(v).is_err() {
                            break;
                        }
                    }
                    QueueItem::Quit => break,
                }
            }
        });

        // Fill: in → bounded worker pool. The rendezvous channel provides
        // backpressure: a send blocks until a worker is free.
        let (task_tx, task_rx) = bounded::<Vec<Value>>(0);
        let mut workers = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let task_rx = task_rx.clone();
            let parser = self.parser.clone();
            workers.push(thread::spawn(move || {
                for batch in task_rx.iter() {
                    parser.execute(&batch);
                }
            }));
        }
        drop(task_rx);

        let sink = sink.clone();
        thread::spawn(move || {
            for batch in in_rx.iter() {
                if task_tx.send(batch).is_err() {
                    break;
                }
            }
            drop(task_tx);
            for worker in workers {
                let _ = worker.join();
            }
            // All producers are done: initiate the shutdown handshake so
            // the drain flushes and closes out.
            if let Some(sink) = sink {
                sink.close();
            }
        });
    }

    /// Terminate the sink immediately, without waiting for in-flight work.
    pub fn close_result(&self) {
        if let Some(sink) = self.parser.result() {
            sink.close();
        }
    }
}
