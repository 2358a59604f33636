//! Executor boundary and the reference event pump.
//!
//! The event model needs exactly one primitive from its host: `post(task)`,
//! enqueueing a unit of work for sequential, FIFO, single-threaded
//! execution. Components hold an [`ExecutorHandle`] and are not permitted to
//! invoke a stored callback except by posting it.
//!
//! [`EventPump`] is the reference implementation: one worker thread draining
//! a FIFO task queue. Hosts with their own dispatch loop implement
//! [`Executor`] instead.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A unit of work for the dispatch thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Task-submission boundary of the event model.
pub trait Executor: Send + Sync + 'static {
    /// Enqueues `task` for sequential execution, in submission order.
    fn post(&self, task: Task);
}

/// Shared handle to an executor.
pub type ExecutorHandle = Arc<dyn Executor>;

enum PumpMsg {
    Run(Task),
    Stop,
}

/// Single-threaded FIFO task pump.
///
/// Tasks posted before `stop` run to completion; tasks posted after are
/// silently dropped.
pub struct EventPump {
    tx: flume::Sender<PumpMsg>,
    worker: Option<JoinHandle<()>>,
}

impl EventPump {
    /// Spawns the dispatch thread.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded::<PumpMsg>();
        let worker = thread::Builder::new()
            .name("crosslink-pump".into())
            .spawn(move || {
                for msg in rx.iter() {
                    match msg {
                        PumpMsg::Run(task) => task(),
                        PumpMsg::Stop => break,
                    }
                }
            })
            .expect("failed to spawn event pump thread");
        Self {
            tx,
            worker: Some(worker),
        }
    }

    /// Returns a handle components can post through.
    #[must_use]
    pub fn handle(&self) -> ExecutorHandle {
        Arc::new(PumpHandle {
            tx: self.tx.clone(),
        })
    }

    /// Drains previously-posted tasks, then joins the dispatch thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.tx.send(PumpMsg::Stop);
            let _ = worker.join();
        }
    }
}

impl Default for EventPump {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct PumpHandle {
    tx: flume::Sender<PumpMsg>,
}

impl Executor for PumpHandle {
    fn post(&self, task: Task) {
        // Posting after shutdown is a silent no-op.
        let _ = self.tx.send(PumpMsg::Run(task));
    }
}
