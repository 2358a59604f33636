//! Deterministic executor for unit tests: tasks queue up and run on the
//! test thread when asked, in FIFO order, exactly like the reference pump
//! would run them.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crosslink_core::executor::{Executor, ExecutorHandle, Task};

pub(crate) struct ManualExecutor {
    tasks: Mutex<VecDeque<Task>>,
}

impl ManualExecutor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(VecDeque::new()),
        })
    }

    pub(crate) fn as_handle(self: &Arc<Self>) -> ExecutorHandle {
        Arc::clone(self) as ExecutorHandle
    }

    /// Runs queued tasks (and whatever they post) until none are left.
    pub(crate) fn run_until_idle(&self) {
        loop {
            let task = self.tasks.lock().pop_front();
            match task {
                Some(task) => task(),
                None => break,
            }
        }
    }
}

impl Executor for ManualExecutor {
    fn post(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }
}
