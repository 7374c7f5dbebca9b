use std::cell::RefCell;

use crate::queue::{PendingTasks, QueuedRequest, RequestQueue};

/// Queue that only runs work when told to, on the calling thread.
///
/// [`RequestQueue::pump`] is a no-op; call [`ManualQueue::run_next`] or
/// [`ManualQueue::run_pending`]. Deterministic, which makes it the queue of choice for tests and
/// for hosts that drive fetching from their own frame loop.
#[derive(Default)]
pub struct ManualQueue {
    pending: RefCell<PendingTasks>,
}

impl ManualQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch the highest-priority request. Returns `false` when the queue is empty.
    pub fn run_next(&self) -> bool {
        // Guards run while the queue is borrowed; the job runs after the borrow is released so a
        // delivery may enqueue more work.
        let popped = self.pending.borrow_mut().pop_ready();
        match popped {
            None => false,
            Some(None) => true,
            Some(Some(job)) => {
                job.run();
                true
            }
        }
    }

    /// Dispatch everything, including work enqueued while running. Returns the number of
    /// requests dispatched or skipped.
    pub fn run_pending(&self) -> usize {
        let mut n = 0;
        while self.run_next() {
            n += 1;
        }
        n
    }
}

impl RequestQueue for ManualQueue {
    fn enqueue(&self, request: QueuedRequest) {
        self.pending.borrow_mut().push(request);
    }

    fn pump(&self) {}

    fn next_priority(&self) -> u64 {
        self.pending.borrow_mut().next_priority()
    }

    fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl std::fmt::Debug for ManualQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualQueue")
            .field("pending", &self.pending_len())
            .finish()
    }
}
