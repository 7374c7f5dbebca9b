use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::foundation::error::{StreamError, StreamResult};
use crate::queue::{PendingTasks, QueuedRequest, RequestQueue};

/// Request queue running fetches on a dedicated rayon pool.
///
/// At most `max_concurrent` fetches run at once. Completions free a slot, which is refilled on
/// the next [`RequestQueue::enqueue`] or [`RequestQueue::pump`] from the orchestration thread.
pub struct PooledRequestQueue {
    pool: rayon::ThreadPool,
    max_concurrent: usize,
    in_flight: Arc<AtomicUsize>,
    pending: RefCell<PendingTasks>,
}

impl PooledRequestQueue {
    pub fn new(max_concurrent: usize, threads: Option<usize>) -> StreamResult<Self> {
        if max_concurrent == 0 {
            return Err(StreamError::validation(
                "request queue max_concurrent must be >= 1",
            ));
        }
        Ok(Self {
            pool: build_thread_pool(threads)?,
            max_concurrent,
            in_flight: Arc::new(AtomicUsize::new(0)),
            pending: RefCell::new(PendingTasks::default()),
        })
    }

    /// Fetches currently running on the pool.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl RequestQueue for PooledRequestQueue {
    fn enqueue(&self, request: QueuedRequest) {
        self.pending.borrow_mut().push(request);
        self.pump();
    }

    fn pump(&self) {
        while self.in_flight() < self.max_concurrent {
            let popped = self.pending.borrow_mut().pop_ready();
            let job = match popped {
                None => break,
                Some(None) => continue,
                Some(Some(job)) => job,
            };
            self.in_flight.fetch_add(1, Ordering::AcqRel);
            let in_flight = Arc::clone(&self.in_flight);
            tracing::trace!(image = %job.id(), "dispatching fetch");
            self.pool.spawn(move || {
                job.run();
                in_flight.fetch_sub(1, Ordering::AcqRel);
            });
        }
    }

    fn next_priority(&self) -> u64 {
        self.pending.borrow_mut().next_priority()
    }

    fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl std::fmt::Debug for PooledRequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledRequestQueue")
            .field("max_concurrent", &self.max_concurrent)
            .field("in_flight", &self.in_flight())
            .field("pending", &self.pending_len())
            .finish()
    }
}

fn build_thread_pool(threads: Option<usize>) -> StreamResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(StreamError::validation(
            "request queue 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("terrastream-fetch-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| StreamError::Other(anyhow::anyhow!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/queue/pooled.rs"]
mod tests;
