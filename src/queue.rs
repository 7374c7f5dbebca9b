use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use smallvec::{SmallVec, smallvec};

use crate::foundation::error::FetchError;
use crate::foundation::ids::ImageId;
use crate::source::{FetchFn, FetchResult};

pub(crate) mod manual;
pub(crate) mod pooled;

/// Guard evaluated on the orchestration thread right before a request is dispatched.
pub type ShouldExecute = Box<dyn Fn() -> bool>;

/// Receives the outcome of a request, possibly on a worker thread.
pub type Deliver = Box<dyn FnOnce(FetchResult) + Send>;

/// A fetch submitted to a [`RequestQueue`].
pub struct QueuedRequest {
    /// Requests sharing an id are fetched once and the result is delivered to each of them.
    pub id: ImageId,
    /// Higher runs first. Take it from [`RequestQueue::next_priority`] so the most recent
    /// request wins across every layer sharing the queue.
    pub priority: u64,
    /// When `false` at dispatch time the request is skipped and delivered
    /// [`FetchError::Cancelled`].
    pub should_execute: ShouldExecute,
    pub request: FetchFn,
    pub deliver: Deliver,
}

impl std::fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Priority queue executing fetches with bounded concurrency.
///
/// Shared by every layer of a scene. All methods are called from the orchestration thread.
pub trait RequestQueue {
    fn enqueue(&self, request: QueuedRequest);

    /// Next value of the queue-wide recency sequence.
    fn next_priority(&self) -> u64;

    /// Dispatch queued requests as far as the implementation's concurrency budget allows.
    fn pump(&self);

    /// Requests waiting for dispatch (de-duplicated).
    fn pending_len(&self) -> usize;
}

struct Subscriber {
    should_execute: ShouldExecute,
    deliver: Deliver,
}

struct PendingTask {
    priority: u64,
    request: FetchFn,
    // Almost always a single subscriber.
    subscribers: SmallVec<[Subscriber; 1]>,
}

/// Work ready to run on any thread: one fetch, fanned out to its subscribers.
pub(crate) struct ReadyJob {
    id: ImageId,
    request: FetchFn,
    delivers: Vec<Deliver>,
}

impl ReadyJob {
    pub(crate) fn id(&self) -> ImageId {
        self.id
    }

    pub(crate) fn run(self) {
        let result = (self.request)();
        if let Err(err) = &result
            && !err.is_cancellation()
        {
            tracing::debug!(image = %self.id, error = %err, "fetch failed");
        }
        let mut delivers = self.delivers;
        let last = delivers.pop();
        for d in delivers {
            d(result.clone());
        }
        if let Some(d) = last {
            d(result);
        }
    }
}

/// De-duplicating priority storage shared by the queue implementations.
#[derive(Default)]
pub(crate) struct PendingTasks {
    // (priority, insertion sequence) -> newest wins ties.
    heap: BinaryHeap<(u64, u64, Reverse<ImageId>)>,
    tasks: HashMap<ImageId, PendingTask>,
    seq: u64,
    recency: u64,
}

impl PendingTasks {
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn next_priority(&mut self) -> u64 {
        self.recency += 1;
        self.recency
    }

    pub(crate) fn push(&mut self, req: QueuedRequest) {
        let QueuedRequest {
            id,
            priority,
            should_execute,
            request,
            deliver,
        } = req;
        let subscriber = Subscriber {
            should_execute,
            deliver,
        };
        self.seq += 1;
        match self.tasks.get_mut(&id) {
            Some(task) => {
                task.subscribers.push(subscriber);
                if priority > task.priority {
                    task.priority = priority;
                    self.heap.push((priority, self.seq, Reverse(id)));
                }
                tracing::trace!(image = %id, "request de-duplicated");
            }
            None => {
                self.tasks.insert(
                    id,
                    PendingTask {
                        priority,
                        request,
                        subscribers: smallvec![subscriber],
                    },
                );
                self.heap.push((priority, self.seq, Reverse(id)));
            }
        }
    }

    /// Pop the highest-priority task and run its guards.
    ///
    /// Subscribers whose guard fails are delivered [`FetchError::Cancelled`] immediately. Returns
    /// `Some(None)` when every subscriber was skipped, `None` when nothing is queued.
    pub(crate) fn pop_ready(&mut self) -> Option<Option<ReadyJob>> {
        loop {
            let (priority, _, Reverse(id)) = self.heap.pop()?;
            let Some(task) = self.tasks.get(&id) else {
                continue;
            };
            if task.priority != priority {
                continue;
            }
            let task = self.tasks.remove(&id)?;
            let mut delivers = Vec::with_capacity(task.subscribers.len());
            for sub in task.subscribers {
                if (sub.should_execute)() {
                    delivers.push(sub.deliver);
                } else {
                    (sub.deliver)(Err(FetchError::Cancelled));
                }
            }
            if delivers.is_empty() {
                tracing::trace!(image = %id, "request skipped by guard");
                return Some(None);
            }
            return Some(Some(ReadyJob {
                id,
                request: task.request,
                delivers,
            }));
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/queue/pending.rs"]
mod tests;
