use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::foundation::error::FetchError;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Cancellation token shared between an owner and the work it dispatched.
///
/// Cloning shares the flag. Owners never reset a token: they [`abort`](Self::abort) it and swap in
/// a [`fresh`](Self::fresh) one, so work that captured the old token keeps observing the abort.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    generation: u64,
    aborted: Arc<AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::fresh()
    }
}

impl CancellationToken {
    pub fn fresh() -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Process-unique generation, used to recognise results that belong to a replaced token.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Idempotent.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// `Err(FetchError::Cancelled)` once aborted; convenient inside fetch closures.
    pub fn check(&self) -> Result<(), FetchError> {
        if self.is_aborted() {
            Err(FetchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/cancel.rs"]
mod tests;
