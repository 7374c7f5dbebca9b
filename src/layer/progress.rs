/// Counts asynchronous operations to expose `loading` and `progress`.
///
/// Totals restart once every tracked operation has finished, so `progress` describes the current
/// burst of work rather than the lifetime of the layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperationCounter {
    pending: usize,
    completed: usize,
    total: usize,
}

impl OperationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, n: usize) {
        self.pending += n;
        self.total += n;
    }

    pub fn finish(&mut self) {
        if self.pending == 0 {
            return;
        }
        self.pending -= 1;
        self.completed += 1;
        if self.pending == 0 {
            self.completed = 0;
            self.total = 0;
        }
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn loading(&self) -> bool {
        self.pending > 0
    }

    /// Fraction of the current burst that finished, `1.0` when idle.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layer/progress.rs"]
mod tests;
