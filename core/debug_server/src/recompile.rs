//! Coalescing of "recompile all functions" requests.
//!
//! Toggling instrumentation requires the engine to recompile every function,
//! which is expensive. Requests only arm a single deferred task; further
//! requests made before it runs are absorbed.

use std::cell::Cell;

/// A pending flag plus a single-slot deferred task.
#[derive(Debug, Default)]
pub struct RecompileCoalescer {
    pending: Cell<bool>,
    passes: Cell<u64>,
}

impl RecompileCoalescer {
    /// Records a request.
    ///
    /// Returns `true` when the caller must schedule the deferred task, i.e.
    /// when no task was armed yet.
    pub fn request(&self) -> bool {
        !self.pending.replace(true)
    }

    /// Whether a task is armed and has not run yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }

    /// Called by the deferred task. Returns `true` if a recompilation pass
    /// should run now.
    pub fn take(&self) -> bool {
        if self.pending.replace(false) {
            self.passes.set(self.passes.get() + 1);
            true
        } else {
            false
        }
    }

    /// Number of recompilation passes that were run.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_coalesce_until_the_task_runs() {
        let coalescer = RecompileCoalescer::default();
        assert!(coalescer.request());
        assert!(!coalescer.request());
        assert!(!coalescer.request());
        assert!(coalescer.is_pending());

        assert!(coalescer.take());
        assert!(!coalescer.take());
        assert_eq!(coalescer.passes(), 1);

        assert!(coalescer.request());
    }
}
