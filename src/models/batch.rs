//! Partial-failure results for batch-shaped handlers.

use serde::Serialize;

/// Outcome of processing a batch where each item succeeds or fails on its own.
///
/// Every input ends up in exactly one of the two lists.
#[derive(Serialize, Debug, Clone)]
pub struct BatchOutcome<I, T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<(I, String)>,
}

impl<I, T> Default for BatchOutcome<I, T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<I, T> BatchOutcome<I, T> {
    pub fn push_success(&mut self, item: T) {
        self.succeeded.push(item);
    }

    pub fn push_failure(&mut self, input: I, error: impl ToString) {
        self.failed.push((input, error.to_string()));
    }
}
