//! Result reconciler: folds out-of-order completions into an index-keyed
//! map and fills every gap with a fallback.
//!
//! The set of expected indices comes from the records, not from the
//! completion stream, so an index that never reports still gets a row.

use std::collections::BTreeMap;

use tracing::warn;

use crate::dataset::Record;
use crate::error::TaskFailure;

/// Final per-index value plus whether it was genuine.
#[derive(Debug)]
pub struct Reconciled<T> {
    pub value: T,
    /// `Some(reason)` when `value` is a fallback.
    pub failure: Option<String>,
}

impl<T> Reconciled<T> {
    pub fn is_fallback(&self) -> bool {
        self.failure.is_some()
    }
}

/// Index-complete output of one stage, in record order.
#[derive(Debug)]
pub struct ReconciledBatch<T> {
    pub results: Vec<Reconciled<T>>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Accumulates `(index, outcome)` pairs for a known set of records.
#[derive(Debug)]
pub struct Reconciler<T> {
    expected: usize,
    outcomes: BTreeMap<usize, Result<T, TaskFailure>>,
}

impl<T> Reconciler<T> {
    /// Expect one outcome for each index in `0..expected`.
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            outcomes: BTreeMap::new(),
        }
    }

    /// Record a completion. Out-of-range and duplicate indices are ignored
    /// (first write wins).
    pub fn record(&mut self, index: usize, outcome: Result<T, TaskFailure>) {
        if index >= self.expected {
            warn!(index, expected = self.expected, "Ignoring completion for unknown index");
            return;
        }
        if self.outcomes.contains_key(&index) {
            warn!(index, "Ignoring duplicate completion");
            return;
        }
        self.outcomes.insert(index, outcome);
    }

    /// Number of indices that have reported so far.
    pub fn reported(&self) -> usize {
        self.outcomes.len()
    }

    /// Close the map: every index in `0..expected` gets either its genuine
    /// result or `fallback(record, failure)`.
    ///
    /// `records` must be the records the stage was launched with, in
    /// original order.
    pub fn finish<F>(mut self, records: &[Record], fallback: F) -> ReconciledBatch<T>
    where
        F: Fn(&Record, &TaskFailure) -> T,
    {
        debug_assert_eq!(records.len(), self.expected);

        let mut results = Vec::with_capacity(self.expected);
        let mut succeeded = 0;
        let mut failed = 0;

        for record in records {
            let outcome = self
                .outcomes
                .remove(&record.index())
                .unwrap_or(Err(TaskFailure::NotCompleted));
            match outcome {
                Ok(value) => {
                    succeeded += 1;
                    results.push(Reconciled {
                        value,
                        failure: None,
                    });
                }
                Err(failure) => {
                    failed += 1;
                    results.push(Reconciled {
                        value: fallback(record, &failure),
                        failure: Some(failure.to_string()),
                    });
                }
            }
        }

        ReconciledBatch {
            results,
            succeeded,
            failed,
        }
    }
}
