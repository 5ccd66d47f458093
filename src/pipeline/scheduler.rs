//! Fan-out scheduler: one concurrent task per record, completions in
//! arrival order.
//!
//! All tasks run on the caller's task as a `FuturesUnordered` set, so they
//! share one cooperative scheduler and suspend only at their own external
//! call. Nothing is throttled here.
//!
//! Each task's index is captured *before* its future is created and is
//! carried alongside whatever the future produces, including a panic. The
//! index is never recovered from an error value.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, Stream};
use futures::FutureExt;

use crate::dataset::Record;
use crate::error::TaskFailure;

/// What one task produced, tagged with its record index.
pub type Completion<T> = (usize, Result<T, TaskFailure>);

/// Launch `task` for every record and yield `(index, outcome)` pairs as
/// each one finishes.
///
/// The returned stream yields exactly `records.len()` items; it must be
/// driven to the end to guarantee every task has resolved. A task that
/// panics yields `TaskFailure::Panicked` for its own index and does not
/// affect the others.
pub fn fan_out<'a, T, F, Fut>(
    records: &'a [Record],
    task: F,
) -> impl Stream<Item = Completion<T>> + Send + 'a
where
    T: Send + 'a,
    F: Fn(&'a Record) -> Fut,
    Fut: Future<Output = Result<T, TaskFailure>> + Send + 'a,
{
    records
        .iter()
        .map(|record| {
            let index = record.index();
            let work = task(record);
            guarded(index, work)
        })
        .collect::<FuturesUnordered<_>>()
}

fn guarded<'a, T, Fut>(index: usize, work: Fut) -> BoxFuture<'a, Completion<T>>
where
    T: Send + 'a,
    Fut: Future<Output = Result<T, TaskFailure>> + Send + 'a,
{
    async move {
        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(outcome) => (index, outcome),
            Err(payload) => (index, Err(TaskFailure::Panicked(panic_message(payload.as_ref())))),
        }
    }
    .boxed()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
