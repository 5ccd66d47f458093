//! One pipeline stage: load → fan out → reconcile → write.
//!
//! A `RecordStage` describes what to do with a single record and what to
//! write when that fails. `run_stage` supplies everything else, identically
//! for every stage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tracing::info;

use crate::dataset::{Dataset, Record};
use crate::error::{StageError, TaskFailure};
use crate::pipeline::progress::{CompletionEvent, ProgressObserver};
use crate::pipeline::reconciler::Reconciler;
use crate::pipeline::scheduler::fan_out;

/// A fixed-schema per-record result.
pub trait StageOutput: Send + 'static {
    /// Column names written by this stage, in order.
    const COLUMNS: &'static [&'static str];

    /// One value per entry of `COLUMNS`.
    fn into_row(self) -> Vec<String>;
}

/// Per-record enrichment logic for a stage.
#[async_trait]
pub trait RecordStage: Send + Sync {
    type Output: StageOutput;

    /// Short stage name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Columns the input dataset must have.
    fn required_columns(&self) -> &'static [&'static str];

    /// Produce the result for one record. Suspends only at the external call.
    async fn process(&self, record: &Record) -> Result<Self::Output, TaskFailure>;

    /// Schema-complete substitute for a record whose task failed.
    ///
    /// Must only read from `record` and `failure`.
    fn fallback(&self, record: &Record, failure: &TaskFailure) -> Self::Output;

    /// One-line description of a genuine result for progress output.
    fn describe(&self, _record: &Record, _output: &Self::Output) -> Option<String> {
        None
    }

    /// Terminal step applied after results are written back (e.g. a sort).
    fn finalize(&self, _dataset: &mut Dataset) {}
}

/// Counts reported at the end of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub stage: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub output: Option<PathBuf>,
}

/// Fail fast when a stage's input file is absent.
pub async fn ensure_input(stage: &str, path: &Path) -> Result<(), StageError> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => Ok(()),
        _ => Err(StageError::Precondition {
            stage: stage.to_string(),
            path: path.to_path_buf(),
        }),
    }
}

/// Run one full stage from `input` to `output`.
///
/// Structural problems (missing file, missing column) abort before any task
/// is scheduled. Per-record failures never abort: they become fallback rows.
pub async fn run_stage<S: RecordStage>(
    stage: &S,
    input: &Path,
    output: &Path,
    observer: &dyn ProgressObserver,
) -> Result<StageSummary, StageError> {
    ensure_input(stage.name(), input).await?;
    let mut dataset = Dataset::load(input, stage.required_columns()).await?;

    info!(
        stage = stage.name(),
        input = %input.display(),
        records = dataset.len(),
        "Starting stage"
    );

    let mut summary = enrich_dataset(stage, &mut dataset, observer).await;
    stage.finalize(&mut dataset);
    dataset.save(output).await?;
    summary.output = Some(output.to_path_buf());

    info!(
        stage = %summary.stage,
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        output = %output.display(),
        "Stage complete"
    );
    Ok(summary)
}

/// Fan the stage out over every record and write the reconciled columns
/// back in original row order.
pub async fn enrich_dataset<S: RecordStage>(
    stage: &S,
    dataset: &mut Dataset,
    observer: &dyn ProgressObserver,
) -> StageSummary {
    let total = dataset.len();
    let mut reconciler = Reconciler::new(total);

    {
        let records = dataset.records();
        let by_index: HashMap<usize, &Record> = records.iter().map(|r| (r.index(), r)).collect();
        let mut completions = std::pin::pin!(fan_out(records, |record| stage.process(record)));
        let mut completed = 0;

        while let Some((index, outcome)) = completions.next().await {
            completed += 1;
            let detail = match (&outcome, by_index.get(&index)) {
                (Ok(output), Some(record)) => stage.describe(record, output),
                _ => None,
            };
            let failure = outcome.as_ref().err().map(ToString::to_string);
            observer.on_complete(&CompletionEvent {
                stage: stage.name(),
                index,
                completed,
                total,
                detail: detail.as_deref(),
                failure: failure.as_deref(),
            });
            reconciler.record(index, outcome);
        }
    }

    let batch = reconciler.finish(dataset.records(), |record, failure| {
        stage.fallback(record, failure)
    });
    let rows = batch
        .results
        .into_iter()
        .map(|r| r.value.into_row())
        .collect();
    dataset.set_columns(S::Output::COLUMNS, rows);

    StageSummary {
        stage: stage.name().to_string(),
        total,
        succeeded: batch.succeeded,
        failed: batch.failed,
        output: None,
    }
}
