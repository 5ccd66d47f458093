//! Per-record enrichment pipeline.
//!
//! Every stage runs the same cycle:
//! 1. `Dataset::load()`: read the input file, check required columns
//! 2. `scheduler::fan_out()`: one task per record, all in flight at once
//! 3. `Reconciler::finish()`: every index gets a real or fallback result
//! 4. `Dataset::save()`: write the enriched table in original row order
//!
//! `sequencer` chains the stages into the two-phase campaign.

pub mod progress;
pub mod reconciler;
pub mod scheduler;
pub mod sequencer;
pub mod stage;

pub use progress::{CompletionEvent, LogProgress, ProgressObserver, RecordingProgress, SilentProgress};
pub use reconciler::{Reconciled, ReconciledBatch, Reconciler};
pub use scheduler::{Completion, fan_out};
pub use sequencer::{
    CampaignDeps, CampaignOutcome, CampaignPaths, ContinuationGate, FixedGate, FollowUp, Sequencer,
    StdinGate,
};
pub use stage::{RecordStage, StageOutput, StageSummary, enrich_dataset, ensure_input, run_stage};
