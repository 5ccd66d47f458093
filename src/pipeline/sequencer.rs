//! Stage sequencer: the fixed two-phase campaign chain.
//!
//! Phase one (outreach): score → draft → preview → send.
//! Phase two (follow-up): simulate replies → classify → publish final
//! dataset → report.
//!
//! A `ContinuationGate` sits between the phases. Every stage reads the file
//! the previous one wrote, and a missing input stops the chain before that
//! stage schedules any work.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::dataset::{Dataset, write_atomic};
use crate::error::StageError;
use crate::llm::LlmProvider;
use crate::pipeline::progress::{LogProgress, ProgressObserver};
use crate::pipeline::stage::{RecordStage, StageSummary, ensure_input, run_stage};
use crate::report::{CampaignMetrics, ReportAuthor, generate_report};
use crate::stages::{
    EmailDrafter, LeadScorer, OutreachDispatcher, ReplyClassifier, ReplyDecider, ReplySimulator,
};
use crate::transport::MailTransport;

/// Conventional file locations of one campaign, relative to a base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignPaths {
    pub leads: PathBuf,
    pub analyzed: PathBuf,
    pub drafted: PathBuf,
    pub sent: PathBuf,
    pub replied: PathBuf,
    pub classified: PathBuf,
    pub published: PathBuf,
    pub report: PathBuf,
}

impl CampaignPaths {
    pub fn new(base: &Path) -> Self {
        let output = base.join("output");
        let report = base.join("report");
        Self {
            leads: base.join("dataset").join("leads.csv"),
            analyzed: output.join("analyzed_leads.csv"),
            drafted: output.join("emails_generated.csv"),
            sent: output.join("emails_sent_status.csv"),
            replied: output.join("emails_with_replies.csv"),
            classified: output.join("final.csv"),
            published: report.join("final.csv"),
            report: report.join("campaign_report.md"),
        }
    }
}

/// Decides whether the follow-up phase runs after outreach.
#[async_trait]
pub trait ContinuationGate: Send + Sync {
    async fn proceed(&self) -> bool;
}

/// Always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedGate(pub bool);

#[async_trait]
impl ContinuationGate for FixedGate {
    async fn proceed(&self) -> bool {
        self.0
    }
}

/// Asks on the terminal. Anything other than `yes`/`y` pauses.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinGate;

#[async_trait]
impl ContinuationGate for StdinGate {
    async fn proceed(&self) -> bool {
        eprintln!("\nOutreach complete. The follow-up phase simulates replies, classifies them and writes the report.");
        eprintln!("  Yes - continue now");
        eprintln!("  No  - pause until replies arrive");
        eprint!("Continue? (Yes/No): ");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        match lines.next_line().await {
            Ok(Some(line)) => is_affirmative(&line),
            Ok(None) => false,
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                false
            }
        }
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "yes" | "y")
}

/// Collaborators the campaign is built from.
pub struct CampaignDeps {
    pub llm: Arc<dyn LlmProvider>,
    pub transport: Arc<dyn MailTransport>,
    pub replies: Arc<dyn ReplyDecider>,
    pub author: Arc<dyn ReportAuthor>,
    /// From-address shown in the outreach preview.
    pub sender: String,
}

/// How a full run ended.
#[derive(Debug)]
pub enum CampaignOutcome {
    /// Both phases ran; the report is at `report`.
    Completed {
        report: PathBuf,
        metrics: CampaignMetrics,
    },
    /// Outreach ran and the gate declined the follow-up phase.
    Paused,
}

/// Result of the follow-up phase.
#[derive(Debug)]
pub struct FollowUp {
    pub stages: Vec<StageSummary>,
    pub metrics: CampaignMetrics,
}

/// Runs the campaign stages in their fixed order.
pub struct Sequencer {
    paths: CampaignPaths,
    scorer: LeadScorer,
    drafter: EmailDrafter,
    dispatcher: OutreachDispatcher,
    simulator: ReplySimulator,
    classifier: ReplyClassifier,
    author: Arc<dyn ReportAuthor>,
    sender: String,
    observer: Arc<dyn ProgressObserver>,
}

impl Sequencer {
    pub fn new(paths: CampaignPaths, deps: CampaignDeps) -> Self {
        Self {
            paths,
            scorer: LeadScorer::new(Arc::clone(&deps.llm)),
            drafter: EmailDrafter::new(Arc::clone(&deps.llm)),
            dispatcher: OutreachDispatcher::new(deps.transport),
            simulator: ReplySimulator::new(Arc::clone(&deps.llm), deps.replies),
            classifier: ReplyClassifier::new(deps.llm),
            author: deps.author,
            sender: deps.sender,
            observer: Arc::new(LogProgress),
        }
    }

    /// Replace the default logging observer.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn paths(&self) -> &CampaignPaths {
        &self.paths
    }

    /// Phase one: score, draft, preview and send.
    pub async fn run_outreach(&self) -> Result<Vec<StageSummary>, StageError> {
        let p = &self.paths;
        ensure_input(self.scorer.name(), &p.leads).await?;
        info!("Starting outreach phase");

        let observer = self.observer.as_ref();
        let scored = run_stage(&self.scorer, &p.leads, &p.analyzed, observer).await?;
        let drafted = run_stage(&self.drafter, &p.analyzed, &p.drafted, observer).await?;
        preview_outreach(&p.drafted, &self.sender).await?;
        let sent = run_stage(&self.dispatcher, &p.drafted, &p.sent, observer).await?;

        info!(output = %p.sent.display(), "Outreach phase complete");
        Ok(vec![scored, drafted, sent])
    }

    /// Phase two: simulate replies, classify, publish the final dataset and
    /// write the report.
    pub async fn run_follow_up(&self) -> Result<FollowUp, StageError> {
        let p = &self.paths;
        ensure_input("simulate-replies", &p.sent).await?;
        info!("Starting follow-up phase");

        let observer = self.observer.as_ref();
        let replied = run_stage(&self.simulator, &p.sent, &p.replied, observer).await?;
        let classified = run_stage(&self.classifier, &p.replied, &p.classified, observer).await?;

        let bytes = tokio::fs::read(&p.classified).await?;
        write_atomic(&p.published, &bytes).await?;
        info!(path = %p.published.display(), "Final dataset published");

        let metrics = generate_report(&p.published, &p.report, self.author.as_ref()).await?;

        info!(report = %p.report.display(), "Follow-up phase complete");
        Ok(FollowUp {
            stages: vec![replied, classified],
            metrics,
        })
    }

    /// Run outreach, ask the gate, then run the follow-up if allowed.
    pub async fn run(&self, gate: &dyn ContinuationGate) -> Result<CampaignOutcome, StageError> {
        let span = info_span!("campaign", run_id = %Uuid::new_v4());
        self.run_phases(gate).instrument(span).await
    }

    async fn run_phases(
        &self,
        gate: &dyn ContinuationGate,
    ) -> Result<CampaignOutcome, StageError> {
        self.run_outreach().await?;

        if !gate.proceed().await {
            info!("Campaign paused after outreach; follow-up runs once replies arrive");
            return Ok(CampaignOutcome::Paused);
        }

        let follow_up = self.run_follow_up().await?;
        info!("Campaign completed");
        Ok(CampaignOutcome::Completed {
            report: self.paths.report.clone(),
            metrics: follow_up.metrics,
        })
    }
}

/// Log every drafted outreach before anything is sent. Returns how many
/// were shown.
pub async fn preview_outreach(drafted: &Path, sender: &str) -> Result<usize, StageError> {
    let dataset = Dataset::load(drafted, &[]).await?;
    for record in dataset.records() {
        info!(
            "\nMail To: {}\nMail From: {}\nSubject: {}\nEmail Body:\n{}",
            record.value_or("email", "N/A"),
            record.value_or("email_sender", sender),
            record.value_or("email_subject", "N/A"),
            record.get("email_body").unwrap_or("N/A"),
        );
    }
    Ok(dataset.len())
}
