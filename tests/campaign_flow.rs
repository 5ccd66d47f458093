//! End-to-end runs of the two-phase campaign against stub collaborators.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use lead_campaign::dataset::{Dataset, Record};
use lead_campaign::error::{LlmError, StageError, TransportError};
use lead_campaign::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use lead_campaign::pipeline::{
    CampaignDeps, CampaignOutcome, CampaignPaths, FixedGate, Sequencer, SilentProgress,
};
use lead_campaign::report::{CampaignMetrics, ReportAuthor};
use lead_campaign::stages::ReplyKind;
use lead_campaign::transport::MailTransport;

/// Answers each stage's prompt with a canned response.
struct ScriptedLlm {
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn reply_for(request: &CompletionRequest) -> String {
        let system = request.system_prompt().unwrap_or_default();
        let user = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if system.contains("B2B sales analyst") {
            let score = if user.contains("Name: Ada") { 91 } else { 42 };
            format!(
                r#"{{"priority_score": {score}, "buyer_persona": "Operations Leader",
                   "filled_industry": "Software", "filled_job_title": "Manager",
                   "filled_company_size": "50-100", "filled_notes": "Wants automation"}}"#
            )
        } else if system.contains("sales communication specialist") {
            r#"```json
{"subject": "Quick idea", "body": "Hello there,\n\nShort pitch.", "tone_used": "direct", "key_personalization": "industry"}
```"#
                .to_string()
        } else if user.starts_with("Write a brief") {
            "Thanks, this sounds interesting. Can we talk next week?".to_string()
        } else if user.contains("classifier for customer email replies") {
            r#"{"class": "interested", "reason": "Asked for a call"}"#.to_string()
        } else {
            "unexpected prompt".to_string()
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResponse {
            content: Self::reply_for(&request),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

/// Records deliveries; refuses one address.
struct RecordingTransport {
    delivered: Mutex<Vec<String>>,
    refuse: &'static str,
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn deliver(
        &self,
        recipient: &str,
        _subject: &str,
        _body: &str,
    ) -> Result<(), TransportError> {
        if recipient == self.refuse {
            return Err(TransportError::Send("mailbox unavailable".to_string()));
        }
        self.delivered.lock().unwrap().push(recipient.to_string());
        Ok(())
    }
}

/// Writes a fixed report and remembers the metrics it saw.
#[derive(Default)]
struct CapturingAuthor {
    seen: Mutex<Option<CampaignMetrics>>,
}

#[async_trait]
impl ReportAuthor for CapturingAuthor {
    async fn author(&self, metrics: &CampaignMetrics) -> Result<String, LlmError> {
        *self.seen.lock().unwrap() = Some(metrics.clone());
        Ok("# Campaign Report\n".to_string())
    }
}

struct Harness {
    _dir: TempDir,
    paths: CampaignPaths,
    llm: Arc<ScriptedLlm>,
    transport: Arc<RecordingTransport>,
    author: Arc<CapturingAuthor>,
    sequencer: Sequencer,
}

fn harness(with_leads: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let paths = CampaignPaths::new(dir.path());
    if with_leads {
        write_leads(&paths.leads);
    }

    let llm = Arc::new(ScriptedLlm {
        calls: AtomicUsize::new(0),
    });
    let transport = Arc::new(RecordingTransport {
        delivered: Mutex::new(Vec::new()),
        refuse: "bounce@example.com",
    });
    let author = Arc::new(CapturingAuthor::default());
    // Bo never replies; everyone else is interested.
    let decider = |record: &Record| {
        if record.value("name") == Some("Bo") {
            ReplyKind::Skip
        } else {
            ReplyKind::Interested
        }
    };

    let sequencer = Sequencer::new(
        paths.clone(),
        CampaignDeps {
            llm: llm.clone(),
            transport: transport.clone(),
            replies: Arc::new(decider),
            author: author.clone(),
            sender: "sales@yourcompany.com".to_string(),
        },
    )
    .with_observer(Arc::new(SilentProgress));

    Harness {
        _dir: dir,
        paths,
        llm,
        transport,
        author,
        sequencer,
    }
}

fn write_leads(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        path,
        "name,email,company,industry,job_title,company_size,location,notes,last_contact\n\
         Bo,,Shop BD,,,,Dhaka,,\n\
         Ada,ada@example.com,Engines Ltd,Manufacturing,CTO,200-500,London,requested demo,2025-01-10\n\
         Cy,bounce@example.com,Bounce Co,Retail,Owner,1-10,Paris,,\n",
    )
    .unwrap();
}

#[tokio::test]
async fn paused_campaign_stops_after_outreach() {
    let h = harness(true);

    let outcome = h.sequencer.run(&FixedGate(false)).await.unwrap();

    assert!(matches!(outcome, CampaignOutcome::Paused));
    assert!(h.paths.sent.exists());
    assert!(!h.paths.replied.exists());
    assert!(!h.paths.report.exists());
    // 3 scores + 3 drafts, nothing from the follow-up phase.
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 6);
    assert_eq!(
        h.transport.delivered.lock().unwrap().as_slice(),
        &["ada@example.com".to_string()]
    );
}

#[tokio::test]
async fn outreach_sorts_by_score_and_records_send_status() {
    let h = harness(true);
    h.sequencer.run_outreach().await.unwrap();

    let sent = Dataset::load(&h.paths.sent, &["send_status"]).await.unwrap();
    // Ada scored highest and moves to the top; Bo and Cy keep their order.
    assert_eq!(sent.column("name").unwrap(), vec!["Ada", "Bo", "Cy"]);
    assert_eq!(sent.column("priority_score").unwrap(), vec!["91", "42", "42"]);
    assert_eq!(sent.column("email_sent").unwrap(), vec!["True", "False", "False"]);
    assert_eq!(
        sent.column("send_status").unwrap(),
        vec![
            "Success",
            "No email address",
            "Error: SMTP send failed: mailbox unavailable"
        ]
    );
    assert_eq!(sent.column("email_subject").unwrap(), vec!["Quick idea"; 3]);
    // Input columns survive untouched.
    assert_eq!(
        sent.column("notes").unwrap(),
        vec!["requested demo", "", ""]
    );
}

#[tokio::test]
async fn completed_campaign_publishes_dataset_and_report() {
    let h = harness(true);

    let outcome = h.sequencer.run(&FixedGate(true)).await.unwrap();

    let CampaignOutcome::Completed { report, metrics } = outcome else {
        panic!("Expected a completed campaign");
    };
    assert_eq!(report, h.paths.report);
    assert_eq!(
        std::fs::read_to_string(&h.paths.report).unwrap(),
        "# Campaign Report\n"
    );
    assert_eq!(
        std::fs::read(&h.paths.classified).unwrap(),
        std::fs::read(&h.paths.published).unwrap()
    );

    let final_data = Dataset::load(&h.paths.published, &["reply_class"])
        .await
        .unwrap();
    assert_eq!(final_data.column("reply").unwrap(), vec!["Yes", "No", "Yes"]);
    assert_eq!(
        final_data.column("reply_class").unwrap(),
        vec!["INTERESTED", "NO_REPLY", "INTERESTED"]
    );

    assert_eq!(metrics.total_contacts, 3);
    assert_eq!(metrics.emails_sent, 1);
    assert_eq!(metrics.emails_successful, 1);
    assert_eq!(metrics.high_priority_leads, 1);
    assert_eq!(h.author.seen.lock().unwrap().as_ref(), Some(&metrics));
    // 3 scores + 3 drafts + 2 replies + 2 classifications.
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn missing_leads_stop_the_chain_before_any_call() {
    let h = harness(false);

    let err = h.sequencer.run(&FixedGate(true)).await.unwrap_err();

    assert!(matches!(err, StageError::Precondition { .. }));
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
    assert!(h.transport.delivered.lock().unwrap().is_empty());
    assert!(!h.paths.analyzed.exists());
}

#[tokio::test]
async fn follow_up_requires_sent_status_file() {
    let h = harness(true);

    let err = h.sequencer.run_follow_up().await.unwrap_err();

    match err {
        StageError::Precondition { path, .. } => assert_eq!(path, h.paths.sent),
        other => panic!("Expected Precondition, got {:?}", other),
    }
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
}
