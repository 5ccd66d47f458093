//! Reply simulation: stand-in for real inbound replies during a dry run.
//!
//! Which kind of reply a lead "sends" is chosen by an injectable
//! `ReplyDecider`, so tests can force outcomes instead of relying on
//! randomness.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::dataset::Record;
use crate::error::{LlmError, TaskFailure};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::stage::{RecordStage, StageOutput};

const REPLY_TEMPERATURE: f32 = 0.9;
const REPLY_MAX_TOKENS: u32 = 256;

/// Kind of reply a lead sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplyKind {
    Skip,
    Interested,
    NotInterested,
    NeedsFollowUp,
    Unclear,
}

impl ReplyKind {
    pub const ALL: [ReplyKind; 5] = [
        Self::Skip,
        Self::Interested,
        Self::NotInterested,
        Self::NeedsFollowUp,
        Self::Unclear,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Skip => "SKIP",
            Self::Interested => "INTERESTED",
            Self::NotInterested => "NOT_INTERESTED",
            Self::NeedsFollowUp => "NEEDS_FOLLOW_UP",
            Self::Unclear => "UNCLEAR",
        }
    }

    /// Instruction for writing this kind of reply, `None` for `Skip`.
    fn instruction(self) -> Option<&'static str> {
        match self {
            Self::Skip => None,
            Self::Interested => Some("Write a brief (2-3 sentences) INTERESTED and enthusiastic reply to:"),
            Self::NotInterested => Some("Write a brief (2-3 sentences) polite NOT INTERESTED response to:"),
            Self::NeedsFollowUp => Some(
                "Write a brief (2-3 sentences) reply requesting follow-up or more information about:",
            ),
            Self::Unclear => Some("Write a brief (2-3 sentences) reply asking for clarification about:"),
        }
    }
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Chooses which kind of reply a record receives.
pub trait ReplyDecider: Send + Sync {
    fn decide(&self, record: &Record) -> ReplyKind;
}

impl<F> ReplyDecider for F
where
    F: Fn(&Record) -> ReplyKind + Send + Sync,
{
    fn decide(&self, record: &Record) -> ReplyKind {
        self(record)
    }
}

/// Uniformly random choice among all reply kinds.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomReplies;

impl ReplyDecider for RandomReplies {
    fn decide(&self, _record: &Record) -> ReplyKind {
        *ReplyKind::ALL
            .choose(&mut rand::thread_rng())
            .unwrap_or(&ReplyKind::Unclear)
    }
}

/// A simulated reply for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedReply {
    pub kind: ReplyKind,
    pub body: String,
}

impl SimulatedReply {
    fn none(kind: ReplyKind) -> Self {
        Self {
            kind,
            body: String::new(),
        }
    }

    pub fn replied(&self) -> bool {
        !self.body.is_empty()
    }
}

impl StageOutput for SimulatedReply {
    const COLUMNS: &'static [&'static str] = &["reply", "reply_mail_body"];

    fn into_row(self) -> Vec<String> {
        vec![
            if self.replied() { "Yes" } else { "No" }.to_string(),
            self.body,
        ]
    }
}

/// Generates simulated replies with an LLM.
pub struct ReplySimulator {
    llm: Arc<dyn LlmProvider>,
    decider: Arc<dyn ReplyDecider>,
}

impl ReplySimulator {
    pub fn new(llm: Arc<dyn LlmProvider>, decider: Arc<dyn ReplyDecider>) -> Self {
        Self { llm, decider }
    }
}

#[async_trait]
impl RecordStage for ReplySimulator {
    type Output = SimulatedReply;

    fn name(&self) -> &'static str {
        "simulate-replies"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["email_body"]
    }

    async fn process(&self, record: &Record) -> Result<SimulatedReply, TaskFailure> {
        let kind = self.decider.decide(record);
        let Some(instruction) = kind.instruction() else {
            return Ok(SimulatedReply::none(kind));
        };

        let prompt = format!(
            "{instruction} {}",
            record.get("email_body").unwrap_or_default()
        );
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(REPLY_TEMPERATURE)
            .with_max_tokens(REPLY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        let body = response.content.trim().to_string();
        if body.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: "empty reply".to_string(),
            }
            .into());
        }
        Ok(SimulatedReply { kind, body })
    }

    fn fallback(&self, _record: &Record, _failure: &TaskFailure) -> SimulatedReply {
        SimulatedReply::none(ReplyKind::Skip)
    }

    fn describe(&self, _record: &Record, output: &SimulatedReply) -> Option<String> {
        Some(format!("Reply: {}", output.kind))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::dataset::Dataset;
    use crate::llm::{CompletionResponse, FinishReason};
    use crate::pipeline::{SilentProgress, enrich_dataset};

    struct CountingLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for CountingLlm {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let prompt = &request.messages[0].content;
            Ok(CompletionResponse {
                content: format!("reply to: {prompt}"),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    fn emails() -> Dataset {
        Dataset::from_rows(
            vec!["email_body".into()],
            vec![vec!["Dear Ada, ...".into()], vec!["Dear Bob, ...".into()]],
        )
    }

    #[tokio::test]
    async fn skip_makes_no_external_call() {
        let llm = Arc::new(CountingLlm {
            calls: AtomicUsize::new(0),
        });
        let stage = ReplySimulator::new(llm.clone(), Arc::new(|_r: &Record| ReplyKind::Skip));
        let data = emails();

        let reply = stage.process(&data.records()[0]).await.unwrap();
        assert!(!reply.replied());
        assert_eq!(reply.into_row(), vec!["No".to_string(), String::new()]);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn decider_controls_reply_kind_per_record() {
        let llm = Arc::new(CountingLlm {
            calls: AtomicUsize::new(0),
        });
        let decider = |r: &Record| {
            if r.index() == 0 {
                ReplyKind::Interested
            } else {
                ReplyKind::NotInterested
            }
        };
        let stage = ReplySimulator::new(llm.clone(), Arc::new(decider));
        let data = emails();

        let first = stage.process(&data.records()[0]).await.unwrap();
        let second = stage.process(&data.records()[1]).await.unwrap();
        assert_eq!(first.kind, ReplyKind::Interested);
        assert_eq!(second.kind, ReplyKind::NotInterested);
        assert!(first.body.contains("INTERESTED"));
        assert_eq!(first.into_row()[0], "Yes");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn random_decider_returns_known_kinds() {
        let data = emails();
        for _ in 0..20 {
            let kind = RandomReplies.decide(&data.records()[0]);
            assert!(ReplyKind::ALL.contains(&kind));
        }
    }

    struct OfflineLlm;

    #[async_trait]
    impl LlmProvider for OfflineLlm {
        fn model_name(&self) -> &str {
            "offline"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "offline".to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn failed_reply_falls_back_to_no_reply() {
        let stage = ReplySimulator::new(
            Arc::new(OfflineLlm),
            Arc::new(|_r: &Record| ReplyKind::Interested),
        );
        let mut data = emails();

        let failure = stage.process(&data.records()[0]).await.unwrap_err();
        let fallback = stage.fallback(&data.records()[0], &failure);
        assert_eq!(fallback.into_row(), vec!["No".to_string(), String::new()]);

        let summary = enrich_dataset(&stage, &mut data, &SilentProgress).await;
        assert_eq!(summary.failed, 2);
        assert_eq!(data.column("reply").unwrap(), vec!["No", "No"]);
        assert_eq!(data.column("reply_mail_body").unwrap(), vec!["", ""]);
    }
}
