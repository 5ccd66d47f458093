//! Reply classification.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::dataset::Record;
use crate::error::TaskFailure;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, parse_json_object};
use crate::pipeline::stage::{RecordStage, StageOutput};
use crate::stages::replies::ReplyKind;

const CLASSIFY_TEMPERATURE: f32 = 0.9;
const CLASSIFY_MAX_TOKENS: u32 = 256;

/// Class assigned to a record with no reply text.
pub const NO_REPLY: &str = "NO_REPLY";
const UNCLEAR: &str = "UNCLEAR";

/// Classification of one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyClassification {
    pub class: String,
    pub reason: String,
}

impl StageOutput for ReplyClassification {
    const COLUMNS: &'static [&'static str] = &["reply_class", "reply_reason"];

    fn into_row(self) -> Vec<String> {
        vec![self.class, self.reason]
    }
}

/// Classifies reply text with an LLM.
pub struct ReplyClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl ReplyClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl RecordStage for ReplyClassifier {
    type Output = ReplyClassification;

    fn name(&self) -> &'static str {
        "classify"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["reply_mail_body"]
    }

    async fn process(&self, record: &Record) -> Result<ReplyClassification, TaskFailure> {
        let Some(reply) = record.value("reply_mail_body") else {
            return Ok(ReplyClassification {
                class: NO_REPLY.to_string(),
                reason: "Empty content".to_string(),
            });
        };

        let request = CompletionRequest::new(vec![ChatMessage::user(format!(
            "{CLASSIFY_PROMPT}\n\nText:\n{reply}"
        ))])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        parse_classification(&response.content).map_err(TaskFailure::MalformedResponse)
    }

    fn fallback(&self, _record: &Record, failure: &TaskFailure) -> ReplyClassification {
        ReplyClassification {
            class: UNCLEAR.to_string(),
            reason: format!("Error: {failure}"),
        }
    }

    fn describe(&self, _record: &Record, output: &ReplyClassification) -> Option<String> {
        Some(format!("Classified as {}", output.class))
    }
}

const CLASSIFY_PROMPT: &str = "You are a classifier for customer email replies.\n\
Return a JSON object:\n\
{\"class\": \"<one_of: SKIP | INTERESTED | NOT_INTERESTED | NEEDS_FOLLOW_UP | UNCLEAR>\", \
\"reason\": \"<short rationale>\"}";

#[derive(Debug, Deserialize)]
struct ClassResponse {
    #[serde(default)]
    class: String,
    #[serde(default)]
    reason: String,
}

/// Normalise a label: upper-cased, and `UNCLEAR` unless it is a known class.
pub fn normalize_class(label: &str) -> String {
    let label = label.trim().to_uppercase();
    if ReplyKind::ALL.iter().any(|kind| kind.label() == label) {
        label
    } else {
        UNCLEAR.to_string()
    }
}

/// Parse a classification response.
pub fn parse_classification(raw: &str) -> Result<ReplyClassification, String> {
    let response: ClassResponse = parse_json_object(raw)?;
    Ok(ReplyClassification {
        class: normalize_class(&response.class),
        reason: response.reason.trim().to_string(),
    })
}
