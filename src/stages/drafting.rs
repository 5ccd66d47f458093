//! Outreach drafting: one personalised email per scored lead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::Deserialize;

use crate::dataset::Record;
use crate::error::TaskFailure;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, parse_json_object};
use crate::pipeline::stage::{RecordStage, StageOutput};

const DRAFT_TEMPERATURE: f32 = 0.8;
const DRAFT_MAX_TOKENS: u32 = 1536;

/// Timestamp format used in output columns.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A drafted outreach email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailDraft {
    pub subject: String,
    pub body: String,
    pub tone_used: String,
    pub key_personalization: String,
    pub generated_at: String,
}

impl StageOutput for EmailDraft {
    const COLUMNS: &'static [&'static str] = &[
        "email_subject",
        "email_body",
        "email_tone",
        "personalization_notes",
        "email_generated_at",
    ];

    fn into_row(self) -> Vec<String> {
        vec![
            self.subject,
            self.body,
            self.tone_used,
            self.key_personalization,
            self.generated_at,
        ]
    }
}

/// Drafts outreach emails with an LLM.
pub struct EmailDrafter {
    llm: Arc<dyn LlmProvider>,
}

impl EmailDrafter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

fn now_stamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[async_trait]
impl RecordStage for EmailDrafter {
    type Output = EmailDraft;

    fn name(&self) -> &'static str {
        "draft"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["name", "company"]
    }

    async fn process(&self, record: &Record) -> Result<EmailDraft, TaskFailure> {
        let today = Local::now().date_naive();
        let request = CompletionRequest::new(vec![
            ChatMessage::system(DRAFT_SYSTEM_PROMPT),
            ChatMessage::user(build_draft_prompt(record, today)),
        ])
        .with_temperature(DRAFT_TEMPERATURE)
        .with_max_tokens(DRAFT_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        parse_draft_response(&response.content, now_stamp())
            .map_err(TaskFailure::MalformedResponse)
    }

    fn fallback(&self, record: &Record, _failure: &TaskFailure) -> EmailDraft {
        EmailDraft {
            subject: format!("Following up with {}", record.value_or("company", "Company")),
            body: format!(
                "Dear {},\n\nI hope this email finds you well...",
                record.value_or("name", "Valued Customer")
            ),
            tone_used: "Generic fallback".to_string(),
            key_personalization: "Error occurred during generation".to_string(),
            generated_at: now_stamp(),
        }
    }

    fn describe(&self, record: &Record, output: &EmailDraft) -> Option<String> {
        Some(format!(
            "Drafted email for {} ({}): {}",
            record.value_or("name", "?"),
            record.value_or("company", "?"),
            output.subject
        ))
    }
}

// ── Contact history ─────────────────────────────────────────────────

/// Describe how long ago a lead was last contacted.
///
/// `last_contact` is expected as `YYYY-MM-DD`.
pub fn contact_status(last_contact: Option<&str>, today: NaiveDate) -> String {
    let Some(raw) = last_contact
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "Never contacted")
    else {
        return "Never contacted".to_string();
    };

    let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") else {
        return "Contact history unclear".to_string();
    };

    let days = (today - date).num_days();
    if days <= 7 {
        format!("Recent contact ({days} days ago)")
    } else if days <= 30 {
        format!("Contacted {days} days ago")
    } else if days <= 90 {
        format!("Contacted {} months ago", days / 30)
    } else {
        format!("Last contacted {} months ago", days / 30)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

const DRAFT_SYSTEM_PROMPT: &str = "You are an expert B2B sales communication specialist. \
Write a highly personalized, professional outreach email.\n\n\
TONE:\n\
- C-level: highly formal, strategic, business impact. VP/Director: professional, ROI-focused. \
Manager: friendly professional, practical. Specialist: conversational, technical.\n\
- Priority 80-100: direct, value-driven, clear CTA. 60-79: consultative. 40-59: educational. \
0-39: gentle introduction, low pressure.\n\
- Never contacted: fresh introduction. Recent contact: follow up on the previous conversation. \
Contacted months ago: re-engage. Positive signals in notes: move forward quickly.\n\n\
PERSONALIZATION: reference industry challenges, company size context, role pain points and location \
when relevant. Use sophisticated but clear language, active voice, no cliches.\n\n\
STRUCTURE: subject under 60 characters; greeting with their name; a hook; 2-3 short paragraphs; \
a specific call to action; professional sign-off.\n\n\
Return ONLY a JSON object:\n\
{\"subject\": \"...\", \"body\": \"...\", \"tone_used\": \"...\", \"key_personalization\": \"...\"}";

/// Build the per-lead drafting prompt.
///
/// Profile fields prefer the original value, then the scoring stage's
/// filled value, then a neutral default.
pub fn build_draft_prompt(record: &Record, today: NaiveDate) -> String {
    let pick = |column: &str, filled: &str, default: &'static str| -> String {
        record
            .value(column)
            .or_else(|| record.value(filled))
            .unwrap_or(default)
            .to_string()
    };

    format!(
        "LEAD PROFILE:\n\
         - Name: {}\n\
         - Job Title: {}\n\
         - Company: {}\n\
         - Industry: {}\n\
         - Company Size: {}\n\
         - Location: {}\n\
         - Priority Score: {}/100\n\
         - Buyer Persona: {}\n\
         - Notes/Interests: {}\n\
         - Last Contact: {}\n\
         - Contact History: {}",
        record.value_or("name", ""),
        pick("job_title", "ai_filled_job_title", "Professional"),
        record.value_or("company", ""),
        pick("industry", "ai_filled_industry", "Business"),
        pick("company_size", "ai_filled_company_size", "Medium"),
        record.value_or("location", ""),
        record.value_or("priority_score", "50"),
        record.value_or("buyer_persona", "Business Professional"),
        pick("notes", "ai_filled_notes", "Potential interest in business solutions"),
        record.value_or("last_contact", "Never contacted"),
        contact_status(record.value("last_contact"), today),
    )
}

// ── Response parsing ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DraftResponse {
    subject: String,
    body: String,
    #[serde(default)]
    tone_used: String,
    #[serde(default)]
    key_personalization: String,
}

/// Parse a drafting response. Subject and body are mandatory.
pub fn parse_draft_response(raw: &str, generated_at: String) -> Result<EmailDraft, String> {
    let response: DraftResponse = parse_json_object(raw)?;
    if response.subject.trim().is_empty() || response.body.trim().is_empty() {
        return Err("draft requires a non-empty subject and body".to_string());
    }
    Ok(EmailDraft {
        subject: response.subject.trim().to_string(),
        body: response.body,
        tone_used: response.tone_used,
        key_personalization: response.key_personalization,
        generated_at,
    })
}
