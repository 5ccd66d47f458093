//! Lead scoring: priority score, buyer persona and gap filling per lead.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::dataset::{Dataset, Record};
use crate::error::TaskFailure;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, parse_json_object};
use crate::pipeline::stage::{RecordStage, StageOutput};

const SCORING_TEMPERATURE: f32 = 0.7;
const SCORING_MAX_TOKENS: u32 = 1024;

/// Score used when the model gave no usable answer.
pub const NEUTRAL_SCORE: u8 = 50;

const NOT_PROVIDED: &str = "Not provided";
const NEVER_CONTACTED: &str = "Never contacted";

/// Result of scoring one lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadScore {
    pub priority_score: u8,
    pub buyer_persona: String,
    pub filled_industry: String,
    pub filled_job_title: String,
    pub filled_company_size: String,
    pub filled_notes: String,
}

impl StageOutput for LeadScore {
    const COLUMNS: &'static [&'static str] = &[
        "priority_score",
        "buyer_persona",
        "ai_filled_industry",
        "ai_filled_job_title",
        "ai_filled_company_size",
        "ai_filled_notes",
    ];

    fn into_row(self) -> Vec<String> {
        vec![
            self.priority_score.to_string(),
            self.buyer_persona,
            self.filled_industry,
            self.filled_job_title,
            self.filled_company_size,
            self.filled_notes,
        ]
    }
}

/// Scores leads with an LLM.
pub struct LeadScorer {
    llm: Arc<dyn LlmProvider>,
}

impl LeadScorer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl RecordStage for LeadScorer {
    type Output = LeadScore;

    fn name(&self) -> &'static str {
        "score"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["name", "company", "location"]
    }

    async fn process(&self, record: &Record) -> Result<LeadScore, TaskFailure> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(SCORING_SYSTEM_PROMPT),
            ChatMessage::user(build_lead_prompt(record)),
        ])
        .with_temperature(SCORING_TEMPERATURE)
        .with_max_tokens(SCORING_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        debug!(index = record.index(), "Scoring response received");
        parse_score_response(&response.content, record).map_err(TaskFailure::MalformedResponse)
    }

    fn fallback(&self, record: &Record, _failure: &TaskFailure) -> LeadScore {
        LeadScore {
            priority_score: NEUTRAL_SCORE,
            buyer_persona: "Unknown".to_string(),
            filled_industry: record.value_or("industry", "Unknown").to_string(),
            filled_job_title: record.value_or("job_title", "Unknown").to_string(),
            filled_company_size: record.value_or("company_size", "Unknown").to_string(),
            filled_notes: record.value_or("notes", "N/A").to_string(),
        }
    }

    fn describe(&self, record: &Record, output: &LeadScore) -> Option<String> {
        Some(format!(
            "Analyzed {}: score {}/100 | {}",
            record.value_or("name", "?"),
            output.priority_score,
            output.buyer_persona
        ))
    }

    fn finalize(&self, dataset: &mut Dataset) {
        dataset.sort_by_numeric_desc("priority_score");
    }
}

// ── Prompt construction ─────────────────────────────────────────────

const SCORING_SYSTEM_PROMPT: &str = "You are a B2B sales analyst. Analyze the lead carefully and fill missing information.\n\n\
Return ONLY a JSON object with exactly these fields:\n\
{\"priority_score\": <number 0-100>, \"buyer_persona\": \"<persona type>\", \
\"filled_industry\": \"...\", \"filled_job_title\": \"...\", \
\"filled_company_size\": \"...\", \"filled_notes\": \"...\"}\n\n\
PRIORITY SCORING (0-100):\n\
1. Engagement signals in notes (max 30): positive signals such as \"interested\", \"requested demo\", \
\"budget approved\" +20-30; concerns such as \"limited budget\", \"needs follow-up\" +5-10; no notes 0.\n\
2. Recency of contact (max 25): within 7 days +25; within 30 days +15; 1-3 months +10; older +5; never 0.\n\
3. Job title seniority (max 25): C-level +25; VP/Director +20; Manager +15; Specialist/Analyst +10.\n\
4. Company size (max 20): 500+ +20; 200-500 +15; 100-200 +12; 50-100 +10; 10-50 +7; 1-10 +5.\n\n\
FILLING MISSING DATA:\n\
- Industry: infer from the company name.\n\
- Job title: infer from seniority signals.\n\
- Company size: estimate from industry norms and company name.\n\
- Notes: predict likely interests from industry and role.\n\n\
BUYER PERSONA examples: \"Enterprise Technology Decision Maker\", \"Growth-Stage Startup Founder\", \
\"Mid-Market Operations Leader\", \"SMB Business Owner\".";

/// Build the per-lead user prompt. Empty cells are shown as not provided.
pub fn build_lead_prompt(record: &Record) -> String {
    format!(
        "Lead Data:\n\
         - Name: {}\n\
         - Company: {}\n\
         - Industry: {}\n\
         - Job Title: {}\n\
         - Company Size: {}\n\
         - Location: {}\n\
         - Notes: {}\n\
         - Last Contact: {}",
        record.value_or("name", ""),
        record.value_or("company", ""),
        record.value_or("industry", NOT_PROVIDED),
        record.value_or("job_title", NOT_PROVIDED),
        record.value_or("company_size", NOT_PROVIDED),
        record.value_or("location", ""),
        record.value_or("notes", NOT_PROVIDED),
        record.value_or("last_contact", NEVER_CONTACTED),
    )
}

// ── Response parsing ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    priority_score: serde_json::Value,
    #[serde(default)]
    buyer_persona: String,
    #[serde(default)]
    filled_industry: Option<String>,
    #[serde(default)]
    filled_job_title: Option<String>,
    #[serde(default)]
    filled_company_size: Option<String>,
    #[serde(default)]
    filled_notes: Option<String>,
}

/// Parse a scoring response. Filled fields the model omitted fall back to
/// the lead's own values.
pub fn parse_score_response(raw: &str, record: &Record) -> Result<LeadScore, String> {
    let response: ScoreResponse = parse_json_object(raw)?;
    let priority_score = score_from_json(&response.priority_score)
        .ok_or_else(|| format!("priority_score is not a number: {}", response.priority_score))?;

    let or_record = |filled: Option<String>, column: &str| {
        filled
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| record.value_or(column, "").to_string())
    };

    Ok(LeadScore {
        priority_score,
        buyer_persona: if response.buyer_persona.trim().is_empty() {
            "Unknown".to_string()
        } else {
            response.buyer_persona.trim().to_string()
        },
        filled_industry: or_record(response.filled_industry, "industry"),
        filled_job_title: or_record(response.filled_job_title, "job_title"),
        filled_company_size: or_record(response.filled_company_size, "company_size"),
        filled_notes: or_record(response.filled_notes, "notes"),
    })
}

/// Accept numbers or numeric strings, rounding and clamping into 0..=100.
fn score_from_json(value: &serde_json::Value) -> Option<u8> {
    let raw = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as u8)
}
