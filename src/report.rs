//! Campaign report: aggregate metrics over the final dataset and a
//! model-authored markdown write-up.
//!
//! Metrics are pure: every column is optional and an absent column simply
//! contributes zero. Only `ReportAuthor::author` talks to the outside world.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::dataset::{Dataset, write_atomic};
use crate::error::{LlmError, StageError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::stage::ensure_input;

const REPORT_TEMPERATURE: f32 = 0.7;
const REPORT_MAX_TOKENS: u32 = 2048;

/// Score at or above which a lead counts as high priority.
pub const HIGH_PRIORITY_THRESHOLD: f64 = 70.0;

/// `(value, count)` pairs, most frequent first.
pub type Distribution = Vec<(String, usize)>;

/// Aggregate numbers for one campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignMetrics {
    pub total_contacts: usize,
    pub emails_sent: usize,
    pub emails_successful: usize,
    pub replies_received: usize,
    pub positive_replies: usize,
    pub negative_replies: usize,
    pub neutral_replies: usize,
    /// Replies per successful delivery, in percent.
    pub response_rate: Decimal,
    /// Positive replies per reply, in percent.
    pub positive_rate: Decimal,
    /// Successful deliveries per sent email, in percent.
    pub success_rate: Decimal,
    pub avg_priority_score: Decimal,
    pub high_priority_leads: usize,
    pub industry_distribution: Distribution,
    pub company_size_distribution: Distribution,
    pub location_distribution: Distribution,
    pub reply_class_distribution: Distribution,
}

impl CampaignMetrics {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let cells = |column: &str| dataset.column(column).unwrap_or_default();

        let emails_sent = cells("email_sent")
            .iter()
            .filter(|v| v.trim().eq_ignore_ascii_case("true"))
            .count();
        let emails_successful = cells("send_status")
            .iter()
            .filter(|v| v.trim() == "Success")
            .count();

        let replies: Vec<String> = cells("reply")
            .iter()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .collect();
        let positive_replies = replies.iter().filter(|r| *r == "yes").count();
        let negative_replies = replies.iter().filter(|r| *r == "no").count();
        let replies_received = replies.len();

        let scores: Vec<f64> = cells("priority_score")
            .iter()
            .filter_map(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .collect();
        let avg_priority_score = if scores.is_empty() {
            Decimal::ZERO
        } else {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            Decimal::from_f64_retain(mean)
                .unwrap_or_default()
                .round_dp(2)
        };

        Self {
            total_contacts: dataset.len(),
            emails_sent,
            emails_successful,
            replies_received,
            positive_replies,
            negative_replies,
            neutral_replies: replies_received - positive_replies - negative_replies,
            response_rate: percentage(replies_received, emails_successful),
            positive_rate: percentage(positive_replies, replies_received),
            success_rate: percentage(emails_successful, emails_sent),
            avg_priority_score,
            high_priority_leads: scores
                .iter()
                .filter(|s| **s >= HIGH_PRIORITY_THRESHOLD)
                .count(),
            industry_distribution: distribution(&cells("industry")),
            company_size_distribution: distribution(&cells("company_size")),
            location_distribution: distribution(&cells("location")),
            reply_class_distribution: distribution(&cells("reply_class")),
        }
    }
}

/// `part / whole` in percent, two decimal places; zero when `whole` is zero.
fn percentage(part: usize, whole: usize) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(whole)).round_dp(2)
}

/// Count non-empty values, ordered by count descending then value.
fn distribution(values: &[&str]) -> Distribution {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        *counts.entry(value).or_default() += 1;
    }
    let mut pairs: Distribution = counts
        .into_iter()
        .map(|(value, count)| (value.to_string(), count))
        .collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs
}

fn format_distribution(pairs: &Distribution) -> String {
    if pairs.is_empty() {
        return "none".to_string();
    }
    pairs
        .iter()
        .map(|(value, count)| format!("{value}: {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Turns metrics into a markdown report.
#[async_trait]
pub trait ReportAuthor: Send + Sync {
    async fn author(&self, metrics: &CampaignMetrics) -> Result<String, LlmError>;
}

/// Report author backed by an LLM.
pub struct LlmReportAuthor {
    llm: Arc<dyn LlmProvider>,
}

impl LlmReportAuthor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ReportAuthor for LlmReportAuthor {
    async fn author(&self, metrics: &CampaignMetrics) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(REPORT_SYSTEM_PROMPT),
            ChatMessage::user(build_report_prompt(metrics)),
        ])
        .with_temperature(REPORT_TEMPERATURE)
        .with_max_tokens(REPORT_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        let markdown = response.content.trim();
        if markdown.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: "empty report".to_string(),
            });
        }
        Ok(markdown.to_string())
    }
}

const REPORT_SYSTEM_PROMPT: &str = "You are an expert data analyst specializing in email marketing campaigns. \
Generate a comprehensive, enterprise-level campaign report in markdown with these sections:\n\
1. Executive Summary\n\
2. Campaign Overview\n\
3. Response Analysis\n\
4. Audience Segmentation\n\
5. Lead Quality Assessment\n\
6. Key Findings and Insights\n\
7. Strategic Recommendations\n\
8. Conclusion\n\n\
Use professional language, include percentages, and format with headers, tables where \
appropriate, and bullet points.";

/// Render the metrics block the report is written from.
pub fn build_report_prompt(metrics: &CampaignMetrics) -> String {
    format!(
        "**Campaign Metrics:**\n\
         - Total Contacts in Database: {}\n\
         - Emails Sent: {}\n\
         - Successfully Delivered: {}\n\
         - Email Delivery Success Rate: {}%\n\
         - Replies Received: {}\n\
         - Response Rate: {}%\n\
         - Positive Responses: {}\n\
         - Negative Responses: {}\n\
         - Neutral/Inquiry Responses: {}\n\
         - Positive Reply Rate: {}%\n\
         - Average Priority Score: {}\n\
         - High Priority Leads (Score >= 70): {}\n\n\
         **Segmentation Data:**\n\
         - Industry Distribution: {}\n\
         - Company Size Distribution: {}\n\
         - Location Distribution: {}\n\
         - Reply Classification: {}",
        metrics.total_contacts,
        metrics.emails_sent,
        metrics.emails_successful,
        metrics.success_rate,
        metrics.replies_received,
        metrics.response_rate,
        metrics.positive_replies,
        metrics.negative_replies,
        metrics.neutral_replies,
        metrics.positive_rate,
        metrics.avg_priority_score,
        metrics.high_priority_leads,
        format_distribution(&metrics.industry_distribution),
        format_distribution(&metrics.company_size_distribution),
        format_distribution(&metrics.location_distribution),
        format_distribution(&metrics.reply_class_distribution),
    )
}

/// Load `input`, compute metrics, have `author` write them up and save the
/// markdown to `output`.
pub async fn generate_report(
    input: &Path,
    output: &Path,
    author: &dyn ReportAuthor,
) -> Result<CampaignMetrics, StageError> {
    ensure_input("report", input).await?;
    let dataset = Dataset::load(input, &[]).await?;
    let metrics = CampaignMetrics::from_dataset(&dataset);

    info!(
        contacts = metrics.total_contacts,
        replies = metrics.replies_received,
        "Generating campaign report"
    );
    let markdown = author.author(&metrics).await?;
    write_atomic(output, markdown.as_bytes()).await?;

    info!(output = %output.display(), "Campaign report saved");
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    use super::*;

    fn campaign() -> Dataset {
        let columns = ["name", "industry", "priority_score", "email_sent", "send_status", "reply", "reply_class"];
        let rows = [
            ["A", "Software", "85", "True", "Success", "Yes", "INTERESTED"],
            ["B", "Healthcare", "72", "True", "Success", "No", "NO_REPLY"],
            ["C", "Software", "40", "True", "Error: refused", "No", "NO_REPLY"],
            ["D", "", "abc", "False", "No email address", "", ""],
        ];
        Dataset::from_rows(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn metrics_from_full_dataset() {
        let m = CampaignMetrics::from_dataset(&campaign());
        assert_eq!(m.total_contacts, 4);
        assert_eq!(m.emails_sent, 3);
        assert_eq!(m.emails_successful, 2);
        assert_eq!(m.replies_received, 3);
        assert_eq!(m.positive_replies, 1);
        assert_eq!(m.negative_replies, 2);
        assert_eq!(m.neutral_replies, 0);
        assert_eq!(m.response_rate, dec!(150.00));
        assert_eq!(m.positive_rate, dec!(33.33));
        assert_eq!(m.success_rate, dec!(66.67));
        assert_eq!(m.avg_priority_score, dec!(65.67));
        assert_eq!(m.high_priority_leads, 2);
        assert_eq!(
            m.industry_distribution,
            vec![("Software".to_string(), 2), ("Healthcare".to_string(), 1)]
        );
        assert_eq!(
            m.reply_class_distribution,
            vec![("NO_REPLY".to_string(), 2), ("INTERESTED".to_string(), 1)]
        );
        assert!(m.location_distribution.is_empty());
    }

    #[test]
    fn absent_columns_contribute_zero() {
        let data = Dataset::from_rows(vec!["name".into()], vec![vec!["A".into()]]);
        let m = CampaignMetrics::from_dataset(&data);
        assert_eq!(m.total_contacts, 1);
        assert_eq!(m.emails_sent, 0);
        assert_eq!(m.response_rate, Decimal::ZERO);
        assert_eq!(m.avg_priority_score, Decimal::ZERO);
        assert!(m.industry_distribution.is_empty());
    }

    #[test]
    fn distribution_ties_break_by_name() {
        let d = distribution(&["b", "a", "c", "a", "b"]);
        assert_eq!(
            d,
            vec![("a".to_string(), 2), ("b".to_string(), 2), ("c".to_string(), 1)]
        );
    }

    struct StaticAuthor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReportAuthor for StaticAuthor {
        async fn author(&self, metrics: &CampaignMetrics) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("# Report\n\nContacts: {}\n", metrics.total_contacts))
        }
    }

    #[tokio::test]
    async fn generate_report_writes_markdown() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("final.csv");
        let output = dir.path().join("report").join("campaign_report.md");
        campaign().save(&input).await.unwrap();
        let author = StaticAuthor {
            calls: AtomicUsize::new(0),
        };

        let metrics = generate_report(&input, &output, &author).await.unwrap();
        assert_eq!(metrics.total_contacts, 4);
        let written = std::fs::read_to_string(&output).unwrap();
        assert_eq!(written, "# Report\n\nContacts: 4\n");
    }

    #[tokio::test]
    async fn generate_report_requires_input() {
        let dir = TempDir::new().unwrap();
        let author = StaticAuthor {
            calls: AtomicUsize::new(0),
        };
        let err = generate_report(
            &dir.path().join("missing.csv"),
            &dir.path().join("out.md"),
            &author,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StageError::Precondition { .. }));
        assert_eq!(author.calls.load(Ordering::SeqCst), 0);
    }
}
