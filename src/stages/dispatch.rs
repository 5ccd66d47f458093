//! Outreach dispatch: deliver each drafted email through the transport.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;

use crate::dataset::Record;
use crate::error::TaskFailure;
use crate::pipeline::stage::{RecordStage, StageOutput};
use crate::stages::drafting::TIMESTAMP_FORMAT;
use crate::transport::MailTransport;

/// Delivery outcome for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryStatus {
    pub sent: bool,
    pub sent_at: String,
    pub status: String,
}

impl DeliveryStatus {
    fn not_sent(status: impl Into<String>) -> Self {
        Self {
            sent: false,
            sent_at: String::new(),
            status: status.into(),
        }
    }
}

impl StageOutput for DeliveryStatus {
    const COLUMNS: &'static [&'static str] = &["email_sent", "sent_at", "send_status"];

    fn into_row(self) -> Vec<String> {
        vec![
            if self.sent { "True" } else { "False" }.to_string(),
            self.sent_at,
            self.status,
        ]
    }
}

/// Sends drafted outreach.
pub struct OutreachDispatcher {
    transport: Arc<dyn MailTransport>,
}

impl OutreachDispatcher {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl RecordStage for OutreachDispatcher {
    type Output = DeliveryStatus;

    fn name(&self) -> &'static str {
        "send"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["name", "email_subject", "email_body"]
    }

    async fn process(&self, record: &Record) -> Result<DeliveryStatus, TaskFailure> {
        let Some(recipient) = record.value("email") else {
            return Ok(DeliveryStatus::not_sent("No email address"));
        };

        self.transport
            .deliver(
                recipient,
                record.get("email_subject").unwrap_or_default(),
                record.get("email_body").unwrap_or_default(),
            )
            .await?;

        Ok(DeliveryStatus {
            sent: true,
            sent_at: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            status: "Success".to_string(),
        })
    }

    fn fallback(&self, _record: &Record, failure: &TaskFailure) -> DeliveryStatus {
        DeliveryStatus::not_sent(format!("Error: {failure}"))
    }

    fn describe(&self, record: &Record, output: &DeliveryStatus) -> Option<String> {
        Some(if output.sent {
            format!(
                "Sent to {} ({})",
                record.value_or("name", "?"),
                record.value_or("email", "?")
            )
        } else {
            format!("Skipped {}: {}", record.value_or("name", "?"), output.status)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::dataset::Dataset;
    use crate::error::TransportError;

    struct RecordingTransport {
        sent: Mutex<Vec<(String, String)>>,
        fail_for: Option<&'static str>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn deliver(
            &self,
            recipient: &str,
            subject: &str,
            _body: &str,
        ) -> Result<(), TransportError> {
            if self.fail_for == Some(recipient) {
                return Err(TransportError::Send("connection refused".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), subject.to_string()));
            Ok(())
        }
    }

    fn outreach(email: &str) -> Dataset {
        Dataset::from_rows(
            vec![
                "name".into(),
                "email".into(),
                "email_subject".into(),
                "email_body".into(),
            ],
            vec![vec!["Ada".into(), email.into(), "Hi Ada".into(), "Body".into()]],
        )
    }

    #[tokio::test]
    async fn missing_address_is_recorded_not_failed() {
        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(vec![]),
            fail_for: None,
        });
        let stage = OutreachDispatcher::new(transport.clone());
        let data = outreach("");

        let status = stage.process(&data.records()[0]).await.unwrap();
        assert_eq!(status, DeliveryStatus::not_sent("No email address"));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn successful_send_is_marked() {
        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(vec![]),
            fail_for: None,
        });
        let stage = OutreachDispatcher::new(transport.clone());
        let data = outreach("ada@example.com");

        let status = stage.process(&data.records()[0]).await.unwrap();
        assert!(status.sent);
        assert_eq!(status.status, "Success");
        assert_eq!(
            transport.sent.lock().unwrap().as_slice(),
            &[("ada@example.com".to_string(), "Hi Ada".to_string())]
        );
    }

    #[tokio::test]
    async fn transport_failure_becomes_error_status() {
        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(vec![]),
            fail_for: Some("ada@example.com"),
        });
        let stage = OutreachDispatcher::new(transport);
        let data = outreach("ada@example.com");
        let record = &data.records()[0];

        let failure = stage.process(record).await.unwrap_err();
        let status = stage.fallback(record, &failure);
        assert!(!status.sent);
        assert_eq!(status.status, "Error: SMTP send failed: connection refused");
        assert_eq!(status.into_row()[0], "False");
    }
}
