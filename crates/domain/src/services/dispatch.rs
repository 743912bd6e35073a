//! Multi-channel report delivery.
//!
//! Email and Telegram are sent concurrently and tracked independently. A
//! failing or slow channel never affects the other one.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::report::{escape_html, ConsolidatedReport};
use crate::error::ChannelError;
use crate::models::DeliveryTargets;

/// Telegram's limit on document captions, in characters.
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A single email to one recipient.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
    pub attachment: Option<Attachment>,
}

/// Outbound email transport.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), ChannelError>;
}

/// Outbound chat transport able to post a document with an HTML caption.
#[async_trait]
pub trait DocumentSender: Send + Sync {
    async fn send_document(
        &self,
        chat_id: &str,
        document: Attachment,
        caption: &str,
    ) -> Result<(), ChannelError>;
}

/// Per-channel result of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub email_sent: bool,
    pub telegram_sent: bool,
}

/// Sends a consolidated report over every configured channel.
pub struct MultiChannelDispatcher {
    email: Arc<dyn EmailSender>,
    telegram: Arc<dyn DocumentSender>,
}

impl MultiChannelDispatcher {
    pub fn new(email: Arc<dyn EmailSender>, telegram: Arc<dyn DocumentSender>) -> Self {
        Self { email, telegram }
    }

    /// Sends `report` to `targets`, giving each channel `timeout` to finish.
    pub async fn dispatch(
        &self,
        report: &ConsolidatedReport,
        targets: &DeliveryTargets,
        timeout: Duration,
    ) -> DispatchOutcome {
        let (email_sent, telegram_sent) = tokio::join!(
            self.send_email(report, targets, timeout),
            self.send_telegram(report, targets, timeout)
        );
        DispatchOutcome {
            email_sent,
            telegram_sent,
        }
    }

    async fn send_email(
        &self,
        report: &ConsolidatedReport,
        targets: &DeliveryTargets,
        timeout: Duration,
    ) -> bool {
        if !targets.has_email() {
            tracing::warn!("No email recipients configured, skipping email delivery");
            return false;
        }

        let sends = targets.email_recipients.iter().map(|to| {
            let email = OutgoingEmail {
                to: to.clone(),
                subject: report.subject.clone(),
                body_text: report.summary_text.clone(),
                body_html: html_body(&report.summary_html),
                attachment: Some(report.export.clone()),
            };
            async move { (to.as_str(), self.email.send(email).await) }
        });

        match tokio::time::timeout(timeout, futures::future::join_all(sends)).await {
            Ok(results) => {
                let mut all_ok = true;
                for (to, result) in results {
                    if let Err(e) = result {
                        all_ok = false;
                        tracing::error!(recipient = %to, error = %e, "Failed to send pass report email");
                    }
                }
                all_ok
            }
            Err(_) => {
                tracing::error!(
                    timeout_secs = timeout.as_secs(),
                    "Email delivery timed out"
                );
                false
            }
        }
    }

    async fn send_telegram(
        &self,
        report: &ConsolidatedReport,
        targets: &DeliveryTargets,
        timeout: Duration,
    ) -> bool {
        let chat_id = match targets.chat_id.as_deref() {
            Some(id) if targets.has_chat() => id,
            _ => {
                tracing::warn!("No Telegram chat configured, skipping chat delivery");
                return false;
            }
        };

        let caption = telegram_caption(report);
        let send = self
            .telegram
            .send_document(chat_id, report.export.clone(), &caption);

        match tokio::time::timeout(timeout, send).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(chat_id = %chat_id, error = %e, "Failed to send pass report to Telegram");
                false
            }
            Err(_) => {
                tracing::error!(
                    chat_id = %chat_id,
                    timeout_secs = timeout.as_secs(),
                    "Telegram delivery timed out"
                );
                false
            }
        }
    }
}

fn html_body(summary_html: &str) -> String {
    format!(
        "<html><body><pre style=\"font-family: sans-serif\">{}</pre></body></html>",
        summary_html
    )
}

/// Caption for the Telegram document.
///
/// The HTML summary is used as is when it fits. Otherwise the plain-text
/// summary is cut to the limit and escaped, so no tag is ever split.
pub fn telegram_caption(report: &ConsolidatedReport) -> String {
    if report.summary_html.chars().count() <= TELEGRAM_CAPTION_LIMIT {
        return report.summary_html.clone();
    }
    let mut cut: String = report
        .summary_text
        .chars()
        .take(TELEGRAM_CAPTION_LIMIT - 1)
        .collect();
    cut.push('…');
    escape_html(&cut)
}

/// Email sender for development and testing.
///
/// Records every message instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct MockEmailSender {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
    /// Artificial latency per message.
    pub delay: Option<Duration>,
    sent: Arc<Mutex<Vec<OutgoingEmail>>>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send(&self, email: OutgoingEmail) -> Result<(), ChannelError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.simulate_failure {
            tracing::warn!(to = %email.to, "Mock email sender simulating failure");
            return Err(ChannelError::Transport("Simulated failure".to_string()));
        }
        tracing::info!(to = %email.to, subject = %email.subject, "Mock: Would send email");
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email);
        }
        Ok(())
    }
}

/// A document recorded by [`MockDocumentSender`].
#[derive(Debug, Clone)]
pub struct SentDocument {
    pub chat_id: String,
    pub document: Attachment,
    pub caption: String,
}

/// Document sender for development and testing.
#[derive(Debug, Clone, Default)]
pub struct MockDocumentSender {
    pub simulate_failure: bool,
    pub delay: Option<Duration>,
    sent: Arc<Mutex<Vec<SentDocument>>>,
}

impl MockDocumentSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentDocument> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DocumentSender for MockDocumentSender {
    async fn send_document(
        &self,
        chat_id: &str,
        document: Attachment,
        caption: &str,
    ) -> Result<(), ChannelError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.simulate_failure {
            tracing::warn!(chat_id = %chat_id, "Mock document sender simulating failure");
            return Err(ChannelError::Rejected("Simulated failure".to_string()));
        }
        tracing::info!(
            chat_id = %chat_id,
            filename = %document.filename,
            "Mock: Would send document"
        );
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentDocument {
                chat_id: chat_id.to_string(),
                document,
                caption: caption.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::report;
    use chrono::Utc;
    use chrono_tz::Europe::Moscow;
    use std::collections::HashMap;

    fn empty_report() -> ConsolidatedReport {
        report::build(vec![], &HashMap::new(), &Moscow, Utc::now())
    }

    fn targets() -> DeliveryTargets {
        DeliveryTargets {
            email_recipients: vec![
                "security@campus.example".to_string(),
                "desk@campus.example".to_string(),
            ],
            chat_id: Some("-100200300".to_string()),
        }
    }

    #[tokio::test]
    async fn test_both_channels_succeed() {
        let email = MockEmailSender::new();
        let chat = MockDocumentSender::new();
        let dispatcher = MultiChannelDispatcher::new(Arc::new(email.clone()), Arc::new(chat.clone()));

        let outcome = dispatcher
            .dispatch(&empty_report(), &targets(), Duration::from_secs(5))
            .await;

        assert_eq!(
            outcome,
            DispatchOutcome {
                email_sent: true,
                telegram_sent: true
            }
        );
        let emails = email.sent();
        assert_eq!(emails.len(), 2);
        assert!(emails.iter().all(|e| e.attachment.is_some()));
        let docs = chat.sent();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].chat_id, "-100200300");
        assert_eq!(docs[0].caption, report::EMPTY_SUMMARY);
    }

    #[tokio::test]
    async fn test_email_failure_does_not_affect_chat() {
        let chat = MockDocumentSender::new();
        let dispatcher = MultiChannelDispatcher::new(
            Arc::new(MockEmailSender::failing()),
            Arc::new(chat.clone()),
        );

        let outcome = dispatcher
            .dispatch(&empty_report(), &targets(), Duration::from_secs(5))
            .await;

        assert!(!outcome.email_sent);
        assert!(outcome.telegram_sent);
        assert_eq!(chat.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_channels_report_false() {
        let email = MockEmailSender::new();
        let dispatcher = MultiChannelDispatcher::new(
            Arc::new(email.clone()),
            Arc::new(MockDocumentSender::new()),
        );

        let outcome = dispatcher
            .dispatch(&empty_report(), &DeliveryTargets::default(), Duration::from_secs(5))
            .await;

        assert_eq!(outcome, DispatchOutcome::default());
        assert!(email.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_channel_times_out() {
        let dispatcher = MultiChannelDispatcher::new(
            Arc::new(MockEmailSender::new()),
            Arc::new(MockDocumentSender::slow(Duration::from_secs(600))),
        );

        let outcome = dispatcher
            .dispatch(&empty_report(), &targets(), Duration::from_secs(180))
            .await;

        assert!(outcome.email_sent);
        assert!(!outcome.telegram_sent);
    }

    #[test]
    fn test_caption_fits_limit() {
        let mut report = empty_report();
        report.summary_html = "<b>x</b>".repeat(400);
        report.summary_text = "x & y ".repeat(400);
        let caption = telegram_caption(&report);
        assert!(!caption.contains("<b>"));
        assert!(caption.starts_with("x &amp; y"));
        // escaped entities count as one character on Telegram's side
        let visible = caption.replace("&amp;", "&");
        assert_eq!(visible.chars().count(), TELEGRAM_CAPTION_LIMIT);
    }
}
