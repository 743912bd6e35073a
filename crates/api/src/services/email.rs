//! Email channel for pass reports.
//!
//! Supports two providers:
//! - `console`: logs emails instead of sending them (development)
//! - `smtp`: sends via an SMTP relay

use std::sync::Arc;

use async_trait::async_trait;
use domain::services::{EmailSender, OutgoingEmail};
use domain::ChannelError;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::EmailConfig;

/// Email service sending multipart reports with the CSV attached.
#[derive(Clone)]
pub struct EmailService {
    config: Arc<EmailConfig>,
    mailer: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailService {
    /// Creates the service, preparing the SMTP transport when needed.
    pub fn new(config: EmailConfig) -> Result<Self, ChannelError> {
        let mailer = if config.enabled && config.provider == "smtp" {
            Some(build_transport(&config)?)
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            mailer,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Builds the MIME message: plain/HTML alternative plus the attachment.
    pub fn build_message(&self, email: &OutgoingEmail) -> Result<Message, ChannelError> {
        let sender: Address = self.config.sender_email.parse().map_err(|e| {
            ChannelError::InvalidMessage(format!(
                "Invalid sender {}: {}",
                self.config.sender_email, e
            ))
        })?;
        let from = Mailbox::new(Some(self.config.sender_name.clone()), sender);
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| ChannelError::InvalidMessage(format!("Invalid recipient {}: {}", email.to, e)))?;

        let alternative =
            MultiPart::alternative_plain_html(email.body_text.clone(), email.body_html.clone());

        let body = match &email.attachment {
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                    ChannelError::InvalidMessage(format!(
                        "Invalid content type {}: {}",
                        attachment.content_type, e
                    ))
                })?;
                MultiPart::mixed().multipart(alternative).singlepart(
                    MailAttachment::new(attachment.filename.clone())
                        .body(attachment.bytes.clone(), content_type),
                )
            }
            None => alternative,
        };

        Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.clone())
            .multipart(body)
            .map_err(|e| ChannelError::InvalidMessage(e.to_string()))
    }

    async fn send_console(&self, email: OutgoingEmail) -> Result<(), ChannelError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            from = %self.config.sender_email,
            attachment = ?email.attachment.as_ref().map(|a| a.filename.as_str()),
            "Email (console provider)"
        );
        debug!(body_text = %email.body_text, "Email body (plain text)");
        Ok(())
    }

    async fn send_smtp(&self, email: OutgoingEmail) -> Result<(), ChannelError> {
        let mailer = self.mailer.as_ref().ok_or_else(|| {
            ChannelError::NotConfigured("SMTP transport not initialized".to_string())
        })?;
        let message = self.build_message(&email)?;

        mailer
            .send(message)
            .await
            .map_err(|e| ChannelError::Transport(format!("SMTP send to {}: {}", email.to, e)))?;

        info!(to = %email.to, subject = %email.subject, "Email sent via SMTP");
        Ok(())
    }
}

#[async_trait]
impl EmailSender for EmailService {
    async fn send(&self, email: OutgoingEmail) -> Result<(), ChannelError> {
        if !self.config.enabled {
            debug!(to = %email.to, "Email channel disabled, not sending");
            return Err(ChannelError::NotConfigured(
                "email delivery is disabled".to_string(),
            ));
        }

        match self.config.provider.as_str() {
            "console" => self.send_console(email).await,
            "smtp" => self.send_smtp(email).await,
            provider => Err(ChannelError::NotConfigured(format!(
                "unknown email provider {}",
                provider
            ))),
        }
    }
}

fn build_transport(config: &EmailConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, ChannelError> {
    if config.smtp_host.is_empty() {
        return Err(ChannelError::NotConfigured("smtp_host is empty".to_string()));
    }

    let builder = if config.smtp_use_tls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| ChannelError::NotConfigured(format!("SMTP relay: {}", e)))?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
    };

    let builder = builder.port(config.smtp_port);
    let builder = if config.smtp_username.is_empty() {
        builder
    } else {
        builder.credentials(Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.clone(),
        ))
    };

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::services::Attachment;

    fn test_config() -> EmailConfig {
        EmailConfig {
            enabled: true,
            provider: "console".to_string(),
            sender_email: "passes@clubs.example".to_string(),
            sender_name: "Club Passes".to_string(),
            ..EmailConfig::default()
        }
    }

    fn report_email(to: &str) -> OutgoingEmail {
        OutgoingEmail {
            to: to.to_string(),
            subject: "Pass summary - 1 events (2 passes)".to_string(),
            body_text: "Events: 1\nPasses: 2".to_string(),
            body_html: "<b>Events:</b> 1".to_string(),
            attachment: Some(Attachment {
                filename: "passes_2025-03-11.csv".to_string(),
                content_type: "text/csv".to_string(),
                bytes: b"Event,Date,Time,Location,FIO,Role\n".to_vec(),
            }),
        }
    }

    #[test]
    fn test_email_service_creation() {
        let service = EmailService::new(test_config()).unwrap();
        assert!(service.is_enabled());
        assert!(service.mailer.is_none());
    }

    #[test]
    fn test_smtp_requires_host() {
        let config = EmailConfig {
            provider: "smtp".to_string(),
            ..test_config()
        };
        assert!(matches!(
            EmailService::new(config),
            Err(ChannelError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_smtp_transport_is_built() {
        let config = EmailConfig {
            provider: "smtp".to_string(),
            smtp_host: "smtp.clubs.example".to_string(),
            smtp_username: "bot".to_string(),
            smtp_password: "secret".to_string(),
            ..test_config()
        };
        let service = EmailService::new(config).unwrap();
        assert!(service.mailer.is_some());
    }

    #[tokio::test]
    async fn test_send_console_email() {
        let service = EmailService::new(test_config()).unwrap();
        assert!(service.send(report_email("security@campus.example")).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_disabled_is_not_configured() {
        let config = EmailConfig {
            enabled: false,
            ..test_config()
        };
        let service = EmailService::new(config).unwrap();
        let result = service.send(report_email("security@campus.example")).await;
        assert!(matches!(result, Err(ChannelError::NotConfigured(_))));
    }

    #[test]
    fn test_build_message_with_attachment() {
        let service = EmailService::new(test_config()).unwrap();
        let message = service
            .build_message(&report_email("security@campus.example"))
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Pass summary - 1 events (2 passes)"));
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("passes_2025-03-11.csv"));
        assert!(raw.contains("text/csv"));
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let service = EmailService::new(test_config()).unwrap();
        let result = service.build_message(&report_email("not an address"));
        assert!(matches!(result, Err(ChannelError::InvalidMessage(_))));
    }
}
