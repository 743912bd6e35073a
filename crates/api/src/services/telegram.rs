//! Telegram channel: posts the report export as a document to a chat.

use async_trait::async_trait;
use domain::services::{Attachment, DocumentSender};
use domain::ChannelError;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::config::TelegramConfig;

/// Minimal Bot API envelope.
#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse {
    pub ok: bool,
    pub description: Option<String>,
}

/// Bot API client for `sendDocument`.
#[derive(Clone)]
pub struct TelegramService {
    client: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramService {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.bot_token.is_empty()
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }
}

#[async_trait]
impl DocumentSender for TelegramService {
    async fn send_document(
        &self,
        chat_id: &str,
        document: Attachment,
        caption: &str,
    ) -> Result<(), ChannelError> {
        if !self.is_enabled() {
            return Err(ChannelError::NotConfigured(
                "Telegram delivery is disabled".to_string(),
            ));
        }

        let filename = document.filename.clone();
        let part = Part::bytes(document.bytes)
            .file_name(document.filename)
            .mime_str(&document.content_type)
            .map_err(|e| ChannelError::InvalidMessage(e.without_url().to_string()))?;

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "HTML")
            .part("document", part);

        // Errors are stripped of the URL, which embeds the bot token
        let response = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChannelError::Transport(format!("sendDocument failed: {}", e.without_url())))?;

        let status = response.status();
        let body: TelegramApiResponse = response.json().await.map_err(|e| {
            ChannelError::Transport(format!(
                "Invalid sendDocument response ({}): {}",
                status,
                e.without_url()
            ))
        })?;

        if !body.ok {
            return Err(ChannelError::Rejected(
                body.description
                    .unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }

        tracing::info!(chat_id = %chat_id, file = %filename, "Document sent to Telegram");
        Ok(())
    }
}
