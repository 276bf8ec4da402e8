// src/notify/telegram.rs
use crate::error::DeliveryError;
use crate::notify::check_response;
use crate::notify::traits::Notifier;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

const TELEGRAM_API: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    http_client: Client,
    token: String,
    chat_id: String,
    base_url: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

impl TelegramNotifier {
    pub fn new(http_client: Client, token: String, chat_id: String) -> Self {
        Self {
            http_client,
            token,
            chat_id,
            base_url: TELEGRAM_API.to_string(),
        }
    }

    /// Points the notifier at another Bot API host (self-hosted server, test double).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn channel(&self) -> &str {
        "telegram"
    }

    async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        if self.token.is_empty() || self.chat_id.is_empty() {
            return Err(DeliveryError::Unconfigured(
                "telegram needs both a bot token and a chat id".into(),
            ));
        }
        let response = self
            .http_client
            .post(self.endpoint())
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
                disable_web_page_preview: true,
            })
            .send()
            .await?;
        check_response(response).await
    }
}
