// src/notify/discord.rs
use crate::error::DeliveryError;
use crate::notify::check_response;
use crate::notify::traits::Notifier;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use url::Url;

pub struct DiscordNotifier {
    http_client: Client,
    webhook_url: Url,
}

impl DiscordNotifier {
    pub fn new(http_client: Client, webhook_url: Url) -> Self {
        Self {
            http_client,
            webhook_url,
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn channel(&self) -> &str {
        "discord"
    }

    async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        let response = self
            .http_client
            .post(self.webhook_url.clone())
            .json(&json!({ "content": text }))
            .send()
            .await?;
        check_response(response).await
    }
}
