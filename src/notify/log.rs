// src/notify/log.rs
use crate::error::DeliveryError;
use crate::notify::traits::Notifier;
use async_trait::async_trait;
use tracing::info;

/// Writes notifications to the log. Used when no external channel is set up.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &str {
        "log"
    }

    async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        info!(target: "notifications", "{}", text.replace('\n', " | "));
        Ok(())
    }
}
