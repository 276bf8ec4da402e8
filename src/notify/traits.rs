// src/notify/traits.rs
use crate::error::DeliveryError;
use crate::types::{Direction, TriggerEvent};
use async_trait::async_trait;

/// A delivery channel for trigger notifications (Discord, Telegram, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &str;

    async fn send(&self, text: &str) -> Result<(), DeliveryError>;

    /// Sends a harmless message to confirm the channel's credentials work.
    async fn test_connection(&self) -> Result<(), DeliveryError> {
        self.send("✅ price_sentinel: test notification, channel is configured correctly")
            .await
    }
}

pub fn format_trigger(event: &TriggerEvent) -> String {
    let arrow = match event.direction {
        Direction::Above => "📈",
        Direction::Below => "📉",
    };
    format!(
        "{} {} crossed {} {}\nPrice: {}\nAlert {} at {}",
        arrow,
        event.symbol,
        event.direction,
        event.target_price,
        event.trigger_price,
        event.alert_id,
        event.triggered_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}
