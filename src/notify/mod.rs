// src/notify/mod.rs
pub mod discord;
pub mod dispatcher;
pub mod log;
pub mod telegram;
pub mod traits;

use crate::error::DeliveryError;

/// Maps a non-2xx webhook/bot response to `DeliveryError::Rejected`.
pub(crate) async fn check_response(response: reqwest::Response) -> Result<(), DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(DeliveryError::Rejected {
        status: status.as_u16(),
        body,
    })
}
