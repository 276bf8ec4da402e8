// src/feed/traits.rs
use crate::types::FeedEvent;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait QuoteFeed: Send + Sync {
    /// Starts streaming ticks for `symbols` into `sender`. Returns once the
    /// background task is running.
    async fn subscribe(&mut self, symbols: &[String], sender: mpsc::Sender<FeedEvent>) -> Result<()>;
}
