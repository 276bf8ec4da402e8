// src/feed/binance.rs
use crate::feed::messages::parse_trade_frame;
use crate::feed::traits::QuoteFeed;
use crate::types::FeedEvent;
use anyhow::{bail, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};
use url::Url;

pub const DEFAULT_WS_URL: &str = "wss://stream.binance.com:9443";

/// Public trade stream for many symbols over one combined connection.
pub struct BinanceFeed {
    ws_base: String,
    reconnect_max: Duration,
}

impl BinanceFeed {
    pub fn new(ws_base: impl Into<String>, reconnect_max: Duration) -> Self {
        Self {
            ws_base: ws_base.into(),
            reconnect_max,
        }
    }

    pub fn stream_url(&self, symbols: &[String]) -> Result<Url> {
        let streams = symbols
            .iter()
            .map(|s| format!("{}@trade", s.trim().to_lowercase()))
            .collect::<Vec<_>>()
            .join("/");
        let url = Url::parse(&format!(
            "{}/stream?streams={}",
            self.ws_base.trim_end_matches('/'),
            streams
        ))?;
        Ok(url)
    }
}

#[async_trait]
impl QuoteFeed for BinanceFeed {
    async fn subscribe(&mut self, symbols: &[String], sender: mpsc::Sender<FeedEvent>) -> Result<()> {
        if symbols.is_empty() {
            bail!("no symbols to subscribe to");
        }
        let url = self.stream_url(symbols)?;
        info!("Starting WebSocket task for {} symbols", symbols.len());

        let reconnect_max = self.reconnect_max;
        tokio::spawn(async move {
            stream_trades(url, sender, reconnect_max).await;
            info!("WebSocket task finished");
        });
        Ok(())
    }
}

async fn stream_trades(url: Url, sender: mpsc::Sender<FeedEvent>, reconnect_max: Duration) {
    let mut retry_delay = Duration::from_secs(1);

    loop {
        match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                info!("WebSocket connected: {}", url);
                retry_delay = Duration::from_secs(1);
                let (_, mut read) = ws_stream.split();

                while let Some(message) = read.next().await {
                    let event = match message {
                        Ok(Message::Text(text)) => match parse_trade_frame(&text) {
                            Ok(quote) => FeedEvent::Tick(quote),
                            Err(e) => FeedEvent::Malformed(format!("{}: {}", e, text)),
                        },
                        Ok(Message::Close(frame)) => {
                            warn!("WebSocket closed by server: {:?}", frame);
                            break;
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            error!("WebSocket error: {}", e);
                            break;
                        }
                    };
                    if sender.send(event).await.is_err() {
                        info!("Engine stopped listening, closing feed");
                        return;
                    }
                }
            }
            Err(e) => error!("Failed to connect WebSocket {}: {}", url, e),
        }

        if sender.is_closed() {
            return;
        }
        warn!("Reconnecting in {}s", retry_delay.as_secs());
        tokio::time::sleep(retry_delay).await;
        retry_delay = (retry_delay * 2).min(reconnect_max);
    }
}
