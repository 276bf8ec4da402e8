// src/feed/messages.rs
use crate::types::Quote;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Trade event from `<symbol>@trade`. Short field names are Binance's.
#[derive(Debug, Deserialize)]
pub struct BinanceTradeEvent {
    #[serde(rename = "e")]
    pub event_type: String, // "trade"

    #[serde(rename = "E")]
    pub event_time: u64,

    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "t")]
    pub trade_id: u64,

    #[serde(rename = "p")]
    pub price: Decimal,

    #[serde(rename = "q")]
    pub quantity: Decimal,

    #[serde(rename = "T")]
    pub trade_time: u64,
}

/// Envelope used by the combined `/stream?streams=...` endpoint.
#[derive(Debug, Deserialize)]
pub struct CombinedStreamMessage<T> {
    pub stream: String,
    pub data: T,
}

impl From<BinanceTradeEvent> for Quote {
    /// Trade ids increase per symbol, unlike event times which repeat
    /// within a millisecond.
    fn from(trade: BinanceTradeEvent) -> Self {
        Quote::new(trade.symbol, trade.price, trade.trade_id)
    }
}

pub fn parse_trade_frame(text: &str) -> Result<Quote, serde_json::Error> {
    let msg: CombinedStreamMessage<BinanceTradeEvent> = serde_json::from_str(text)?;
    Ok(msg.data.into())
}
