// src/core/quote_cache.rs
use crate::types::Quote;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

/// Latest accepted quote per symbol.
#[derive(Debug, Default)]
pub struct QuoteCache {
    quotes: HashMap<String, Quote>,
    stale_dropped: u64,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the quote unless the cached one for the same symbol is at least
    /// as recent. Returns whether the quote was accepted.
    pub fn update(&mut self, quote: &Quote) -> bool {
        if let Some(cached) = self.quotes.get(&quote.symbol) {
            if quote.observed_at <= cached.observed_at {
                self.stale_dropped += 1;
                debug!(
                    "Stale tick dropped for {}: observed_at {} <= cached {}",
                    quote.symbol, quote.observed_at, cached.observed_at
                );
                return false;
            }
        }
        self.quotes.insert(quote.symbol.clone(), quote.clone());
        true
    }

    pub fn get(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol)
    }

    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.quotes.get(symbol).map(|q| q.price)
    }

    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}
