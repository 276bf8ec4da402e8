// src/types.rs
use crate::error::AlertError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Registry-assigned alert identifier. Monotonic, so ordering by id is
/// ordering by creation within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub u64);

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Above => "above",
            Direction::Below => "below",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "above" => Ok(Direction::Above),
            "below" => Ok(Direction::Below),
            other => Err(AlertError::InvalidSpec(format!(
                "direction must be 'above' or 'below', got '{}'",
                other
            ))),
        }
    }
}

/// Where a price sits relative to an alert's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceSide {
    Below,
    At,
    Above,
}

impl PriceSide {
    pub fn of(price: Decimal, target: Decimal) -> Self {
        if price < target {
            PriceSide::Below
        } else if price > target {
            PriceSide::Above
        } else {
            PriceSide::At
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmState {
    Armed,
    /// Terminal. One-shot alerts never leave this state.
    TriggeredOneshot,
    /// Recurring alert that fired and waits for price to return to the
    /// opposite side of target.
    WaitingRearm,
}

/// Input for `AlertRegistry::create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSpec {
    pub symbol: String,
    pub target_price: Decimal,
    pub direction: Direction,
    #[serde(default)]
    pub recurring: bool,
}

impl AlertSpec {
    pub fn new(symbol: impl Into<String>, target_price: Decimal, direction: Direction) -> Self {
        Self {
            symbol: symbol.into(),
            target_price,
            direction,
            recurring: false,
        }
    }

    pub fn recurring(mut self) -> Self {
        self.recurring = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub symbol: String,
    pub target_price: Decimal,
    pub direction: Direction,
    pub is_recurring: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub arm_state: ArmState,
    /// Price observed when the alert was created. `None` until the first
    /// quote for the symbol arrives.
    pub reference_price: Option<Decimal>,
    /// Side of target seen on the last evaluation.
    pub last_side: Option<PriceSide>,
    #[serde(default)]
    pub trigger_count: u32,
}

impl Alert {
    pub fn is_terminal(&self) -> bool {
        self.arm_state == ArmState::TriggeredOneshot
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
    /// Feed sequence number or timestamp; strictly increasing per symbol.
    pub observed_at: u64,
}

impl Quote {
    pub fn new(symbol: impl Into<String>, price: Decimal, observed_at: u64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            observed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Unique per emission; lets delivery channels deduplicate retries.
    pub event_id: Uuid,
    pub alert_id: AlertId,
    pub symbol: String,
    pub target_price: Decimal,
    pub trigger_price: Decimal,
    pub direction: Direction,
    pub triggered_at: DateTime<Utc>,
    pub observed_at: u64,
}

/// What the feed adapter hands to the engine.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Tick(Quote),
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Inactive,
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    /// Case-insensitive substring of the symbol.
    pub symbol: Option<String>,
    pub status: StatusFilter,
}

impl AlertFilter {
    pub fn matches(&self, alert: &Alert) -> bool {
        let symbol_ok = match &self.symbol {
            Some(needle) => alert
                .symbol
                .to_lowercase()
                .contains(&needle.trim().to_lowercase()),
            None => true,
        };
        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::Active => alert.is_active,
            StatusFilter::Inactive => !alert.is_active,
        };
        symbol_ok && status_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    ProximityDesc,
    CreatedDesc,
    SymbolAsc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProximityBand {
    Near,
    Approaching,
    Far,
}

/// Alert joined with the latest market state, as handed to presentation code.
#[derive(Debug, Clone, Serialize)]
pub struct AlertView {
    pub alert: Alert,
    pub current_price: Option<Decimal>,
    pub proximity: Option<Decimal>,
    pub distance_pct: Option<Decimal>,
    pub band: Option<ProximityBand>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertStats {
    pub total: usize,
    pub active: usize,
    pub near_target: usize,
    pub recurring: usize,
}
