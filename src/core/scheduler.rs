// src/core/scheduler.rs
//! Per-alert trigger state machine.
//!
//! ```text
//! Armed --cross--> TriggeredOneshot            (one-shot, terminal, deactivated)
//! Armed --cross--> WaitingRearm --back across--> Armed   (recurring)
//! ```
//!
//! A cross needs the side of target seen on the previous evaluation: an
//! `Above` alert fires only when the last price was strictly below target and
//! the new one is at or above it.

use crate::types::{Alert, ArmState, Direction, PriceSide, Quote, TriggerEvent};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

/// Advances `alert` with a quote for its symbol. Returns the trigger event if
/// this quote fired the alert.
pub fn evaluate(alert: &mut Alert, quote: &Quote, now: DateTime<Utc>) -> Option<TriggerEvent> {
    if !alert.is_active || alert.is_terminal() {
        return None;
    }

    let price = quote.price;
    let side = PriceSide::of(price, alert.target_price);
    let previous = alert.last_side.replace(side);

    if alert.reference_price.is_none() {
        debug!("Alert {}: baseline price set at {}", alert.id, price);
        alert.reference_price = Some(price);
        return None;
    }

    match alert.arm_state {
        ArmState::Armed => {
            let crossed = match (alert.direction, previous) {
                (Direction::Above, Some(PriceSide::Below)) => side != PriceSide::Below,
                (Direction::Below, Some(PriceSide::Above)) => side != PriceSide::Above,
                _ => false,
            };
            if crossed {
                return Some(fire(alert, quote, now));
            }
        }
        ArmState::WaitingRearm => {
            let back_across = match alert.direction {
                Direction::Above => side == PriceSide::Below,
                Direction::Below => side == PriceSide::Above,
            };
            if back_across {
                debug!("Alert {} re-armed at {}", alert.id, price);
                alert.arm_state = ArmState::Armed;
            }
        }
        ArmState::TriggeredOneshot => {}
    }

    None
}

fn fire(alert: &mut Alert, quote: &Quote, now: DateTime<Utc>) -> TriggerEvent {
    alert.last_triggered_at = Some(now);
    alert.trigger_count += 1;

    if alert.is_recurring {
        alert.arm_state = ArmState::WaitingRearm;
    } else {
        alert.arm_state = ArmState::TriggeredOneshot;
        alert.is_active = false;
    }

    info!(
        "🎯 Alert {} fired: {} {} {} (price {})",
        alert.id, alert.symbol, alert.direction, alert.target_price, quote.price
    );

    TriggerEvent {
        event_id: Uuid::new_v4(),
        alert_id: alert.id,
        symbol: alert.symbol.clone(),
        target_price: alert.target_price,
        trigger_price: quote.price,
        direction: alert.direction,
        triggered_at: now,
        observed_at: quote.observed_at,
    }
}
