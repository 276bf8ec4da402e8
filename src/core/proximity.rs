// src/core/proximity.rs
//! How close an alert is to firing, as a 0..=100 score.
//!
//! The score is measured against the span between the target and the
//! reference price captured when the alert was created, so it grows
//! monotonically while the price walks toward the target and does not depend
//! on the instrument's price scale.

use crate::types::{Alert, Direction, ProximityBand};
use rust_decimal::Decimal;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Proximity of `current_price` to the alert's target. `None` while the
/// alert has no reference price yet.
pub fn proximity(alert: &Alert, current_price: Decimal) -> Option<Decimal> {
    let reference = alert.reference_price?;
    Some(proximity_between(
        alert.target_price,
        reference,
        current_price,
        alert.direction,
    ))
}

pub fn proximity_between(
    target: Decimal,
    reference: Decimal,
    current: Decimal,
    direction: Direction,
) -> Decimal {
    let on_trigger_side = match direction {
        Direction::Above => current >= target,
        Direction::Below => current <= target,
    };
    if on_trigger_side {
        return HUNDRED;
    }

    let span = (target - reference).abs();
    if span.is_zero() {
        return HUNDRED;
    }

    let distance = (target - current).abs();
    match distance.checked_div(span) {
        // at or beyond the reference distance; also keeps the multiply in range
        Some(ratio) if ratio >= Decimal::ONE => Decimal::ZERO,
        Some(ratio) => (HUNDRED * (Decimal::ONE - ratio)).clamp(Decimal::ZERO, HUNDRED),
        // ratio too large to represent: as far as it gets
        None => Decimal::ZERO,
    }
}

/// `|target - current| / current` as a percentage.
pub fn distance_pct(target: Decimal, current: Decimal) -> Option<Decimal> {
    if current <= Decimal::ZERO {
        return None;
    }
    (target - current)
        .abs()
        .checked_div(current)
        .and_then(|r| r.checked_mul(HUNDRED))
}

pub fn band(proximity: Decimal) -> ProximityBand {
    if proximity >= Decimal::from(90) {
        ProximityBand::Near
    } else if proximity >= Decimal::from(70) {
        ProximityBand::Approaching
    } else {
        ProximityBand::Far
    }
}
