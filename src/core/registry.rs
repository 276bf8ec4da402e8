// src/core/registry.rs
use crate::core::proximity;
use crate::core::quote_cache::QuoteCache;
use crate::core::scheduler;
use crate::error::AlertError;
use crate::types::{
    Alert, AlertFilter, AlertId, AlertSpec, AlertStats, AlertView, ArmState, PriceSide, Quote,
    SortOrder, TriggerEvent,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::info;

/// Proximity above which an active alert counts as "near target" in stats.
const NEAR_TARGET_PROXIMITY: u32 = 80;

/// Owns every alert. All mutation goes through these methods.
#[derive(Debug, Default)]
pub struct AlertRegistry {
    alerts: BTreeMap<AlertId, Alert>,
    by_symbol: HashMap<String, BTreeSet<AlertId>>,
    next_id: u64,
}

/// Serializable form of the registry, see `storage`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub next_id: u64,
    pub alerts: Vec<Alert>,
}

impl AlertRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    pub fn create(
        &mut self,
        spec: AlertSpec,
        reference_price: Option<Decimal>,
        created_at: DateTime<Utc>,
    ) -> Result<Alert, AlertError> {
        let symbol = spec.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(AlertError::InvalidSpec("symbol must not be empty".into()));
        }
        if spec.target_price <= Decimal::ZERO {
            return Err(AlertError::InvalidSpec(format!(
                "target price must be positive, got {}",
                spec.target_price
            )));
        }
        let reference_price = reference_price.filter(|p| *p > Decimal::ZERO);

        let id = AlertId(self.next_id.max(1));
        self.next_id = id.0 + 1;

        let alert = Alert {
            id,
            symbol: symbol.clone(),
            target_price: spec.target_price,
            direction: spec.direction,
            is_recurring: spec.recurring,
            is_active: true,
            created_at,
            last_triggered_at: None,
            arm_state: ArmState::Armed,
            reference_price,
            last_side: reference_price.map(|p| PriceSide::of(p, spec.target_price)),
            trigger_count: 0,
        };

        info!(
            "Alert {} created: {} {} {} (recurring: {}, reference: {:?})",
            id, symbol, alert.direction, alert.target_price, alert.is_recurring, reference_price
        );

        self.by_symbol.entry(symbol).or_default().insert(id);
        self.alerts.insert(id, alert.clone());
        Ok(alert)
    }

    /// Removes the alert. `false` if it did not exist.
    pub fn delete(&mut self, id: AlertId) -> bool {
        let Some(alert) = self.alerts.remove(&id) else {
            return false;
        };
        if let Some(ids) = self.by_symbol.get_mut(&alert.symbol) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_symbol.remove(&alert.symbol);
            }
        }
        info!("Alert {} deleted ({})", id, alert.symbol);
        true
    }

    pub fn set_active(&mut self, id: AlertId, active: bool) -> Result<(), AlertError> {
        let alert = self.alerts.get_mut(&id).ok_or(AlertError::NotFound(id))?;
        if active && alert.is_terminal() {
            return Err(AlertError::AlreadyTriggered(id));
        }
        if active && !alert.is_active {
            // side seen before the pause is stale; next quote sets a new baseline
            alert.last_side = None;
        }
        alert.is_active = active;
        info!("Alert {} {}", id, if active { "enabled" } else { "paused" });
        Ok(())
    }

    pub fn get(&self, id: AlertId) -> Option<&Alert> {
        self.alerts.get(&id)
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.by_symbol.keys().map(String::as_str)
    }

    /// Runs the trigger state machine for every alert on the quote's symbol,
    /// in id order.
    pub fn evaluate(&mut self, quote: &Quote, now: DateTime<Utc>) -> Vec<TriggerEvent> {
        let Some(ids) = self.by_symbol.get(&quote.symbol) else {
            return Vec::new();
        };
        let mut events = Vec::new();
        for id in ids {
            if let Some(alert) = self.alerts.get_mut(id) {
                if let Some(event) = scheduler::evaluate(alert, quote, now) {
                    events.push(event);
                }
            }
        }
        events
    }

    pub fn list(&self, filter: &AlertFilter, sort: SortOrder, quotes: &QuoteCache) -> Vec<AlertView> {
        let mut views: Vec<AlertView> = self
            .alerts
            .values()
            .filter(|a| filter.matches(a))
            .map(|a| view(a, quotes))
            .collect();

        views.sort_by(|a, b| {
            let primary = match sort {
                SortOrder::ProximityDesc => b.proximity.cmp(&a.proximity),
                SortOrder::CreatedDesc => b.alert.created_at.cmp(&a.alert.created_at),
                SortOrder::SymbolAsc => a.alert.symbol.cmp(&b.alert.symbol),
            };
            match primary {
                Ordering::Equal => a.alert.id.cmp(&b.alert.id),
                other => other,
            }
        });
        views
    }

    pub fn stats(&self, quotes: &QuoteCache) -> AlertStats {
        let near = Decimal::from(NEAR_TARGET_PROXIMITY);
        self.alerts.values().fold(AlertStats::default(), |mut s, a| {
            s.total += 1;
            if a.is_active {
                s.active += 1;
                let close = quotes
                    .price(&a.symbol)
                    .and_then(|p| proximity::proximity(a, p))
                    .is_some_and(|p| p > near);
                if close {
                    s.near_target += 1;
                }
            }
            if a.is_recurring {
                s.recurring += 1;
            }
            s
        })
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            next_id: self.next_id,
            alerts: self.alerts.values().cloned().collect(),
        }
    }

    pub fn restore(snapshot: RegistrySnapshot) -> Self {
        let mut registry = Self::new();
        for alert in snapshot.alerts {
            registry
                .by_symbol
                .entry(alert.symbol.clone())
                .or_default()
                .insert(alert.id);
            registry.next_id = registry.next_id.max(alert.id.0 + 1);
            registry.alerts.insert(alert.id, alert);
        }
        registry.next_id = registry.next_id.max(snapshot.next_id);
        registry
    }
}

fn view(alert: &Alert, quotes: &QuoteCache) -> AlertView {
    let current_price = quotes.price(&alert.symbol);
    let proximity = current_price.and_then(|p| proximity::proximity(alert, p));
    AlertView {
        alert: alert.clone(),
        current_price,
        proximity,
        distance_pct: current_price.and_then(|p| proximity::distance_pct(alert.target_price, p)),
        band: proximity.map(proximity::band),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, StatusFilter};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn create_validates_input() {
        let mut reg = AlertRegistry::new();
        let err = reg
            .create(AlertSpec::new("  ", dec!(1), Direction::Above), None, t0())
            .unwrap_err();
        assert!(matches!(err, AlertError::InvalidSpec(_)));

        let err = reg
            .create(AlertSpec::new("BTCUSDT", dec!(0), Direction::Above), None, t0())
            .unwrap_err();
        assert!(matches!(err, AlertError::InvalidSpec(_)));

        let err = reg
            .create(AlertSpec::new("BTCUSDT", dec!(-5), Direction::Below), None, t0())
            .unwrap_err();
        assert!(matches!(err, AlertError::InvalidSpec(_)));
        assert!(reg.is_empty());
    }

    #[test]
    fn create_normalizes_symbol_and_assigns_ids() {
        let mut reg = AlertRegistry::new();
        let a = reg
            .create(AlertSpec::new(" btcusdt ", dec!(45000), Direction::Above), Some(dec!(44000)), t0())
            .unwrap();
        let b = reg
            .create(AlertSpec::new("ethusdt", dec!(2800), Direction::Above), None, t0())
            .unwrap();
        assert_eq!(a.symbol, "BTCUSDT");
        assert!(a.id < b.id);
        assert_eq!(a.last_side, Some(PriceSide::Below));
        assert!(b.reference_price.is_none());
    }

    #[test]
    fn delete_reports_absence() {
        let mut reg = AlertRegistry::new();
        let a = reg
            .create(AlertSpec::new("BTCUSDT", dec!(45000), Direction::Above), None, t0())
            .unwrap();
        assert!(reg.delete(a.id));
        assert!(!reg.delete(a.id));
        assert!(reg.get(a.id).is_none());
        assert_eq!(reg.symbols().count(), 0);
    }

    #[test]
    fn set_active_unknown_id() {
        let mut reg = AlertRegistry::new();
        assert_eq!(
            reg.set_active(AlertId(42), false),
            Err(AlertError::NotFound(AlertId(42)))
        );
    }

    #[test]
    fn fired_one_shot_cannot_be_reenabled() {
        let mut reg = AlertRegistry::new();
        let a = reg
            .create(AlertSpec::new("BTCUSDT", dec!(45000), Direction::Above), Some(dec!(44000)), t0())
            .unwrap();
        let events = reg.evaluate(&Quote::new("BTCUSDT", dec!(45100), 1), t0());
        assert_eq!(events.len(), 1);
        assert_eq!(
            reg.set_active(a.id, true),
            Err(AlertError::AlreadyTriggered(a.id))
        );
    }

    #[test]
    fn reenabling_clears_side_baseline() {
        let mut reg = AlertRegistry::new();
        let a = reg
            .create(AlertSpec::new("BTCUSDT", dec!(45000), Direction::Above).recurring(), Some(dec!(44000)), t0())
            .unwrap();
        reg.set_active(a.id, false).unwrap();
        reg.set_active(a.id, true).unwrap();
        assert_eq!(reg.get(a.id).unwrap().last_side, None);

        // price already above target when resumed: no trigger without a cross
        assert!(reg.evaluate(&Quote::new("BTCUSDT", dec!(45500), 1), t0()).is_empty());
        assert!(reg.evaluate(&Quote::new("BTCUSDT", dec!(44900), 2), t0()).is_empty());
        assert_eq!(reg.evaluate(&Quote::new("BTCUSDT", dec!(45000), 3), t0()).len(), 1);
    }

    #[test]
    fn evaluate_only_touches_quote_symbol() {
        let mut reg = AlertRegistry::new();
        reg.create(AlertSpec::new("BTCUSDT", dec!(45000), Direction::Above), Some(dec!(44000)), t0())
            .unwrap();
        let eth = reg
            .create(AlertSpec::new("ETHUSDT", dec!(2800), Direction::Above), Some(dec!(2600)), t0())
            .unwrap();

        let events = reg.evaluate(&Quote::new("ETHUSDT", dec!(2900), 1), t0());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].alert_id, eth.id);
    }

    fn seeded() -> (AlertRegistry, QuoteCache) {
        let mut reg = AlertRegistry::new();
        let mut quotes = QuoteCache::new();
        // proximity 50
        reg.create(AlertSpec::new("SOLUSDT", dec!(100), Direction::Above), Some(dec!(80)), t0())
            .unwrap();
        // proximity 90
        reg.create(AlertSpec::new("BTCUSDT", dec!(45000), Direction::Above), Some(dec!(44000)), t0() + Duration::days(1))
            .unwrap();
        // proximity 50, later id than SOLUSDT
        let ada = reg
            .create(AlertSpec::new("ADAUSDT", dec!(0.40), Direction::Below), Some(dec!(0.60)), t0() + Duration::days(2))
            .unwrap();
        // no quote, no proximity
        reg.create(AlertSpec::new("DOTUSDT", dec!(6.5), Direction::Below).recurring(), None, t0() + Duration::days(3))
            .unwrap();
        reg.set_active(ada.id, false).unwrap();

        quotes.update(&Quote::new("SOLUSDT", dec!(90), 1));
        quotes.update(&Quote::new("BTCUSDT", dec!(44900), 1));
        quotes.update(&Quote::new("ADAUSDT", dec!(0.50), 1));
        (reg, quotes)
    }

    #[test]
    fn list_by_proximity_breaks_ties_by_id() {
        let (reg, quotes) = seeded();
        let symbols: Vec<_> = reg
            .list(&AlertFilter::default(), SortOrder::ProximityDesc, &quotes)
            .into_iter()
            .map(|v| v.alert.symbol)
            .collect();
        assert_eq!(symbols, vec!["BTCUSDT", "SOLUSDT", "ADAUSDT", "DOTUSDT"]);
    }

    #[test]
    fn list_by_created_and_symbol() {
        let (reg, quotes) = seeded();
        let created: Vec<_> = reg
            .list(&AlertFilter::default(), SortOrder::CreatedDesc, &quotes)
            .into_iter()
            .map(|v| v.alert.symbol)
            .collect();
        assert_eq!(created, vec!["DOTUSDT", "ADAUSDT", "BTCUSDT", "SOLUSDT"]);

        let by_symbol: Vec<_> = reg
            .list(&AlertFilter::default(), SortOrder::SymbolAsc, &quotes)
            .into_iter()
            .map(|v| v.alert.symbol)
            .collect();
        assert_eq!(by_symbol, vec!["ADAUSDT", "BTCUSDT", "DOTUSDT", "SOLUSDT"]);
    }

    #[test]
    fn list_filters_by_symbol_and_status() {
        let (reg, quotes) = seeded();
        let filter = AlertFilter {
            symbol: Some("usdt".into()),
            status: StatusFilter::Inactive,
        };
        let views = reg.list(&filter, SortOrder::SymbolAsc, &quotes);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].alert.symbol, "ADAUSDT");

        let filter = AlertFilter {
            symbol: Some("bt".into()),
            status: StatusFilter::Active,
        };
        let views = reg.list(&filter, SortOrder::SymbolAsc, &quotes);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].proximity, Some(dec!(90)));
        assert_eq!(views[0].current_price, Some(dec!(44900)));
    }

    #[test]
    fn stats_count_active_near_and_recurring() {
        let (reg, quotes) = seeded();
        let stats = reg.stats(&quotes);
        assert_eq!(
            stats,
            AlertStats {
                total: 4,
                active: 3,
                near_target: 1,
                recurring: 1,
            }
        );
    }

    #[test]
    fn snapshot_restore_keeps_id_sequence() {
        let (reg, _) = seeded();
        let mut restored = AlertRegistry::restore(reg.snapshot());
        assert_eq!(restored.len(), 4);
        let next = restored
            .create(AlertSpec::new("LINKUSDT", dec!(20), Direction::Above), None, t0())
            .unwrap();
        assert_eq!(next.id, AlertId(5));
    }
}
