// End-to-end checks of the alert engine: feed -> cache -> triggers -> queue.

use price_sentinel::core::engine::AlertEngine;
use price_sentinel::core::registry::AlertRegistry;
use price_sentinel::error::AlertError;
use price_sentinel::types::{
    AlertFilter, AlertSpec, Direction, FeedEvent, Quote, SortOrder, TriggerEvent,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

fn engine() -> (AlertEngine, mpsc::UnboundedReceiver<TriggerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AlertEngine::new(AlertRegistry::new(), tx), rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<TriggerEvent>) -> Vec<TriggerEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

async fn feed_prices(engine: &AlertEngine, symbol: &str, start_seq: u64, prices: &[Decimal]) {
    for (i, price) in prices.iter().enumerate() {
        engine
            .ingest(Quote::new(symbol, *price, start_seq + i as u64))
            .await;
    }
}

#[tokio::test]
async fn one_shot_above_fires_exactly_once() {
    let (engine, mut rx) = engine();
    engine.ingest(Quote::new("BTCUSDT", dec!(44000), 1)).await;
    let alert = engine
        .create_alert(AlertSpec::new("BTCUSDT", dec!(45000), Direction::Above))
        .await
        .unwrap();

    feed_prices(&engine, "BTCUSDT", 2, &[dec!(44200), dec!(44800), dec!(45000)]).await;
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].trigger_price, dec!(45000));
    assert_eq!(events[0].alert_id, alert.id);

    let stored = engine.get_alert(alert.id).await.unwrap();
    assert!(!stored.is_active);
    assert!(stored.last_triggered_at.is_some());

    feed_prices(&engine, "BTCUSDT", 10, &[dec!(45500)]).await;
    assert!(drain(&mut rx).is_empty());

    assert_eq!(
        engine.set_active(alert.id, true).await,
        Err(AlertError::AlreadyTriggered(alert.id))
    );
}

#[tokio::test]
async fn recurring_below_fires_twice_with_rearm() {
    let (engine, mut rx) = engine();
    engine.ingest(Quote::new("SOLUSDT", dec!(120), 1)).await;
    engine
        .create_alert(AlertSpec::new("SOLUSDT", dec!(100), Direction::Below).recurring())
        .await
        .unwrap();

    feed_prices(&engine, "SOLUSDT", 2, &[dec!(110), dec!(95), dec!(105), dec!(98)]).await;
    let prices: Vec<_> = drain(&mut rx).into_iter().map(|e| e.trigger_price).collect();
    assert_eq!(prices, vec![dec!(95), dec!(98)]);
}

#[tokio::test]
async fn out_of_order_tick_is_rejected() {
    let (engine, _rx) = engine();
    assert!(engine.ingest(Quote::new("BTCUSDT", dec!(44750), 5)).await.accepted);

    let outcome = engine.ingest(Quote::new("BTCUSDT", dec!(44700), 3)).await;
    assert!(!outcome.accepted);
    assert_eq!(engine.latest_price("BTCUSDT").await, Some(dec!(44750)));
    assert_eq!(engine.counters().await.stale, 1);
}

#[tokio::test]
async fn stale_tick_cannot_trigger() {
    let (engine, mut rx) = engine();
    engine.ingest(Quote::new("BTCUSDT", dec!(44000), 10)).await;
    engine
        .create_alert(AlertSpec::new("BTCUSDT", dec!(45000), Direction::Above))
        .await
        .unwrap();

    engine.ingest(Quote::new("BTCUSDT", dec!(46000), 9)).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn deleted_alert_never_fires() {
    let (engine, mut rx) = engine();
    engine.ingest(Quote::new("ETHUSDT", dec!(2650), 1)).await;
    let alert = engine
        .create_alert(AlertSpec::new("ETHUSDT", dec!(2800), Direction::Above).recurring())
        .await
        .unwrap();

    feed_prices(&engine, "ETHUSDT", 2, &[dec!(2700), dec!(2750)]).await;
    assert!(engine.delete_alert(alert.id).await);
    assert!(!engine.delete_alert(alert.id).await);

    feed_prices(&engine, "ETHUSDT", 4, &[dec!(2900), dec!(2600), dec!(2950)]).await;
    assert!(drain(&mut rx).is_empty());
    assert!(engine.get_alert(alert.id).await.is_none());
}

#[tokio::test]
async fn paused_alert_is_skipped() {
    let (engine, mut rx) = engine();
    engine.ingest(Quote::new("ADAUSDT", dec!(0.52), 1)).await;
    let alert = engine
        .create_alert(AlertSpec::new("ADAUSDT", dec!(0.45), Direction::Below))
        .await
        .unwrap();

    engine.set_active(alert.id, false).await.unwrap();
    feed_prices(&engine, "ADAUSDT", 2, &[dec!(0.44)]).await;
    assert!(drain(&mut rx).is_empty());
    assert!(engine.get_alert(alert.id).await.unwrap().trigger_count == 0);
}

#[tokio::test]
async fn invalid_specs_are_rejected() {
    let (engine, _rx) = engine();
    let err = engine
        .create_alert(AlertSpec::new("", dec!(10), Direction::Above))
        .await
        .unwrap_err();
    assert!(matches!(err, AlertError::InvalidSpec(_)));

    assert!(matches!(
        "sideways".parse::<Direction>(),
        Err(AlertError::InvalidSpec(_))
    ));
}

#[tokio::test]
async fn proximity_sort_is_deterministic() {
    let (engine, _rx) = engine();
    engine.ingest(Quote::new("BTCUSDT", dec!(44000), 1)).await;
    engine.ingest(Quote::new("ETHUSDT", dec!(2600), 1)).await;

    // identical geometry: both start at proximity 0
    let first = engine
        .create_alert(AlertSpec::new("ETHUSDT", dec!(2800), Direction::Above))
        .await
        .unwrap();
    let second = engine
        .create_alert(AlertSpec::new("BTCUSDT", dec!(45000), Direction::Above))
        .await
        .unwrap();

    for _ in 0..3 {
        let ids: Vec<_> = engine
            .list_alerts(&AlertFilter::default(), SortOrder::ProximityDesc)
            .await
            .into_iter()
            .map(|v| v.alert.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    engine.ingest(Quote::new("BTCUSDT", dec!(44900), 2)).await;
    let views = engine
        .list_alerts(&AlertFilter::default(), SortOrder::ProximityDesc)
        .await;
    assert_eq!(views[0].alert.id, second.id);
    assert_eq!(views[0].proximity, Some(dec!(90)));
}

#[tokio::test]
async fn feed_routing_keeps_per_symbol_order() {
    let (engine, mut rx) = engine();
    engine.ingest(Quote::new("BTCUSDT", dec!(44000), 1)).await;
    engine.ingest(Quote::new("DOTUSDT", dec!(7.2), 1)).await;
    engine
        .create_alert(AlertSpec::new("BTCUSDT", dec!(45000), Direction::Above).recurring())
        .await
        .unwrap();
    engine
        .create_alert(AlertSpec::new("DOTUSDT", dec!(6.5), Direction::Below).recurring())
        .await
        .unwrap();

    let (feed_tx, feed_rx) = mpsc::channel(64);
    let runner = engine.clone();
    let handle = tokio::spawn(async move { runner.run(feed_rx).await });

    let btc = [dec!(44500), dec!(45100), dec!(44900), dec!(45200)];
    let dot = [dec!(6.9), dec!(6.4), dec!(6.6), dec!(6.3)];
    for i in 0..4 {
        let seq = i as u64 + 2;
        feed_tx
            .send(FeedEvent::Tick(Quote::new("btcusdt", btc[i], seq)))
            .await
            .unwrap();
        feed_tx
            .send(FeedEvent::Tick(Quote::new("DOTUSDT", dot[i], seq)))
            .await
            .unwrap();
    }
    feed_tx
        .send(FeedEvent::Malformed("garbage frame".into()))
        .await
        .unwrap();
    drop(feed_tx);
    handle.await.unwrap();

    let events = drain(&mut rx);
    let btc_hits = events.iter().filter(|e| e.symbol == "BTCUSDT").count();
    let dot_hits = events.iter().filter(|e| e.symbol == "DOTUSDT").count();
    assert_eq!(btc_hits, 2);
    assert_eq!(dot_hits, 2);

    let counters = engine.counters().await;
    assert_eq!(counters.malformed, 1);
    assert_eq!(counters.triggers, 4);
    assert_eq!(engine.latest_price("BTCUSDT").await, Some(dec!(45200)));
}

#[tokio::test]
async fn concurrent_ticks_fire_once() {
    let (engine, mut rx) = engine();
    engine.ingest(Quote::new("BTCUSDT", dec!(44000), 1)).await;
    engine
        .create_alert(AlertSpec::new("BTCUSDT", dec!(45000), Direction::Above))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for seq in 2..50u64 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .ingest(Quote::new("BTCUSDT", dec!(45000) + Decimal::from(seq), seq))
                .await
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(drain(&mut rx).len(), 1);
}
