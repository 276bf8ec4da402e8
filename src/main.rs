// src/main.rs
use anyhow::{Context, Result};
use dotenvy::dotenv;
use price_sentinel::config::AppConfig;
use price_sentinel::core::engine::AlertEngine;
use price_sentinel::core::registry::AlertRegistry;
use price_sentinel::feed::binance::BinanceFeed;
use price_sentinel::feed::traits::QuoteFeed;
use price_sentinel::logging;
use price_sentinel::notify::discord::DiscordNotifier;
use price_sentinel::notify::dispatcher::Dispatcher;
use price_sentinel::notify::log::LogNotifier;
use price_sentinel::notify::telegram::TelegramNotifier;
use price_sentinel::storage::AlertStore;
use price_sentinel::types::{AlertFilter, SortOrder, StatusFilter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // 1. Load Configuration
    let config = AppConfig::new().context("loading configuration")?;
    let _log_guard = logging::init(&config.logging)?;

    info!("========================================");
    info!("     PRICE SENTINEL - v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");

    // 2. Restore alerts
    let store = config
        .storage
        .state_file
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(AlertStore::new);
    let restored = match &store {
        Some(store) => store.load().await?,
        None => None,
    };
    let first_start = restored.is_none();
    let registry = restored
        .map(AlertRegistry::restore)
        .unwrap_or_else(AlertRegistry::new);

    // 3. Create Channels
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (feed_tx, feed_rx) = mpsc::channel(1024);

    let mut engine =
        AlertEngine::new(registry, event_tx).with_worker_queue(config.feed.worker_queue);
    if let Some(store) = store {
        engine = engine.with_store(store);
    }

    if first_start {
        for spec in config.alerts.iter().cloned() {
            if let Err(e) = engine.create_alert(spec).await {
                warn!("Skipping configured alert: {}", e);
            }
        }
    }

    // 4. Notifications
    let dispatcher = Arc::new(build_dispatcher(&config)?);
    if config.notifications.test_on_startup {
        dispatcher.test_channels().await;
    }
    tokio::spawn(dispatcher.run(event_rx));

    // 5. Subscribe to Data
    let mut symbols = engine.watched_symbols().await;
    symbols.extend(config.feed.symbols.iter().map(|s| s.trim().to_uppercase()));
    symbols.sort();
    symbols.dedup();

    if symbols.is_empty() {
        warn!("No symbols to watch: configure feed.symbols or alerts");
        drop(feed_tx);
    } else {
        info!("Watching: {}", symbols.join(", "));
        let mut feed = BinanceFeed::new(
            config.feed.ws_url.clone(),
            Duration::from_secs(config.feed.reconnect_max_secs),
        );
        feed.subscribe(&symbols, feed_tx).await?;
    }

    // 6. Housekeeping
    tokio::spawn(report_status(
        engine.clone(),
        Duration::from_secs(config.status_interval_secs.max(1)),
    ));
    tokio::spawn(flush_snapshots(
        engine.clone(),
        Duration::from_secs(config.storage.snapshot_interval_secs.max(1)),
    ));

    // 7. Run Engine
    let runner = engine.clone();
    let mut engine_task = tokio::spawn(async move { runner.run(feed_rx).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
        res = &mut engine_task => {
            if let Err(e) = res {
                error!("Fatal Engine Error: {}", e);
            }
        }
    }

    engine.flush_if_dirty().await;
    info!("Bye");
    Ok(())
}

fn build_dispatcher(config: &AppConfig) -> Result<Dispatcher> {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.dispatcher.request_timeout_secs))
        .build()?;
    let notifications = &config.notifications;
    let mut dispatcher = Dispatcher::new(config.dispatcher.retry_policy())
        .with_max_inflight(config.dispatcher.max_inflight);
    let mut configured = false;

    if let Some(webhook) = notifications.discord_webhook.as_deref().filter(|s| !s.is_empty()) {
        let url = Url::parse(webhook).context("invalid Discord webhook URL")?;
        dispatcher = dispatcher.with_notifier(Arc::new(DiscordNotifier::new(http_client.clone(), url)));
        configured = true;
    }

    let token = notifications.telegram_token.clone().unwrap_or_default();
    let chat_id = notifications.telegram_chat_id.clone().unwrap_or_default();
    if !token.is_empty() || !chat_id.is_empty() {
        if token.is_empty() || chat_id.is_empty() {
            warn!("Telegram needs both telegram_token and telegram_chat_id; deliveries will fail");
        }
        let mut telegram = TelegramNotifier::new(http_client, token, chat_id);
        if let Some(api_url) = notifications.telegram_api_url.as_deref().filter(|s| !s.is_empty()) {
            telegram = telegram.with_base_url(api_url);
        }
        dispatcher = dispatcher.with_notifier(Arc::new(telegram));
        configured = true;
    }

    if !configured {
        info!("No notification channel configured, triggers go to the log");
        dispatcher = dispatcher.with_notifier(Arc::new(LogNotifier));
    }
    Ok(dispatcher)
}

async fn report_status(engine: AlertEngine, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        interval.tick().await;
        let counters = engine.counters().await;
        let stats = engine.alert_stats().await;
        info!(
            "📊 ticks: {} accepted, {} stale, {} malformed | triggers: {} | alerts: {} total, {} active, {} near target, {} recurring",
            counters.accepted,
            counters.stale,
            counters.malformed,
            counters.triggers,
            stats.total,
            stats.active,
            stats.near_target,
            stats.recurring
        );

        let active = AlertFilter {
            status: StatusFilter::Active,
            ..Default::default()
        };
        for view in engine
            .list_alerts(&active, SortOrder::ProximityDesc)
            .await
            .iter()
            .take(5)
        {
            let proximity = view
                .proximity
                .map(|p| format!("{:.1}%", p))
                .unwrap_or_else(|| "n/a".to_string());
            let price = view
                .current_price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "waiting for data".to_string());
            info!(
                "   {} {} {} {} | price {} | proximity {}",
                view.alert.id, view.alert.symbol, view.alert.direction, view.alert.target_price, price, proximity
            );
        }
    }
}

async fn flush_snapshots(engine: AlertEngine, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        engine.flush_if_dirty().await;
    }
}
