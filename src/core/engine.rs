// src/core/engine.rs
use crate::core::quote_cache::QuoteCache;
use crate::core::registry::AlertRegistry;
use crate::error::AlertError;
use crate::storage::AlertStore;
use crate::types::{
    Alert, AlertFilter, AlertId, AlertSpec, AlertStats, AlertView, FeedEvent, Quote, SortOrder,
    TriggerEvent,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct IngestStats {
    accepted: AtomicU64,
    malformed: AtomicU64,
    triggers: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestCounters {
    pub accepted: u64,
    pub stale: u64,
    pub malformed: u64,
    pub triggers: u64,
}

#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub accepted: bool,
    pub triggered: Vec<TriggerEvent>,
}

/// Ties the quote cache, the alert registry and the trigger queue together.
///
/// Cheap to clone; all clones share state. Lock order is always registry
/// first, quotes second.
#[derive(Clone)]
pub struct AlertEngine {
    registry: Arc<RwLock<AlertRegistry>>,
    quotes: Arc<RwLock<QuoteCache>>,
    events: mpsc::UnboundedSender<TriggerEvent>,
    stats: Arc<IngestStats>,
    store: Option<Arc<AlertStore>>,
    dirty: Arc<AtomicBool>,
    worker_queue: usize,
}

impl AlertEngine {
    pub fn new(registry: AlertRegistry, events: mpsc::UnboundedSender<TriggerEvent>) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            quotes: Arc::new(RwLock::new(QuoteCache::new())),
            events,
            stats: Arc::new(IngestStats::default()),
            store: None,
            dirty: Arc::new(AtomicBool::new(false)),
            worker_queue: 256,
        }
    }

    pub fn with_store(mut self, store: AlertStore) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn with_worker_queue(mut self, capacity: usize) -> Self {
        self.worker_queue = capacity.max(1);
        self
    }

    // --- Alert management ---

    /// Creates an alert, using the latest cached price as its reference.
    pub async fn create_alert(&self, spec: AlertSpec) -> Result<Alert, AlertError> {
        let alert = {
            let mut registry = self.registry.write().await;
            let symbol = spec.symbol.trim().to_uppercase();
            let reference = self.quotes.read().await.price(&symbol);
            registry.create(spec, reference, Utc::now())?
        };
        self.persist().await;
        Ok(alert)
    }

    pub async fn delete_alert(&self, id: AlertId) -> bool {
        let removed = self.registry.write().await.delete(id);
        if removed {
            self.persist().await;
        }
        removed
    }

    pub async fn set_active(&self, id: AlertId, active: bool) -> Result<(), AlertError> {
        self.registry.write().await.set_active(id, active)?;
        self.persist().await;
        Ok(())
    }

    pub async fn get_alert(&self, id: AlertId) -> Option<Alert> {
        self.registry.read().await.get(id).cloned()
    }

    pub async fn list_alerts(&self, filter: &AlertFilter, sort: SortOrder) -> Vec<AlertView> {
        let registry = self.registry.read().await;
        let quotes = self.quotes.read().await;
        registry.list(filter, sort, &quotes)
    }

    pub async fn alert_stats(&self) -> AlertStats {
        let registry = self.registry.read().await;
        let quotes = self.quotes.read().await;
        registry.stats(&quotes)
    }

    pub async fn latest_price(&self, symbol: &str) -> Option<Decimal> {
        self.quotes.read().await.price(&symbol.trim().to_uppercase())
    }

    pub async fn watched_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .registry
            .read()
            .await
            .symbols()
            .map(str::to_string)
            .collect();
        symbols.sort();
        symbols
    }

    pub async fn counters(&self) -> IngestCounters {
        IngestCounters {
            accepted: self.stats.accepted.load(Ordering::Relaxed),
            stale: self.quotes.read().await.stale_dropped(),
            malformed: self.stats.malformed.load(Ordering::Relaxed),
            triggers: self.stats.triggers.load(Ordering::Relaxed),
        }
    }

    // --- Ingestion ---

    /// Applies one tick: cache update and alert evaluation happen under the
    /// registry lock, so two ticks can never both see an alert armed.
    pub async fn ingest(&self, quote: Quote) -> IngestOutcome {
        let Some(quote) = self.sanitize(quote) else {
            return IngestOutcome::default();
        };

        let events = {
            let mut registry = self.registry.write().await;
            if !self.quotes.write().await.update(&quote) {
                return IngestOutcome::default();
            }
            self.stats.accepted.fetch_add(1, Ordering::Relaxed);
            registry.evaluate(&quote, Utc::now())
        };

        if !events.is_empty() {
            self.stats
                .triggers
                .fetch_add(events.len() as u64, Ordering::Relaxed);
            self.dirty.store(true, Ordering::Release);
            for event in &events {
                if self.events.send(event.clone()).is_err() {
                    error!(
                        "Dispatcher queue closed, trigger {} for alert {} not delivered",
                        event.event_id, event.alert_id
                    );
                }
            }
        }

        IngestOutcome {
            accepted: true,
            triggered: events,
        }
    }

    /// Consumes the feed until it closes. Ticks are routed to one worker per
    /// symbol so each symbol is evaluated strictly in arrival order while
    /// different symbols proceed independently.
    pub async fn run(&self, mut feed: mpsc::Receiver<FeedEvent>) {
        info!("Engine loop running");
        let mut workers: HashMap<String, mpsc::Sender<Quote>> = HashMap::new();
        let mut tasks = JoinSet::new();

        while let Some(event) = feed.recv().await {
            let quote = match event {
                FeedEvent::Tick(quote) => quote,
                FeedEvent::Malformed(reason) => {
                    self.record_malformed(&reason);
                    continue;
                }
            };
            let Some(quote) = self.sanitize(quote) else {
                continue;
            };

            self.route(quote, &mut workers, &mut tasks).await;
        }

        info!("Feed closed, draining {} symbol workers", workers.len());
        drop(workers);
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("Symbol worker panicked: {}", e);
            }
        }
    }

    /// Hands the quote to its symbol's worker, replacing a worker that has
    /// stopped so later ticks for the symbol are not lost.
    async fn route(
        &self,
        quote: Quote,
        workers: &mut HashMap<String, mpsc::Sender<Quote>>,
        tasks: &mut JoinSet<()>,
    ) {
        let worker = workers
            .entry(quote.symbol.clone())
            .or_insert_with_key(|symbol| self.spawn_worker(symbol, tasks));
        let Err(mpsc::error::SendError(quote)) = worker.send(quote).await else {
            return;
        };

        warn!("Worker for {} stopped unexpectedly, restarting", quote.symbol);
        let fresh = self.spawn_worker(&quote.symbol, tasks);
        let symbol = quote.symbol.clone();
        if fresh.send(quote).await.is_err() {
            error!("Restarted worker for {} refused a tick", symbol);
        }
        workers.insert(symbol, fresh);
    }

    fn spawn_worker(&self, symbol: &str, tasks: &mut JoinSet<()>) -> mpsc::Sender<Quote> {
        let (tx, mut rx) = mpsc::channel::<Quote>(self.worker_queue);
        let engine = self.clone();
        debug!("Spawning worker for {}", symbol);
        tasks.spawn(async move {
            while let Some(quote) = rx.recv().await {
                engine.ingest(quote).await;
            }
        });
        tx
    }

    fn sanitize(&self, mut quote: Quote) -> Option<Quote> {
        quote.symbol = quote.symbol.trim().to_uppercase();
        if quote.symbol.is_empty() {
            self.record_malformed("empty symbol");
            return None;
        }
        if quote.price <= Decimal::ZERO {
            self.record_malformed(&format!("non-positive price {} for {}", quote.price, quote.symbol));
            return None;
        }
        Some(quote)
    }

    fn record_malformed(&self, reason: &str) {
        self.stats.malformed.fetch_add(1, Ordering::Relaxed);
        debug!("Dropped malformed tick: {}", reason);
    }

    // --- Persistence ---

    pub async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = self.registry.read().await.snapshot();
        if let Err(e) = store.save(&snapshot).await {
            error!("Failed to save alert state: {:#}", e);
        }
    }

    /// Saves only if a trigger changed alert state since the last flush.
    pub async fn flush_if_dirty(&self) {
        if self.dirty.swap(false, Ordering::AcqRel) {
            self.persist().await;
            debug!("💾 Alert state flushed after triggers");
        }
    }
}
