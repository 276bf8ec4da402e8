// src/notify/dispatcher.rs
use crate::error::DeliveryError;
use crate::notify::traits::{format_trigger, Notifier};
use crate::types::{AlertId, TriggerEvent};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_INFLIGHT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): base, 2x base, 4x base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ChannelOutcome {
    pub channel: String,
    pub attempts: u32,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub event_id: Uuid,
    pub alert_id: AlertId,
    pub outcomes: Vec<ChannelOutcome>,
}

impl DeliveryResult {
    pub fn all_delivered(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status == DeliveryStatus::Delivered)
    }
}

/// Fans trigger events out to every configured channel. Failures are retried
/// here and never reported back to the engine.
pub struct Dispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
    policy: RetryPolicy,
    delivery_slots: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            notifiers: Vec::new(),
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
            delivery_slots: Arc::new(Semaphore::new(DEFAULT_MAX_INFLIGHT)),
        }
    }

    /// Caps how many events are delivered at once. Events past the cap stay
    /// in the queue until a delivery finishes.
    pub fn with_max_inflight(mut self, max_inflight: usize) -> Self {
        self.delivery_slots = Arc::new(Semaphore::new(max_inflight.max(1)));
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn channels(&self) -> Vec<String> {
        self.notifiers.iter().map(|n| n.channel().to_string()).collect()
    }

    pub async fn dispatch(&self, event: &TriggerEvent) -> DeliveryResult {
        let text = format_trigger(event);
        let outcomes = join_all(
            self.notifiers
                .iter()
                .map(|n| deliver(n.as_ref(), &text, self.policy)),
        )
        .await;

        DeliveryResult {
            event_id: event.event_id,
            alert_id: event.alert_id,
            outcomes,
        }
    }

    /// Sends a test message on every channel.
    pub async fn test_channels(&self) -> Vec<(String, Result<(), DeliveryError>)> {
        join_all(self.notifiers.iter().map(|n| async move {
            let result = n.test_connection().await;
            match &result {
                Ok(()) => info!("✅ Channel {} test message sent", n.channel()),
                Err(e) => warn!("⚠️ Channel {} test failed: {}", n.channel(), e),
            }
            (n.channel().to_string(), result)
        }))
        .await
    }

    /// Consumes trigger events until the queue closes. Each event is delivered
    /// on its own task so a slow channel never holds up later events, up to
    /// the in-flight cap.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<TriggerEvent>) {
        info!("Dispatcher running with channels {:?}", self.channels());
        let mut inflight: JoinSet<DeliveryResult> = JoinSet::new();

        loop {
            tokio::select! {
                next = events.recv() => match next {
                    Some(event) => {
                        let permit = match Arc::clone(&self.delivery_slots).acquire_owned().await {
                            Ok(permit) => permit,
                            Err(e) => {
                                error!("Delivery slots closed, dropping trigger {}: {}", event.event_id, e);
                                continue;
                            }
                        };
                        let dispatcher = Arc::clone(&self);
                        inflight.spawn(async move {
                            let _permit = permit;
                            dispatcher.dispatch(&event).await
                        });
                    }
                    None => break,
                },
                Some(done) = inflight.join_next(), if !inflight.is_empty() => {
                    report(done);
                }
            }
        }

        while let Some(done) = inflight.join_next().await {
            report(done);
        }
        info!("Dispatcher stopped");
    }
}

fn report(done: Result<DeliveryResult, tokio::task::JoinError>) {
    match done {
        Ok(result) if result.all_delivered() => {
            debug!("Trigger {} delivered", result.event_id)
        }
        Ok(result) => warn!(
            "Trigger {} for alert {} not delivered on every channel: {:?}",
            result.event_id, result.alert_id, result.outcomes
        ),
        Err(e) => error!("Delivery task panicked: {}", e),
    }
}

async fn deliver(notifier: &dyn Notifier, text: &str, policy: RetryPolicy) -> ChannelOutcome {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match notifier.send(text).await {
            Ok(()) => {
                debug!("Delivered to {} on attempt {}", notifier.channel(), attempt);
                return ChannelOutcome {
                    channel: notifier.channel().to_string(),
                    attempts: attempt,
                    status: DeliveryStatus::Delivered,
                };
            }
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "Delivery to {} failed (attempt {}/{}): {}. Retrying in {:?}",
                    notifier.channel(),
                    attempt,
                    policy.max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(
                    "❌ Delivery to {} gave up after {} attempt(s): {}",
                    notifier.channel(),
                    attempt,
                    e
                );
                return ChannelOutcome {
                    channel: notifier.channel().to_string(),
                    attempts: attempt,
                    status: DeliveryStatus::Failed(e.to_string()),
                };
            }
        }
    }
}
