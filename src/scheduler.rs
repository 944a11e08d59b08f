use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, FixedOffset, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::{watch, Mutex, OnceCell};
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::error::{ServiceError, ServiceResult};
use crate::evaluator;
use crate::models::{AlertRule, Observation, Subscription, TriggeredAlert};
use crate::policy::{self, Admission};
use crate::registry::SubscriptionRegistry;
use crate::weather::ObservationProvider;

/// Outcome of one scheduler pass over the due subscriptions.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub processed: usize,
    pub alerts_sent: usize,
    pub errors: Vec<SubscriptionError>,
}

#[derive(Debug)]
pub struct SubscriptionError {
    pub subscription_id: Uuid,
    pub error: String,
}

enum ProcessOutcome {
    Done(usize),
    Skipped,
    Failed(String),
}

type ObservationCache = Mutex<HashMap<String, Arc<OnceCell<Observation>>>>;

/// Periodic driver of the alert pipeline: pulls due subscriptions,
/// evaluates the rule catalog against a per-run observation cache, applies
/// the dispatch policy and fans admitted alerts out through the
/// dispatcher. Explicitly startable and stoppable so it can be owned and
/// tested like any other component.
pub struct AlertScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    registry: SubscriptionRegistry,
    dispatcher: NotificationDispatcher,
    provider: Arc<dyn ObservationProvider>,
    check_interval: Duration,
    batch_limit: i64,
    worker_count: usize,
    call_timeout: Duration,
    cooldown: ChronoDuration,
    local_offset: FixedOffset,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl AlertScheduler {
    pub fn new(
        config: &AppConfig,
        registry: SubscriptionRegistry,
        dispatcher: NotificationDispatcher,
        provider: Arc<dyn ObservationProvider>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        AlertScheduler {
            inner: Arc::new(SchedulerInner {
                registry,
                dispatcher,
                provider,
                check_interval: Duration::from_secs(config.check_interval_minutes * 60),
                batch_limit: config.batch_limit,
                worker_count: config.worker_count.max(1),
                call_timeout: Duration::from_secs(config.call_timeout_secs),
                cooldown: ChronoDuration::hours(config.alert_cooldown_hours),
                local_offset: config.local_offset,
                running: AtomicBool::new(false),
                shutdown,
            }),
        }
    }

    /// Starts the recurring check loop. The first run fires immediately;
    /// subsequent runs follow the configured interval. A second call while
    /// running is a no-op.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            info!("Alert scheduler already running");
            return;
        }
        self.inner.shutdown.send_replace(false);

        let inner = self.inner.clone();
        let mut shutdown_rx = self.inner.shutdown.subscribe();
        info!(
            "Starting alert scheduler with {} minute interval",
            self.inner.check_interval.as_secs() / 60
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.check_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let summary = run_batch(&inner).await;
                        info!(
                            "Alert check completed: processed={}, alerts={}, errors={}",
                            summary.processed,
                            summary.alerts_sent,
                            summary.errors.len()
                        );
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            inner.running.store(false, Ordering::SeqCst);
            info!("Alert scheduler stopped");
        });
    }

    /// Requests cooperative shutdown; an in-flight batch finishes the
    /// subscriptions it has started and skips the rest.
    pub fn stop(&self) {
        self.inner.shutdown.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// One scheduler pass, independent of the timer. Also the admin
    /// "trigger batch now" entry point.
    pub async fn run_once(&self) -> RunSummary {
        run_batch(&self.inner).await
    }

    /// Dry preview for a point: fetches (or falls back) an observation and
    /// evaluates the rule catalog. Writes nothing: no history, no
    /// bookkeeping, no channel sends. Provider failure or timeout degrades
    /// to the fallback observation, which triggers no seeded rule.
    pub async fn check_now(&self, lat: f64, lon: f64) -> ServiceResult<Vec<TriggeredAlert>> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(ServiceError::Validation(format!(
                "invalid coordinates: ({lat}, {lon})"
            )));
        }
        let rules = timeout(self.inner.call_timeout, self.inner.registry.active_rules())
            .await
            .map_err(|_| ServiceError::Timeout)??;
        let observation = match timeout(
            self.inner.call_timeout,
            self.inner.provider.fetch_or_default(lat, lon),
        )
        .await
        {
            Ok(observation) => observation,
            Err(_) => Observation::fallback(),
        };
        Ok(evaluator::evaluate(&observation, &rules))
    }
}

/// Runs a fallible await under the per-call deadline, folding both error
/// shapes into one message so a hung connection counts as a subscription
/// error instead of stalling a worker slot.
async fn bounded<T>(
    limit: Duration,
    label: &str,
    fut: impl Future<Output = ServiceResult<T>>,
) -> Result<T, String> {
    match timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{label} failed: {e}")),
        Err(_) => Err(format!("{label} timed out")),
    }
}

async fn run_batch(inner: &SchedulerInner) -> RunSummary {
    let mut summary = RunSummary::default();

    let rules = match bounded(
        inner.call_timeout,
        "rule catalog load",
        inner.registry.active_rules(),
    )
    .await
    {
        Ok(rules) => rules,
        Err(e) => {
            error!("Skipping run: {e}");
            summary.errors.push(SubscriptionError {
                subscription_id: Uuid::nil(),
                error: e,
            });
            return summary;
        }
    };

    let due_interval = ChronoDuration::from_std(inner.check_interval)
        .unwrap_or_else(|_| ChronoDuration::minutes(30));
    let due = match bounded(
        inner.call_timeout,
        "due query",
        inner.registry.find_due(due_interval, inner.batch_limit),
    )
    .await
    {
        Ok(due) => due,
        Err(e) => {
            error!("Skipping run: {e}");
            summary.errors.push(SubscriptionError {
                subscription_id: Uuid::nil(),
                error: e,
            });
            return summary;
        }
    };

    if due.is_empty() {
        return summary;
    }

    // Shared within the run only: one observation cell per unique location,
    // and per-user admitted counts so the daily cap holds across
    // co-scheduled subscriptions of the same user.
    let observation_cache: ObservationCache = Mutex::new(HashMap::new());
    let batch_sent: Mutex<HashMap<Uuid, i64>> = Mutex::new(HashMap::new());
    let shutdown_rx = inner.shutdown.subscribe();

    let outcomes: Vec<(Uuid, ProcessOutcome)> = stream::iter(due)
        .map(|subscription| {
            let shutdown_rx = shutdown_rx.clone();
            let rules = &rules;
            let observation_cache = &observation_cache;
            let batch_sent = &batch_sent;
            async move {
                let id = subscription.id;
                if *shutdown_rx.borrow() {
                    return (id, ProcessOutcome::Skipped);
                }
                let outcome =
                    process_subscription(inner, subscription, rules, observation_cache, batch_sent)
                        .await;
                // Stamped unconditionally so a persistently failing
                // subscription cannot starve the rest of the queue.
                if let Err(e) = bounded(
                    inner.call_timeout,
                    "last_checked stamp",
                    inner.registry.touch_last_checked(id),
                )
                .await
                {
                    warn!("Subscription {id}: {e}");
                }
                (id, outcome)
            }
        })
        .buffer_unordered(inner.worker_count)
        .collect()
        .await;

    for (subscription_id, outcome) in outcomes {
        match outcome {
            ProcessOutcome::Done(sent) => {
                summary.processed += 1;
                summary.alerts_sent += sent;
            }
            ProcessOutcome::Skipped => {}
            ProcessOutcome::Failed(error) => {
                error!("Error processing subscription {subscription_id}: {error}");
                summary.processed += 1;
                summary.errors.push(SubscriptionError {
                    subscription_id,
                    error,
                });
            }
        }
    }

    summary
}

/// Evaluate → admit → dispatch for a single subscription. Alerts are
/// dispatched in rule-priority order; every fallible step degrades to a
/// per-subscription error instead of failing the batch.
async fn process_subscription(
    inner: &SchedulerInner,
    subscription: Subscription,
    rules: &[AlertRule],
    observation_cache: &ObservationCache,
    batch_sent: &Mutex<HashMap<Uuid, i64>>,
) -> ProcessOutcome {
    let observation = match cached_observation(
        inner.provider.as_ref(),
        inner.call_timeout,
        subscription.latitude,
        subscription.longitude,
        observation_cache,
    )
    .await
    {
        Ok(observation) => observation,
        Err(e) => return ProcessOutcome::Failed(e),
    };

    let candidates = evaluator::evaluate(&observation, rules);
    if candidates.is_empty() {
        return ProcessOutcome::Done(0);
    }

    let user_id = subscription.user_id;
    let preference = match bounded(
        inner.call_timeout,
        "preference load",
        inner.registry.preferences(user_id),
    )
    .await
    {
        Ok(preference) => preference,
        Err(e) => return ProcessOutcome::Failed(e),
    };
    let phone = match bounded(
        inner.call_timeout,
        "contact lookup",
        inner.registry.user_phone(user_id),
    )
    .await
    {
        Ok(phone) => phone,
        Err(e) => return ProcessOutcome::Failed(e),
    };

    let now = Utc::now();
    let midnight = policy::local_midnight_utc(now, inner.local_offset);
    let sent_from_db = match bounded(
        inner.call_timeout,
        "daily count",
        inner.registry.alerts_sent_since(user_id, midnight),
    )
    .await
    {
        Ok(count) => count,
        Err(e) => return ProcessOutcome::Failed(e),
    };

    let mut sent = 0usize;
    for candidate in candidates {
        let sent_today = {
            let batch = batch_sent.lock().await;
            sent_from_db + batch.get(&user_id).copied().unwrap_or(0)
        };

        let duplicate_recent = if inner.cooldown > ChronoDuration::zero() {
            match bounded(
                inner.call_timeout,
                "cooldown check",
                inner.registry.recent_alert_exists(
                    subscription.id,
                    candidate.alert_type,
                    candidate.severity,
                    now - inner.cooldown,
                ),
            )
            .await
            {
                Ok(exists) => exists,
                Err(e) => return ProcessOutcome::Failed(e),
            }
        } else {
            false
        };

        let admission = policy::admit(
            &candidate,
            &subscription,
            &preference,
            sent_today,
            duplicate_recent,
            policy::local_time(now, inner.local_offset),
        );
        if let Admission::Reject(reason) = admission {
            info!(
                "Rejected {} ({:?}) for subscription {}: {:?}",
                candidate.alert_type.as_str(),
                candidate.severity,
                subscription.id,
                reason
            );
            continue;
        }

        match inner
            .dispatcher
            .send_alert(user_id, &candidate, &subscription, &preference, phone.as_deref())
            .await
        {
            Ok(record_id) => {
                info!(
                    "Dispatched {} alert {} to user {}",
                    candidate.alert_type.as_str(),
                    record_id,
                    user_id
                );
                sent += 1;
                *batch_sent.lock().await.entry(user_id).or_insert(0) += 1;
            }
            Err(e) => {
                return ProcessOutcome::Failed(format!(
                    "dispatch of {} failed: {e}",
                    candidate.alert_type.as_str()
                ))
            }
        }
    }

    ProcessOutcome::Done(sent)
}

/// One observation fetch per unique location per run. The per-key cell
/// makes concurrent workers for the same location wait on a single
/// in-flight fetch instead of each hitting the provider.
async fn cached_observation(
    provider: &dyn ObservationProvider,
    call_timeout: Duration,
    lat: f64,
    lon: f64,
    cache: &ObservationCache,
) -> Result<Observation, String> {
    let cell = {
        let mut map = cache.lock().await;
        map.entry(location_key(lat, lon))
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    };

    let observation = cell
        .get_or_try_init(|| async {
            timeout(call_timeout, provider.fetch_or_default(lat, lon))
                .await
                .map_err(|_| "observation fetch timed out".to_string())
        })
        .await?
        .clone();
    Ok(observation)
}

/// ~11 m resolution; close enough that co-located subscriptions share a
/// reading without conflating neighbouring villages.
fn location_key(lat: f64, lon: f64) -> String {
    format!("{lat:.4}:{lon:.4}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    #[test]
    fn location_key_groups_co_located_subscriptions() {
        assert_eq!(location_key(26.91241, 75.78731), location_key(26.91239, 75.78734));
        assert_ne!(location_key(26.9124, 75.7873), location_key(26.9224, 75.7873));
    }

    #[test]
    fn run_summary_defaults_empty() {
        let summary = RunSummary::default();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.alerts_sent, 0);
        assert!(summary.errors.is_empty());
    }

    #[tokio::test]
    async fn bounded_folds_errors_and_deadlines() {
        let ok = bounded(Duration::from_secs(1), "fast call", async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let failed: Result<i32, String> = bounded(Duration::from_secs(1), "broken call", async {
            Err(ServiceError::NotFound)
        })
        .await;
        assert_eq!(failed.unwrap_err(), "broken call failed: not found");

        let hung: Result<i32, String> = bounded(Duration::from_millis(10), "hung call", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(0)
        })
        .await;
        assert_eq!(hung.unwrap_err(), "hung call timed out");
    }

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ObservationProvider for CountingProvider {
        async fn fetch(&self, _lat: f64, _lon: f64) -> ServiceResult<Observation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Observation::fallback())
        }
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_fetch() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };
        let cache: ObservationCache = Mutex::new(HashMap::new());
        let timeout = Duration::from_secs(1);

        let (a, b) = tokio::join!(
            cached_observation(&provider, timeout, 26.9124, 75.7873, &cache),
            cached_observation(&provider, timeout, 26.9124, 75.7873, &cache),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        // A different location still fetches.
        cached_observation(&provider, timeout, 28.6139, 77.2090, &cache)
            .await
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    struct SlowProvider;

    #[async_trait]
    impl ObservationProvider for SlowProvider {
        async fn fetch(&self, _lat: f64, _lon: f64) -> ServiceResult<Observation> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Observation::fallback())
        }
    }

    #[tokio::test]
    async fn slow_fetch_counts_as_timeout_not_hang() {
        let cache: ObservationCache = Mutex::new(HashMap::new());
        let err = cached_observation(&SlowProvider, Duration::from_millis(10), 26.9, 75.8, &cache)
            .await
            .unwrap_err();
        assert_eq!(err, "observation fetch timed out");
    }
}
