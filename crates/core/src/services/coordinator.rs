//! Registration coordinator.
//!
//! Token acquisition is neither cheap nor safe to hammer: reactive
//! listeners can fire on every app load, and a revoked credential would
//! otherwise be retried forever. The coordinator enforces at-most-one
//! in-flight registration per process, backs failures off through a
//! cooldown window, and opens a circuit breaker after saturated or fatal
//! failure.
//!
//! State is constructor-injected and persisted through a [`LocalStore`],
//! so cooldown and circuit windows survive process restarts and tests can
//! build independent instances. The guard is per-process only; two
//! processes of the same profile can both attempt acquisition. The
//! platform collapses duplicate tokens to one identity and the durable
//! record is the tiebreaker, so this race is accepted rather than locked
//! across contexts.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, watch};

use fieldline_common::{AppResult, CoordinatorSettings, LocalStore, store_keys};

/// Registration outcome shared by all callers of one attempt.
type Outcome = Option<String>;

/// Coordinator timing windows and thresholds.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Failed attempts before the circuit opens.
    pub max_retries: u32,
    /// Refusal window after a failed attempt.
    pub cooldown: Duration,
    /// Refusal window after the circuit opens.
    pub circuit_open: Duration,
    /// Minimum interval between auto-enable attempts.
    pub auto_enable_min_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&CoordinatorSettings::default())
    }
}

impl From<&CoordinatorSettings> for CoordinatorConfig {
    fn from(settings: &CoordinatorSettings) -> Self {
        let seconds = |value: u64| Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX));
        Self {
            max_retries: settings.max_retries,
            cooldown: seconds(settings.cooldown_secs),
            circuit_open: seconds(settings.circuit_open_secs),
            auto_enable_min_interval: seconds(settings.auto_enable_min_interval_secs),
        }
    }
}

/// Observable coordinator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    /// Ready to admit an attempt.
    Idle,
    /// An attempt is in flight; new callers join it.
    Registering,
    /// Refusing attempts until the cooldown elapses.
    Cooldown,
    /// Refusing attempts until the circuit window elapses.
    CircuitOpen,
}

/// Persistable coordinator counters and timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorState {
    /// Consecutive failed attempts since the last success.
    pub retry_count: u32,
    /// When the last attempt finished.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// When the circuit opened, if it is open.
    pub circuit_opened_at: Option<DateTime<Utc>>,
}

impl CoordinatorState {
    /// Clear expired windows. The circuit closing also resets the
    /// failure counter.
    pub fn settle(&mut self, now: DateTime<Utc>, config: &CoordinatorConfig) {
        if let Some(opened) = self.circuit_opened_at
            && now - opened >= config.circuit_open
        {
            self.circuit_opened_at = None;
            self.retry_count = 0;
        }
    }

    /// Phase implied by the stored timestamps. Does not observe an
    /// in-flight attempt; see [`RegistrationCoordinator::phase`].
    #[must_use]
    pub fn phase(&self, now: DateTime<Utc>, config: &CoordinatorConfig) -> CoordinatorPhase {
        if let Some(opened) = self.circuit_opened_at
            && now - opened < config.circuit_open
        {
            return CoordinatorPhase::CircuitOpen;
        }
        if self.retry_count > 0
            && let Some(last) = self.last_attempt_at
            && now - last < config.cooldown
        {
            return CoordinatorPhase::Cooldown;
        }
        CoordinatorPhase::Idle
    }

    fn record_success(&mut self, now: DateTime<Utc>) {
        self.retry_count = 0;
        self.circuit_opened_at = None;
        self.last_attempt_at = Some(now);
    }

    fn record_failure(&mut self, now: DateTime<Utc>, config: &CoordinatorConfig) {
        self.retry_count += 1;
        self.last_attempt_at = Some(now);
        if self.retry_count >= config.max_retries {
            self.circuit_opened_at = Some(now);
        }
    }

    fn open_circuit(&mut self, now: DateTime<Utc>) {
        self.last_attempt_at = Some(now);
        self.circuit_opened_at = Some(now);
    }
}

struct Inner {
    state: CoordinatorState,
    in_flight: Option<watch::Receiver<Option<Outcome>>>,
    last_auto_enable_at: Option<DateTime<Utc>>,
}

/// Concurrency guard and breaker around token acquisition.
#[derive(Clone)]
pub struct RegistrationCoordinator {
    config: CoordinatorConfig,
    store: Arc<dyn LocalStore>,
    inner: Arc<Mutex<Inner>>,
}

impl RegistrationCoordinator {
    /// Create a coordinator with fresh state.
    #[must_use]
    pub fn new(config: CoordinatorConfig, store: Arc<dyn LocalStore>) -> Self {
        Self::with_state(config, store, CoordinatorState::default())
    }

    /// Create a coordinator with injected state.
    #[must_use]
    pub fn with_state(
        config: CoordinatorConfig,
        store: Arc<dyn LocalStore>,
        state: CoordinatorState,
    ) -> Self {
        Self {
            config,
            store,
            inner: Arc::new(Mutex::new(Inner {
                state,
                in_flight: None,
                last_auto_enable_at: None,
            })),
        }
    }

    /// Create a coordinator from state persisted in the store, so
    /// cooldown and circuit windows survive a restart.
    pub async fn restore(config: CoordinatorConfig, store: Arc<dyn LocalStore>) -> Self {
        let state = CoordinatorState {
            retry_count: read_u32(store.as_ref(), store_keys::RETRY_COUNT).await,
            last_attempt_at: read_timestamp(store.as_ref(), store_keys::LAST_ATTEMPT).await,
            circuit_opened_at: read_timestamp(store.as_ref(), store_keys::CIRCUIT_OPENED).await,
        };
        let last_auto_enable = read_timestamp(store.as_ref(), store_keys::LAST_AUTO_ENABLE).await;

        let coordinator = Self::with_state(config, store, state);
        coordinator.inner.lock().await.last_auto_enable_at = last_auto_enable;
        coordinator
    }

    /// Current phase, observing an in-flight attempt.
    pub async fn phase(&self) -> CoordinatorPhase {
        let inner = self.inner.lock().await;
        if inner.in_flight.is_some() {
            return CoordinatorPhase::Registering;
        }
        inner.state.phase(Utc::now(), &self.config)
    }

    /// Snapshot of the persisted counters, for diagnostics.
    pub async fn state(&self) -> CoordinatorState {
        self.inner.lock().await.state.clone()
    }

    /// Run a registration attempt under the guard.
    ///
    /// If an attempt is already in flight, the caller joins it and
    /// observes the same outcome. Inside a cooldown or circuit window the
    /// attempt is refused outright and `None` is returned without the
    /// future being polled. The attempt itself runs on a spawned task, so
    /// a caller losing interest does not abort it.
    pub async fn run<F>(&self, attempt: F) -> Option<String>
    where
        F: Future<Output = AppResult<Option<String>>> + Send + 'static,
    {
        let rx = {
            let mut inner = self.inner.lock().await;

            if let Some(rx) = &inner.in_flight {
                tracing::debug!("Joining in-flight registration attempt");
                rx.clone()
            } else {
                let now = Utc::now();
                inner.state.settle(now, &self.config);
                match inner.state.phase(now, &self.config) {
                    CoordinatorPhase::Idle => {}
                    phase => {
                        tracing::debug!(?phase, "Registration attempt refused");
                        return None;
                    }
                }

                let (tx, rx) = watch::channel(None);
                inner.in_flight = Some(rx.clone());
                drop(inner);

                let this = self.clone();
                tokio::spawn(async move {
                    let result = attempt.await;
                    let outcome = this.complete(result).await;
                    let _ = tx.send(Some(outcome));
                });
                rx
            }
        };

        Self::await_outcome(rx).await
    }

    /// Whether the debounced auto-enable path may run now. Stamps the
    /// attempt time when it may.
    pub async fn auto_enable_due(&self) -> bool {
        let now = Utc::now();
        let due = {
            let mut inner = self.inner.lock().await;
            let due = inner
                .last_auto_enable_at
                .is_none_or(|last| now - last >= self.config.auto_enable_min_interval);
            if due {
                inner.last_auto_enable_at = Some(now);
            }
            due
        };
        if due {
            self.persist_timestamp(store_keys::LAST_AUTO_ENABLE, Some(now))
                .await;
        }
        due
    }

    async fn await_outcome(mut rx: watch::Receiver<Option<Outcome>>) -> Option<String> {
        loop {
            if let Some(outcome) = rx.borrow().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without an outcome; treat as failed.
                return None;
            }
        }
    }

    async fn complete(&self, result: AppResult<Option<String>>) -> Outcome {
        let now = Utc::now();
        let (outcome, snapshot) = {
            let mut inner = self.inner.lock().await;
            inner.in_flight = None;

            let outcome = match result {
                Ok(Some(token)) => {
                    inner.state.record_success(now);
                    Some(token)
                }
                Ok(None) => {
                    inner.state.record_failure(now, &self.config);
                    tracing::warn!(
                        retry_count = inner.state.retry_count,
                        "Registration attempt yielded no token"
                    );
                    None
                }
                Err(e) if e.is_fatal() => {
                    inner.state.open_circuit(now);
                    tracing::error!(error = %e, "Fatal registration failure, circuit opened");
                    None
                }
                Err(e) => {
                    inner.state.record_failure(now, &self.config);
                    tracing::warn!(
                        error = %e,
                        retry_count = inner.state.retry_count,
                        "Registration attempt failed"
                    );
                    None
                }
            };
            (outcome, inner.state.clone())
        };

        self.persist(&snapshot).await;
        outcome
    }

    async fn persist(&self, state: &CoordinatorState) {
        if let Err(e) = self
            .store
            .put(store_keys::RETRY_COUNT, &state.retry_count.to_string())
            .await
        {
            tracing::warn!(error = %e, "Failed to persist retry counter");
        }
        self.persist_timestamp(store_keys::LAST_ATTEMPT, state.last_attempt_at)
            .await;
        self.persist_timestamp(store_keys::CIRCUIT_OPENED, state.circuit_opened_at)
            .await;
    }

    async fn persist_timestamp(&self, key: &str, value: Option<DateTime<Utc>>) {
        let result = match value {
            Some(ts) => self.store.put(key, &ts.to_rfc3339()).await,
            None => self.store.remove(key).await,
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, key, "Failed to persist coordinator timestamp");
        }
    }
}

async fn read_u32(store: &dyn LocalStore, key: &str) -> u32 {
    match store.get(key).await {
        Ok(value) => value.and_then(|v| v.parse().ok()).unwrap_or(0),
        Err(e) => {
            tracing::warn!(error = %e, key, "Failed to read coordinator counter");
            0
        }
    }
}

async fn read_timestamp(store: &dyn LocalStore, key: &str) -> Option<DateTime<Utc>> {
    match store.get(key).await {
        Ok(value) => value
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|ts| ts.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!(error = %e, key, "Failed to read coordinator timestamp");
            None
        }
    }
}
