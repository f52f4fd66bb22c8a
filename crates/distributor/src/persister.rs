//! Bounded persistence runner.
//!
//! Each call runs on the blocking pool, is retried up to the configured
//! limit, and is awaited for at most the configured timeout. Consecutive
//! failures open a circuit breaker that skips persistence until a
//! cool-down has passed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::config::DistributorConfig;
use crate::persistence::NodeStorePersistence;

/// How one persistence call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Persisted,
    /// All attempts returned false.
    Failed,
    /// Did not finish within the timeout. The attempt keeps running in the
    /// background.
    TimedOut,
    /// Circuit breaker open; nothing was attempted.
    Skipped,
    /// The blocking task panicked.
    Panicked,
}

#[derive(Debug)]
struct Breaker {
    consecutive_failures: usize,
    open_until: Option<Instant>,
}

pub struct Persister {
    backend: Arc<dyn NodeStorePersistence>,
    retry_limit: usize,
    timeout: Duration,
    threshold: usize,
    cooldown: Duration,
    breaker: Mutex<Breaker>,
}

impl Persister {
    pub fn new(backend: Arc<dyn NodeStorePersistence>, config: &DistributorConfig) -> Self {
        Self {
            backend,
            retry_limit: config.persist_retry_limit,
            timeout: config.persist_timeout(),
            threshold: config.circuit_breaker_threshold,
            cooldown: config.circuit_breaker_cooldown(),
            breaker: Mutex::new(Breaker {
                consecutive_failures: 0,
                open_until: None,
            }),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_open(&self) -> bool {
        let breaker = self.breaker.lock();
        breaker.open_until.is_some_and(|t| Instant::now() < t)
    }

    /// Run `op` against the backend with retry, timeout and breaker.
    pub async fn run<F>(&self, what: &'static str, op: F) -> PersistOutcome
    where
        F: Fn(&dyn NodeStorePersistence) -> bool + Send + 'static,
    {
        if self.is_open() {
            debug!(what, "persistence circuit open, skipping");
            return PersistOutcome::Skipped;
        }

        let backend = Arc::clone(&self.backend);
        let limit = self.retry_limit;
        let task = tokio::task::spawn_blocking(move || {
            for attempt in 1..=limit {
                if op(backend.as_ref()) {
                    return true;
                }
                warn!(what, attempt, limit, "persistence attempt failed");
            }
            false
        });

        let outcome = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(true)) => PersistOutcome::Persisted,
            Ok(Ok(false)) => {
                error!(what, backend = self.backend.name(), "giving up on persistence");
                PersistOutcome::Failed
            }
            Ok(Err(e)) => {
                error!(what, error = %e, "persistence task panicked");
                PersistOutcome::Panicked
            }
            Err(_) => {
                warn!(what, timeout_ms = self.timeout.as_millis() as u64, "persistence timed out");
                PersistOutcome::TimedOut
            }
        };
        self.record(outcome);
        outcome
    }

    fn record(&self, outcome: PersistOutcome) {
        let mut breaker = self.breaker.lock();
        match outcome {
            PersistOutcome::Persisted => {
                breaker.consecutive_failures = 0;
                breaker.open_until = None;
            }
            PersistOutcome::Skipped => {}
            PersistOutcome::Failed | PersistOutcome::TimedOut | PersistOutcome::Panicked => {
                breaker.consecutive_failures += 1;
                if self.threshold > 0 && breaker.consecutive_failures >= self.threshold {
                    warn!(
                        failures = breaker.consecutive_failures,
                        cooldown_ms = self.cooldown.as_millis() as u64,
                        "opening persistence circuit"
                    );
                    breaker.open_until = Some(Instant::now() + self.cooldown);
                    breaker.consecutive_failures = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::FakeStore;

    fn config() -> DistributorConfig {
        DistributorConfig {
            persist_retry_limit: 5,
            persist_timeout_ms: 1_000,
            circuit_breaker_threshold: 2,
            circuit_breaker_cooldown_ms: 60_000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let store = Arc::new(FakeStore::new());
        store.fail_next(4);
        let persister = Persister::new(store.clone(), &config());
        let outcome = persister.run("nodes", |b| b.persist_nodes(&[])).await;
        assert_eq!(outcome, PersistOutcome::Persisted);
        assert_eq!(store.attempts(), 5);
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_limit() {
        let store = Arc::new(FakeStore::new());
        store.fail_next(100);
        let persister = Persister::new(store.clone(), &config());
        let outcome = persister.run("nodes", |b| b.persist_nodes(&[])).await;
        assert_eq!(outcome, PersistOutcome::Failed);
        assert_eq!(store.attempts(), 5);
    }

    #[tokio::test]
    async fn test_breaker_opens_after_threshold() {
        let store = Arc::new(FakeStore::new());
        store.fail_next(100);
        let persister = Persister::new(store.clone(), &config());
        persister.run("nodes", |b| b.persist_nodes(&[])).await;
        persister.run("nodes", |b| b.persist_nodes(&[])).await;
        assert!(persister.is_open());

        let before = store.attempts();
        let outcome = persister.run("nodes", |b| b.persist_nodes(&[])).await;
        assert_eq!(outcome, PersistOutcome::Skipped);
        assert_eq!(store.attempts(), before);
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let store = Arc::new(FakeStore::new());
        let persister = Persister::new(
            store,
            &DistributorConfig {
                persist_timeout_ms: 20,
                ..config()
            },
        );
        let outcome = persister
            .run("nodes", |_| {
                std::thread::sleep(Duration::from_millis(200));
                true
            })
            .await;
        assert_eq!(outcome, PersistOutcome::TimedOut);
    }
}
