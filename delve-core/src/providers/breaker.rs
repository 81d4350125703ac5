//! Per-provider circuit breakers.
//!
//! Every outbound provider call is wrapped by a breaker that trips after
//! consecutive failures and recovers through a single half-open probe.
//! One breaker exists per provider name and is shared by every session
//! calling that provider; its counters are the only cross-session state
//! in the engine and sit behind a mutex.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::BreakerConfig;
use crate::error::ProviderError;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation — calls are permitted.
    Closed,
    /// Too many failures — calls fail fast.
    Open,
    /// Recovery window — exactly one probe call is permitted.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: usize,
    last_failure_at: Option<Instant>,
    /// Set while the single half-open probe is in flight.
    probe_in_flight: bool,
}

/// A circuit breaker guarding one external provider.
///
/// Invariant: `state == Open` implies `failure_count >= failure_threshold`.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: usize,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: usize, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self::new(
            name,
            config.failure_threshold,
            Duration::from_secs(config.recovery_timeout_secs),
        )
    }

    /// The provider name this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. Does not advance Open -> HalfOpen; only `call` does.
    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Current consecutive-failure count.
    pub async fn failure_count(&self) -> usize {
        self.inner.lock().await.failure_count
    }

    /// Execute `op` through the breaker.
    ///
    /// When the breaker refuses the call it returns
    /// [`ProviderError::CircuitOpen`] without invoking `op`; the provider's
    /// own errors pass through unchanged after being recorded.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let is_probe = self.try_acquire().await?;

        let result = op().await;
        match &result {
            Ok(_) => self.record_success().await,
            Err(e) => {
                // A nested breaker rejection is not a provider fault.
                if !e.is_circuit_open() {
                    self.record_failure(is_probe).await;
                }
            }
        }
        result
    }

    /// Decide whether a call may proceed. Returns whether the admitted call
    /// is the half-open probe.
    async fn try_acquire(&self) -> Result<bool, ProviderError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.recovery_timeout {
                    debug!(provider = %self.name, "Circuit breaker transitioning to half-open");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(true)
                } else {
                    Err(ProviderError::CircuitOpen {
                        provider: self.name.clone(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    // Another session holds the probe slot.
                    Err(ProviderError::CircuitOpen {
                        provider: self.name.clone(),
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(true)
                }
            }
        }
    }

    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == CircuitState::HalfOpen {
            debug!(provider = %self.name, "Circuit breaker closing after successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.probe_in_flight = false;
    }

    async fn record_failure(&self, was_probe: bool) {
        let mut inner = self.inner.lock().await;
        inner.last_failure_at = Some(Instant::now());
        if was_probe || inner.state == CircuitState::HalfOpen {
            warn!(provider = %self.name, "Recovery probe failed, circuit breaker re-opening");
            inner.state = CircuitState::Open;
            inner.probe_in_flight = false;
            return;
        }
        inner.failure_count += 1;
        if inner.failure_count >= self.failure_threshold {
            warn!(
                provider = %self.name,
                failures = inner.failure_count,
                threshold = self.failure_threshold,
                "Circuit breaker opening"
            );
            inner.state = CircuitState::Open;
        }
    }
}

/// Hands out one shared breaker per provider name.
///
/// Constructed once at process start and injected wherever providers are
/// called, so tests can create fresh registries instead of sharing
/// process-wide mutable state.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: std::sync::Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// The breaker for `provider`, created on first use.
    pub fn breaker(&self, provider: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().expect("breaker registry poisoned");
        breakers
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::from_config(provider, &self.config)))
            .clone()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn failing() -> Result<(), ProviderError> {
        Err(ProviderError::Connection {
            provider: "test".into(),
            message: "refused".into(),
        })
    }

    #[tokio::test]
    async fn test_starts_closed() {
        let cb = CircuitBreaker::new("test", 3, Duration::from_secs(60));
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.failure_count().await, 0);
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let cb = CircuitBreaker::new("test", 3, Duration::from_secs(60));
        for _ in 0..2 {
            let _ = cb.call(|| async { failing() }).await;
        }
        assert_eq!(cb.state().await, CircuitState::Closed); // not yet
        let _ = cb.call(|| async { failing() }).await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(cb.failure_count().await >= 3);
    }

    #[tokio::test]
    async fn test_open_rejects_without_invoking_provider() {
        let cb = CircuitBreaker::new("test", 1, Duration::from_secs(600));
        let _ = cb.call(|| async { failing() }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        let invoked = AtomicUsize::new(0);
        let result = cb
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ProviderError::CircuitOpen { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("test", 3, Duration::from_secs(60));
        let _ = cb.call(|| async { failing() }).await;
        let _ = cb.call(|| async { failing() }).await;
        let _ = cb.call(|| async { Ok(()) }).await;
        assert_eq!(cb.failure_count().await, 0);
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_after_timeout_then_closes_on_probe_success() {
        let cb = CircuitBreaker::new("test", 1, Duration::from_millis(1));
        let _ = cb.call(|| async { failing() }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = cb.call(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.failure_count().await, 0);
    }

    #[tokio::test]
    async fn test_failing_probe_reopens() {
        let cb = CircuitBreaker::new("test", 1, Duration::from_millis(1));
        let _ = cb.call(|| async { failing() }).await;

        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = cb.call(|| async { failing() }).await;
        assert!(matches!(result, Err(ProviderError::Connection { .. })));
        assert_eq!(cb.state().await, CircuitState::Open);

        // Immediately after the failed probe the breaker rejects again.
        let result = cb.call(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(ProviderError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn test_half_open_admits_exactly_one_probe() {
        let cb = Arc::new(CircuitBreaker::new("test", 1, Duration::from_millis(1)));
        let _ = cb.call(|| async { failing() }).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        // First caller takes the probe slot and holds it.
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let probe_cb = cb.clone();
        let probe = tokio::spawn(async move {
            probe_cb
                .call(|| async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok(())
                })
                .await
        });

        started_rx.await.unwrap();
        // Second caller is rejected while the probe is in flight.
        let result = cb.call(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(ProviderError::CircuitOpen { .. })));

        let _ = release_tx.send(());
        probe.await.unwrap().unwrap();
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_registry_shares_breakers_by_name() {
        let registry = BreakerRegistry::default();
        let a = registry.breaker("web_search");
        let b = registry.breaker("web_search");
        let c = registry.breaker("planner");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn test_concurrent_sessions_share_failure_count() {
        let registry = Arc::new(BreakerRegistry::new(BreakerConfig {
            failure_threshold: 4,
            recovery_timeout_secs: 600,
        }));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let breaker = registry.breaker("shared");
            handles.push(tokio::spawn(async move {
                let _ = breaker.call(|| async { failing() }).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let breaker = registry.breaker("shared");
        assert_eq!(breaker.state().await, CircuitState::Open);
    }
}
