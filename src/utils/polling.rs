/// Bounded polling for readiness checks
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::Error;

/// An entity a probe found unhealthy, e.g. a scrape target or a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnhealthyEntity {
    pub id: String,
    pub status: String,
}

impl UnhealthyEntity {
    pub fn new(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
        }
    }
}

/// Why a probe attempt did not succeed.
///
/// `unhealthy` is `None` when the probe could not collect anything (for
/// example the query itself failed); the poller then keeps the previous
/// collection instead of clearing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotReady {
    pub cause: String,
    pub unhealthy: Option<Vec<UnhealthyEntity>>,
}

impl NotReady {
    pub fn new(cause: impl fmt::Display) -> Self {
        Self {
            cause: cause.to_string(),
            unhealthy: None,
        }
    }

    /// Attach the entities observed on this attempt
    pub fn with_unhealthy(mut self, unhealthy: Vec<UnhealthyEntity>) -> Self {
        self.unhealthy = Some(unhealthy);
        self
    }
}

/// Outcome of one `PollingConfig::poll` call
#[derive(Debug)]
pub struct PollResult<T> {
    /// Probe value when an attempt succeeded
    pub value: Option<T>,
    /// Number of probe invocations performed
    pub attempts: u32,
    pub last_error: Option<String>,
    pub unhealthy: Vec<UnhealthyEntity>,
    description: String,
}

impl<T> PollResult<T> {
    pub fn succeeded(&self) -> bool {
        self.value.is_some()
    }

    /// Convert a failed poll into `Error::ReadinessTimeout`
    pub fn into_result(self) -> crate::Result<T> {
        match self.value {
            Some(value) => Ok(value),
            None => Err(Error::ReadinessTimeout {
                check: self.description,
                attempts: self.attempts,
                cause: self.last_error.unwrap_or_default(),
                unhealthy: self.unhealthy,
            }),
        }
    }
}

/// Configuration for polling operations
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub max_attempts: u32,
    pub interval: Duration,
    pub description: String,
}

impl PollingConfig {
    /// Create a new polling configuration
    pub fn new(max_attempts: u32, interval: Duration, description: impl Into<String>) -> Self {
        Self {
            max_attempts,
            interval,
            description: description.into(),
        }
    }

    /// Attempt budget actually used; zero is treated as a single attempt
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Poll until the probe succeeds or the attempt budget is spent.
    ///
    /// The probe returns `Ok(value)` when ready and `Err(NotReady)` otherwise.
    /// Query failures must be mapped to `NotReady` by the probe: they consume
    /// an attempt like any other miss. There is no sleep after the final
    /// attempt.
    pub async fn poll<F, Fut, T>(&self, mut probe: F) -> PollResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NotReady>>,
    {
        let max_attempts = self.attempts();
        info!("{}...", self.description);

        let mut last_error = None;
        let mut unhealthy = Vec::new();

        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, "{}: attempt #{}", self.description, attempt);

            match probe().await {
                Ok(value) => {
                    info!("✓ {}", self.description);
                    return PollResult {
                        value: Some(value),
                        attempts: attempt,
                        last_error: None,
                        unhealthy: Vec::new(),
                        description: self.description.clone(),
                    };
                }
                Err(not_ready) => {
                    warn!(
                        attempt,
                        cause = %not_ready.cause,
                        "{}: not ready",
                        self.description
                    );
                    if let Some(collected) = not_ready.unhealthy {
                        unhealthy = collected;
                    }
                    last_error = Some(not_ready.cause);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        PollResult {
            value: None,
            attempts: max_attempts,
            last_error,
            unhealthy,
            description: self.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_attempts: u32) -> PollingConfig {
        PollingConfig::new(max_attempts, Duration::from_millis(1), "test polling")
    }

    #[tokio::test]
    async fn test_succeeds_on_attempt_k() {
        for k in 1..=5u32 {
            let counter = Arc::new(AtomicU32::new(0));
            let counter_clone = counter.clone();

            let result = fast(5)
                .poll(|| {
                    let c = counter_clone.clone();
                    async move {
                        let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                        if attempt >= k {
                            Ok(attempt)
                        } else {
                            Err(NotReady::new(format!("attempt {} failed", attempt)))
                        }
                    }
                })
                .await;

            assert!(result.succeeded());
            assert_eq!(result.attempts, k);
            assert_eq!(result.value, Some(k));
            assert_eq!(counter.load(Ordering::SeqCst), k);
        }
    }

    #[tokio::test]
    async fn test_never_ready_uses_whole_budget() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fast(4)
            .poll(|| {
                let c = counter_clone.clone();
                async move {
                    let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                    Err::<(), _>(
                        NotReady::new(format!("miss {}", attempt))
                            .with_unhealthy(vec![UnhealthyEntity::new(
                                format!("target-{}", attempt),
                                "down",
                            )]),
                    )
                }
            })
            .await;

        assert!(!result.succeeded());
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(result.attempts, 4);
        assert_eq!(result.last_error.as_deref(), Some("miss 4"));
        assert_eq!(result.unhealthy, vec![UnhealthyEntity::new("target-4", "down")]);
    }

    #[tokio::test]
    async fn test_query_error_keeps_previous_collection() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fast(2)
            .poll(|| {
                let c = counter_clone.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err::<(), _>(
                            NotReady::new("targets down")
                                .with_unhealthy(vec![UnhealthyEntity::new("a/b", "down")]),
                        )
                    } else {
                        Err(NotReady::new("connection refused"))
                    }
                }
            })
            .await;

        assert_eq!(result.last_error.as_deref(), Some("connection refused"));
        assert_eq!(result.unhealthy, vec![UnhealthyEntity::new("a/b", "down")]);
    }

    #[tokio::test]
    async fn test_zero_budget_still_probes_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fast(0)
            .poll(|| {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(NotReady::new("no"))
                }
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn test_into_result_timeout() {
        let result = fast(2)
            .poll(|| async {
                Err::<(), _>(
                    NotReady::new("still down")
                        .with_unhealthy(vec![UnhealthyEntity::new("x", "down")]),
                )
            })
            .await;

        match result.into_result() {
            Err(Error::ReadinessTimeout {
                check,
                attempts,
                cause,
                unhealthy,
            }) => {
                assert_eq!(check, "test polling");
                assert_eq!(attempts, 2);
                assert_eq!(cause, "still down");
                assert_eq!(unhealthy.len(), 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
