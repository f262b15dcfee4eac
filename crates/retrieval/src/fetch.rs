//! Whole-object archive downloads with a fixed-delay retry.

use crate::error::{RetrievalError, RetrievalResult};
use bytes::Bytes;
use logvault_core::ArchiveKey;
use logvault_core::config::RetrievalConfig;
use logvault_storage::ObjectStore;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fixed-delay retry policy.
///
/// The attempt counter lives inside each `retry` call, so one archive's failures
/// never shorten another archive's budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

/// Outcome of a retried operation that eventually succeeded.
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// Why a retried operation did not succeed.
#[derive(Debug)]
pub enum RetryFailure<E> {
    Exhausted { attempts: u32, last_error: E },
    Cancelled,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

impl RetryPolicy {
    /// A policy making at most `max_attempts` attempts (at least one).
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.max_fetch_attempts, config.retry_delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds, the attempts run out, or `cancel` fires.
    ///
    /// `op` receives the 1-based attempt number. There is no delay after the last
    /// failed attempt.
    pub async fn retry<F, Fut, T, E>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<Retried<T>, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryFailure::Cancelled);
            }
            attempt += 1;

            let err = match op(attempt).await {
                Ok(value) => {
                    return Ok(Retried {
                        value,
                        attempts: attempt,
                    });
                }
                Err(err) => err,
            };

            tracing::warn!(
                key = label,
                attempt,
                max_attempts = self.max_attempts,
                error = %err,
                "attempt failed (try {attempt} of {})",
                self.max_attempts
            );

            if attempt >= self.max_attempts {
                tracing::error!(
                    key = label,
                    attempts = attempt,
                    error = %err,
                    "giving up after {attempt} attempts"
                );
                return Err(RetryFailure::Exhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryFailure::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
    }
}

/// Archive bytes obtained from the store.
#[derive(Clone, Debug)]
pub struct FetchedArchive {
    pub key: ArchiveKey,
    pub data: Bytes,
    /// Attempts needed, including the successful one.
    pub attempts: u32,
}

/// Downloads whole archives, retrying each one independently.
#[derive(Clone)]
pub struct RetryingFetcher {
    store: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(store: Arc<dyn ObjectStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn fetch(
        &self,
        key: &ArchiveKey,
        cancel: &CancellationToken,
    ) -> RetrievalResult<FetchedArchive> {
        let store = &self.store;
        let outcome = self
            .policy
            .retry(key.as_str(), cancel, |_| store.get(key.as_str()))
            .await;

        match outcome {
            Ok(Retried { value, attempts }) => {
                tracing::debug!(key = %key, attempts, size = value.len(), "fetched archive");
                Ok(FetchedArchive {
                    key: key.clone(),
                    data: value,
                    attempts,
                })
            }
            Err(RetryFailure::Exhausted {
                attempts,
                last_error,
            }) => Err(RetrievalError::FetchFailed {
                key: key.to_string(),
                attempts,
                source: last_error,
            }),
            Err(RetryFailure::Cancelled) => Err(RetrievalError::Cancelled),
        }
    }
}
