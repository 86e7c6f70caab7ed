//! Retry policies for transient failures.

use std::time::Duration;

use async_trait::async_trait;

use crate::{LocalErrorKind, NetworkError, Request, RetryDecision, Retrier};

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// No delay between retries.
    None,
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff with base and max.
    Exponential {
        /// Initial delay.
        base: Duration,
        /// Maximum delay.
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Calculate delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => *d,
            Self::Exponential { base, max } => {
                let multiplier = 2u32.saturating_pow(attempt);
                base.saturating_mul(multiplier).min(*max)
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(50),
            max: Duration::from_millis(500),
        }
    }
}

/// Conditions that trigger a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCondition {
    /// Retry on specific HTTP status code.
    StatusCode(u16),
    /// Retry on any 5xx status.
    ServerError,
    /// Retry on transport timeout.
    Timeout,
    /// Retry on connection error.
    ConnectionError,
}

impl RetryCondition {
    /// Check if an error matches this condition.
    ///
    /// Decoding failures never match: they indicate a contract mismatch, not
    /// a transient fault.
    pub fn matches(&self, error: &NetworkError) -> bool {
        match (self, error) {
            (Self::StatusCode(code), NetworkError::Remote { status, .. }) => status == code,
            (Self::ServerError, NetworkError::Remote { status, .. }) => {
                (500..600).contains(status)
            }
            (Self::Timeout, NetworkError::Local(e)) => e.kind == LocalErrorKind::Timeout,
            (Self::ConnectionError, NetworkError::Local(e)) => {
                e.kind == LocalErrorKind::Connection
            }
            _ => false,
        }
    }
}

/// Retrier for transient transport and server failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts.
    pub max_attempts: u32,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Conditions that trigger retry.
    pub retry_on: Vec<RetryCondition>,
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::default(),
            retry_on: vec![
                RetryCondition::ServerError,
                RetryCondition::Timeout,
                RetryCondition::ConnectionError,
            ],
        }
    }

    /// Create a policy with no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            backoff: BackoffStrategy::None,
            retry_on: Vec::new(),
        }
    }

    /// Set backoff strategy.
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Set retry conditions.
    pub fn with_conditions(mut self, conditions: Vec<RetryCondition>) -> Self {
        self.retry_on = conditions;
        self
    }

    /// Decide synchronously for a failed attempt.
    pub fn decide(&self, error: &NetworkError, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts || !self.retry_on.iter().any(|c| c.matches(error)) {
            return RetryDecision::DoNotRetry;
        }
        let delay = self.backoff.delay_for_attempt(attempt);
        if delay.is_zero() {
            RetryDecision::Retry
        } else {
            RetryDecision::RetryAfter(delay)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl Retrier for RetryPolicy {
    async fn retry(
        &self,
        _request: &Request,
        error: &NetworkError,
        attempt: u32,
    ) -> Result<RetryDecision, NetworkError> {
        Ok(self.decide(error, attempt))
    }
}
