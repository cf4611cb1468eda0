// Shared retry policy.
//
// Deletions against the messaging platform and single-row inserts into the
// database both retry transient failures with exponential backoff. They share
// this one policy type and differ only in their parameters and in how they
// classify errors.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// What the caller's classifier thinks about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    /// Permanent. Stop immediately.
    Stop,
    /// Transient. Back off using the policy's schedule.
    Retry,
    /// Transient, and the remote side told us how long to wait.
    RetryAfter(Duration),
}

/// Why a retried operation finally failed.
#[derive(Debug)]
pub enum RetryFailure<E> {
    Permanent { error: E, attempts: u32 },
    Exhausted { error: E, attempts: u32 },
}

impl<E> RetryFailure<E> {
    pub fn error(&self) -> &E {
        match self {
            RetryFailure::Permanent { error, .. } | RetryFailure::Exhausted { error, .. } => error,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryFailure::Permanent { attempts, .. } | RetryFailure::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Upper bound of the random extra wait added to each backoff.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Policy for platform deletions. Rate limits are common here, so it
    /// starts slower than the storage policy.
    pub fn for_deletions() -> Self {
        Self::new(5)
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(8))
            .with_jitter(Duration::from_millis(100))
    }

    /// Policy for single-row inserts that hit a busy database.
    pub fn for_storage() -> Self {
        Self::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(2))
            .with_jitter(Duration::from_millis(50))
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Backoff after the given (1-based) failed attempt, without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    fn delay_for(&self, attempt: u32, verdict: RetryVerdict) -> Duration {
        let mut delay = self.base_delay(attempt);
        if let RetryVerdict::RetryAfter(hint) = verdict {
            delay = delay.max(hint);
        }
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms > 0 {
            delay += Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
        }
        delay
    }

    /// Run `operation` until it succeeds, the classifier says stop, or the
    /// attempt budget runs out. The operation receives the 1-based attempt
    /// number.
    pub async fn run<T, E, F, Fut>(
        &self,
        classify: impl Fn(&E) -> RetryVerdict,
        mut operation: F,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let verdict = classify(&error);
            if verdict == RetryVerdict::Stop {
                return Err(RetryFailure::Permanent {
                    error,
                    attempts: attempt,
                });
            }
            if attempt >= self.max_attempts {
                return Err(RetryFailure::Exhausted {
                    error,
                    attempts: attempt,
                });
            }

            let delay = self.delay_for(attempt, verdict);
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying after transient failure");
            tokio::time::sleep(delay).await;
        }
    }
}
