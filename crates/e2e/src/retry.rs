//! Bounded retry engine for flaky UI actions
//!
//! Runs an async action up to `max_attempts` times, sleeping between failed
//! attempts according to the policy's backoff. Returns the first success or
//! the last error, unchanged.

use std::fmt;
use std::future::Future;

use pihr_common::{AttemptOutcome, EventLog, RetryPolicy};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

const COMPONENT: &str = "retry";

/// Per-attempt record plus the final result of one retried invocation
#[derive(Debug)]
pub struct ExecutionReport<T, E> {
    /// One entry per attempt actually made, in order
    pub outcomes: Vec<AttemptOutcome>,
    pub result: Result<T, E>,
}

impl<T, E> ExecutionReport<T, E> {
    pub fn attempts(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn failed_attempts(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded).count()
    }

    pub fn into_result(self) -> Result<T, E> {
        self.result
    }

    /// Split into the attempt log and the result
    pub fn into_parts(self) -> (Vec<AttemptOutcome>, Result<T, E>) {
        (self.outcomes, self.result)
    }
}

/// Executes actions under a [`RetryPolicy`]. Holds no state besides its
/// configuration; build one per run or per action.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    events: Option<EventLog>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            events: None,
        }
    }

    /// Also record failed attempts in `events`
    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// Same executor, different policy
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            policy,
            events: self.events.clone(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `action` under the policy and report every attempt
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut action: F) -> ExecutionReport<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.policy.max_attempts();
        // Capacity is only a hint; max_attempts may be arbitrarily large
        let mut outcomes = Vec::with_capacity((max_attempts as usize).min(16));
        let mut attempt = 1;

        loop {
            let started = Instant::now();
            let result = action().await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(value) => {
                    outcomes.push(AttemptOutcome {
                        attempt,
                        succeeded: true,
                        error: None,
                        elapsed_ms,
                        delay_after_ms: None,
                    });
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}/{}", label, attempt, max_attempts);
                    }
                    return ExecutionReport {
                        outcomes,
                        result: Ok(value),
                    };
                }
                Err(err) => {
                    let summary = err.to_string();
                    self.log_failure(label, attempt, max_attempts, &summary);

                    if attempt >= max_attempts {
                        outcomes.push(AttemptOutcome {
                            attempt,
                            succeeded: false,
                            error: Some(summary),
                            elapsed_ms,
                            delay_after_ms: None,
                        });
                        return ExecutionReport {
                            outcomes,
                            result: Err(err),
                        };
                    }

                    let delay = self.policy.delay_for(attempt);
                    outcomes.push(AttemptOutcome {
                        attempt,
                        succeeded: false,
                        error: Some(summary),
                        elapsed_ms,
                        delay_after_ms: Some(delay.as_millis() as u64),
                    });
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run `action` under the policy and return only its final result
    pub async fn execute<T, E, F, Fut>(&self, label: &str, action: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.run(label, action).await.into_result()
    }

    fn log_failure(&self, label: &str, attempt: u32, max_attempts: u32, summary: &str) {
        let message = format!(
            "{}: attempt {}/{} failed: {}",
            label, attempt, max_attempts, summary
        );
        match &self.events {
            Some(events) => events.warn(COMPONENT, message),
            None => warn!("{}", message),
        }
    }
}

/// Retry `action` under `policy`, returning the first success or the last error
pub async fn retry_action<T, E, F, Fut>(policy: RetryPolicy, action: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    RetryExecutor::new(policy).execute("action", action).await
}
