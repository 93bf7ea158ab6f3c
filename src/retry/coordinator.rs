use std::fmt;
use std::time::Duration;

use rand::{SeedableRng, rngs::StdRng};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::errors::Error;

use super::{RetryOutcome, plan::RetryPlan};

/// The set of operations the transport retries, used only for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    DiscoverHost,
    ExchangeOAuthToken,
    OpenChannel,
    AppendRows,
    GetChannelStatus,
    ListCommittedOffsets,
    DeleteChannel,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::DiscoverHost => write!(f, "discover_ingest_host"),
            OperationKind::ExchangeOAuthToken => write!(f, "exchange_oauth_token"),
            OperationKind::OpenChannel => write!(f, "open_channel"),
            OperationKind::AppendRows => write!(f, "append_rows"),
            OperationKind::GetChannelStatus => write!(f, "get_channel_status"),
            OperationKind::ListCommittedOffsets => write!(f, "list_committed_offsets"),
            OperationKind::DeleteChannel => write!(f, "delete_channel"),
        }
    }
}

/// What an attempt produced, as seen by the retry loop. A `Fail` is a
/// terminal, non-retryable error (e.g. schema violation, 4xx other than
/// 408/425/429); a `Retry` carries the error that would be returned if
/// retries are exhausted, plus an optional `Retry-After`-derived delay that
/// overrides the plan's computed backoff.
pub enum Attempt<T> {
    Done(T),
    Retry {
        error: Error,
        retry_after: Option<Duration>,
    },
    Fail(Error),
}

pub struct RetryCoordinator {
    plan: RetryPlan,
    rng: Mutex<StdRng>,
}

impl RetryCoordinator {
    pub fn new(plan: RetryPlan) -> Self {
        Self {
            plan,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn plan(&self) -> RetryPlan {
        self.plan.clone()
    }

    /// Runs `op` until it succeeds, is exhausted, or fails terminally.
    /// `op` receives the 1-based attempt number.
    pub async fn execute<F, Fut, T>(
        &self,
        operation: OperationKind,
        mut op: F,
    ) -> Result<(T, RetryOutcome), Error>
    where
        F: FnMut(u32) -> Fut + Send,
        Fut: std::future::Future<Output = Attempt<T>> + Send,
    {
        let mut attempt: u32 = 1;
        let start = Instant::now();
        loop {
            match op(attempt).await {
                Attempt::Done(value) => {
                    let outcome = RetryOutcome {
                        operation,
                        attempts: attempt,
                        success: true,
                        total_delay: start.elapsed(),
                    };
                    outcome.log();
                    return Ok((value, outcome));
                }
                Attempt::Fail(err) => {
                    let outcome = RetryOutcome {
                        operation,
                        attempts: attempt,
                        success: false,
                        total_delay: start.elapsed(),
                    };
                    outcome.log();
                    return Err(err);
                }
                Attempt::Retry { error, retry_after } => {
                    if attempt >= self.plan.max_attempts {
                        let outcome = RetryOutcome {
                            operation,
                            attempts: attempt,
                            success: false,
                            total_delay: start.elapsed(),
                        };
                        outcome.log();
                        return Err(error);
                    }
                    let delay = match retry_after {
                        Some(d) => d.min(self.plan.max_delay),
                        None => {
                            let mut rng = self.rng.lock().await;
                            self.plan.delay_for_attempt(attempt + 1, &mut *rng)
                        }
                    };
                    warn!(
                        operation = %operation,
                        attempt,
                        max_attempts = self.plan.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retry.scheduling"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryCoordinator {
    fn default() -> Self {
        Self::new(RetryPlan::default_plan())
    }
}
