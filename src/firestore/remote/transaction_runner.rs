use std::future::Future;
use std::time::Duration;

use crate::firestore::api::{Firestore, Transaction};
use crate::firestore::error::{invalid_argument, FirestoreError, FirestoreErrorCode, FirestoreResult};
use crate::platform::runtime;
use crate::util::backoff::{calculate_backoff, BackoffConfig};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Delay between transaction attempts: `initial_delay * multiplier^n`,
/// jittered and capped at `max_delay`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetrySettings {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            multiplier: 1.5,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetrySettings {
    /// Retries immediately.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial: self.initial_delay,
            factor: self.multiplier,
            max: self.max_delay,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransactionOptions {
    /// Total number of times the body may run, including the first.
    pub max_attempts: u32,
    pub retry: RetrySettings,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry: RetrySettings::default(),
        }
    }
}

impl TransactionOptions {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }
}

/// Errors after which a fresh attempt can succeed: the documents changed
/// under the transaction or the backend asked for a retry.
fn is_retryable(err: &FirestoreError) -> bool {
    matches!(
        err.code,
        FirestoreErrorCode::Aborted | FirestoreErrorCode::FailedPrecondition | FirestoreErrorCode::AlreadyExists
    )
}

/// Runs `body` in a fresh [`Transaction`] and commits it, retrying on
/// contention until `max_attempts` is reached. The last error is returned
/// when every attempt fails.
pub(crate) async fn run_transaction<F, Fut, R>(
    firestore: &Firestore,
    options: TransactionOptions,
    mut body: F,
) -> FirestoreResult<R>
where
    F: FnMut(Transaction) -> Fut,
    Fut: Future<Output = FirestoreResult<R>>,
{
    if options.max_attempts == 0 {
        return Err(invalid_argument("max_attempts must be at least 1"));
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        let transaction = Transaction::new(firestore.clone());
        let result = match body(transaction.clone()).await {
            Ok(value) => transaction.commit().await.map(|()| value),
            Err(err) => Err(err),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) && attempt < options.max_attempts => {
                let delay = calculate_backoff(options.retry.backoff(), attempt - 1);
                log::debug!(
                    "Transaction attempt {attempt}/{} failed ({err}); retrying in {delay:?}",
                    options.max_attempts
                );
                runtime::sleep(delay).await;
            }
            Err(err) => {
                log::debug!("Transaction failed after {attempt} attempt(s): {err}");
                return Err(err);
            }
        }
    }
}
