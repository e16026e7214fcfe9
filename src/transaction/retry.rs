//! Bounded retry loops
//!
//! Two policies share one backoff curve:
//! - `run`: replays a whole transaction body after a commit conflict, up to
//!   `max_transaction_attempts`, then surfaces `TransactionConflict`.
//! - `read`: retries one idempotent read (lookup, query page) on
//!   unavailable/deadline failures, up to `max_read_attempts`.
//!
//! Writes never go through `read`: once a commit has been sent, an
//! unavailable or deadline failure leaves its outcome unknown.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::client::{RemoteError, RemoteResult};
use crate::config::Config;
use crate::error::{AdapterError, Result};

/// Outcome of one failed attempt
#[derive(Debug)]
pub enum AttemptError {
    /// Optimistic concurrency collision; the body may be replayed
    Conflict(String),
    /// Terminal for this call
    Failed(AdapterError),
}

impl From<AdapterError> for AttemptError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::TransactionConflict { attempts: 0 } => {
                AttemptError::Conflict("conflict raised inside the transaction".to_string())
            }
            other => AttemptError::Failed(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: Config,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_transaction_attempts
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.config.retry_delay(attempt)
    }

    /// Run `body` until it succeeds, fails terminally, or conflicts on
    /// every allowed attempt. `body` receives the 1-based attempt number.
    pub fn run<T, F>(&self, mut body: F) -> Result<T>
    where
        F: FnMut(u32) -> std::result::Result<T, AttemptError>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;
        loop {
            match body(attempt) {
                Ok(value) => return Ok(value),
                Err(AttemptError::Failed(err)) => return Err(err),
                Err(AttemptError::Conflict(reason)) => {
                    if attempt >= max_attempts {
                        warn!(attempts = attempt, %reason, "Transaction retries exhausted");
                        return Err(AdapterError::TransactionConflict { attempts: attempt });
                    }
                    let delay = self.delay(attempt);
                    warn!(attempt, ?delay, %reason, "Transaction conflict, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    /// Retry an idempotent read on transient backend failures
    pub fn read<T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> RemoteResult<T>,
    {
        let max_attempts = self.config.max_read_attempts;
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err @ (RemoteError::Unavailable(_) | RemoteError::DeadlineExceeded(_)))
                    if attempt < max_attempts =>
                {
                    let delay = self.delay(attempt);
                    warn!(rpc = what, attempt, ?delay, %err, "Transient read failure, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
