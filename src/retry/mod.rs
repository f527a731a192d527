use crate::backend::{BackendError, TransientKind};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Backoff for transient hub failures.
///
/// A "connection broken" failure waits 5s and a "timed out" failure waits 60s
/// before the next attempt. Consecutive retries double the wait up to
/// `max_delay`, and `max_attempts` bounds the loop unless it is `None`.
/// The wait is cut short when the [`CancelToken`] fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub connection_broken_delay: Duration,
    pub timed_out_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
    /// Total attempts including the first; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connection_broken_delay: Duration::from_secs(5),
            timed_out_delay: Duration::from_secs(60),
            multiplier: 2,
            max_delay: Duration::from_secs(600),
            max_attempts: Some(crate::envconfig::DEFAULT_MAX_RETRIES),
        }
    }
}

impl RetryPolicy {
    /// Fixed 5s/60s waits, retried without limit.
    pub fn unbounded() -> Self {
        Self {
            multiplier: 1,
            max_attempts: None,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Wait before the retry that follows the `retry`-th transient failure (0-based).
    pub fn delay_for(&self, kind: TransientKind, retry: u32) -> Duration {
        let base = match kind {
            TransientKind::ConnectionBroken => self.connection_broken_delay,
            TransientKind::TimedOut => self.timed_out_delay,
        };
        let factor = self.multiplier.max(1).saturating_pow(retry);
        base.saturating_mul(factor).min(self.max_delay.max(base))
    }
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

/// Cloneable flag that interrupts a backoff wait from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self.state.cancelled.lock();
        *cancelled = true;
        self.state.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock()
    }

    /// Blocks for up to `timeout`. Returns `true` if cancelled meanwhile.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.state.cancelled.lock();
        while !*cancelled {
            if self.state.signal.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

pub trait Sleeper: Send + Sync {
    /// Sleeps for `duration` unless `cancel` fires first. Returns `false` when cancelled.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool;
}

/// Blocks the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        !cancel.wait_timeout(duration)
    }
}

#[derive(Debug)]
pub enum RetryError {
    Fatal(BackendError),
    Exhausted { attempts: u32, last: BackendError },
    Cancelled { waited: Duration },
}

/// A transient failure about to be retried.
#[derive(Debug, Clone)]
pub struct RetryNotice<'a> {
    pub attempt: u32,
    pub kind: TransientKind,
    pub delay: Duration,
    pub error: &'a BackendError,
}

/// Runs `op` until it succeeds, fails fatally, runs out of attempts or is cancelled.
pub fn run<T, F, N>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancelToken,
    mut on_retry: N,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Result<T, BackendError>,
    N: FnMut(&RetryNotice<'_>),
{
    let mut attempt = 1u32;
    let mut waited = Duration::ZERO;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { waited });
        }

        let err = match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let kind = match err.transient_kind() {
            Some(kind) => kind,
            None => return Err(RetryError::Fatal(err)),
        };

        if policy.max_attempts.is_some_and(|max| attempt >= max) {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let delay = policy.delay_for(kind, attempt - 1);
        on_retry(&RetryNotice {
            attempt,
            kind,
            delay,
            error: &err,
        });

        if !sleeper.sleep(delay, cancel) {
            return Err(RetryError::Cancelled { waited });
        }
        waited += delay;
        attempt += 1;
    }
}
