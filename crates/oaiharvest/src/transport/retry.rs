//! Retry with a fixed, interruptible wait between attempts.

use std::cell::Cell;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use backon::{BlockingRetryable, ConstantBuilder};
use tracing::{debug, warn};

use oaiharvest_core::{Error, Result, TransportError};

/// How often and how patiently a failed request is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    number_of_retries: u32,
    time_between_retries: Duration,
}

impl RetryPolicy {
    pub fn new(number_of_retries: u32, time_between_retries: Duration) -> Self {
        Self {
            number_of_retries,
            time_between_retries,
        }
    }

    pub fn number_of_retries(&self) -> u32 {
        self.number_of_retries
    }

    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.time_between_retries)
            .with_max_times(self.number_of_retries as usize)
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// `number_of_retries + 1` attempts have failed.
    ///
    /// The attempt number (starting at 1) is passed to `attempt`. Once the
    /// interrupter is set no further attempt is made and
    /// [`TransportError::Interrupted`] is returned.
    pub fn run<T, F>(&self, interrupter: &Interrupter, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let attempts = self.number_of_retries.saturating_add(1);
        let number = Cell::new(0u32);
        let waiter = interrupter.clone();

        let try_once = || {
            if interrupter.is_interrupted() {
                debug!(after = number.get(), "Retry wait interrupted");
                return Err(Error::from(TransportError::Interrupted));
            }
            number.set(number.get() + 1);
            attempt(number.get())
        };

        try_once
            .retry(self.backoff())
            .sleep(move |delay: Duration| {
                waiter.sleep(delay);
            })
            .when(Error::is_retryable)
            .notify(|err: &Error, delay: Duration| {
                warn!(
                    attempt = number.get(),
                    of = attempts,
                    error = %err,
                    "Request failed, retrying in {:?}",
                    delay
                );
            })
            .call()
    }
}

/// Cancels retry waits from another thread.
///
/// Clones share the same flag. Once interrupted, the flag stays set: every
/// later wait returns immediately. Each [`HttpConnection`](super::HttpConnection)
/// owns a fresh one, so cancelling one connection never touches another.
#[derive(Debug, Clone, Default)]
pub struct Interrupter {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake every current waiter and make later waits return immediately.
    pub fn interrupt(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_interrupted(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `duration` unless interrupted. Returns true if interrupted.
    ///
    /// A duration past the end of the clock waits until interrupted.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let deadline = Instant::now().checked_add(duration);
        let mut interrupted = flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*interrupted {
            interrupted = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    condvar
                        .wait_timeout(interrupted, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => condvar.wait(interrupted).unwrap_or_else(PoisonError::into_inner),
            };
        }
        true
    }
}
