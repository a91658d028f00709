//! Fixed-interval retry helpers.
//!
//! `do_with_retry` retries any error. `do_with_retryable_errors` only retries
//! errors whose text matches one of the given patterns and gives up at once on
//! anything else.

use crate::error::RetryError;
use regex::Regex;
use std::fmt::Display;
use std::time::Duration;

/// How long to wait between attempts. Abstracted so the waits can be observed.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub interval: Duration,
}

impl RetryPolicy {
    /// There is always at least one attempt, a `max_attempts` of 0 counts as 1.
    pub fn new(max_attempts: usize, interval: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }
}

/// Runs `action` until it succeeds or `policy.max_attempts` attempts have been made,
/// sleeping `policy.interval` between attempts (never after the last one).
pub fn do_with_retry<T, E, F, S>(
    description: &str,
    policy: RetryPolicy,
    sleeper: &S,
    action: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Result<T, E>,
    S: Sleeper + ?Sized,
{
    retry_loop(description, policy, sleeper, action, |_| true)
}

/// Same as `do_with_retry`, but an error is only retried if its text matches one of
/// `retryable`. Any other error is returned straight away as `RetryError::Fatal`.
pub fn do_with_retryable_errors<T, E, F, S>(
    description: &str,
    policy: RetryPolicy,
    retryable: &[(Regex, &str)],
    sleeper: &S,
    action: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Result<T, E>,
    S: Sleeper + ?Sized,
{
    retry_loop(description, policy, sleeper, action, |err: &E| {
        match matching_reason(&err.to_string(), retryable) {
            Some(reason) => {
                tracing::info!(description, reason, "'{}' hit a known transient error", description);
                true
            }
            None => false,
        }
    })
}

/// Returns the explanation of the first pattern matching `output`.
pub fn matching_reason<'a>(output: &str, retryable: &[(Regex, &'a str)]) -> Option<&'a str> {
    retryable.iter().find(|(re, _)| re.is_match(output)).map(|(_, reason)| *reason)
}

fn retry_loop<T, E, F, S, R>(
    description: &str,
    policy: RetryPolicy,
    sleeper: &S,
    mut action: F,
    mut should_retry: R,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Result<T, E>,
    S: Sleeper + ?Sized,
    R: FnMut(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        tracing::debug!(description, attempt, "attempting");
        let err = match action() {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        if !should_retry(&err) {
            return Err(RetryError::Fatal {
                description: description.to_string(),
                source: err,
            });
        }
        if attempt >= policy.max_attempts {
            tracing::error!(description, attempts = attempt, error = %DisplayChain(&err), "giving up");
            return Err(RetryError::Exhausted {
                description: description.to_string(),
                attempts: attempt,
                last: err,
            });
        }

        tracing::warn!(
            description,
            attempt,
            max_attempts = policy.max_attempts,
            error = %DisplayChain(&err),
            "'{}' failed, sleeping for {:?} and trying again",
            description,
            policy.interval
        );
        sleeper.sleep(policy.interval);
        attempt += 1;
    }
}

/// Renders an error followed by its sources, separated by ": ".
pub struct DisplayChain<'a, E: ?Sized>(pub &'a E);

impl<'a, E: std::error::Error + ?Sized> Display for DisplayChain<'a, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(s) = source {
            write!(f, ": {}", s)?;
            source = s.source();
        }
        Ok(())
    }
}
