//! Capped, accelerating backoff around a single logical operation.
//!
//! [`Retry::run`] drives an attempt closure until it succeeds, fails with an
//! error that is not worth retrying, runs out of attempts, or is canceled.
//! Sleeps between attempts grow by an increasing step (1, 3, 6, 10, 15 …
//! seconds with the default [`Config`]) and are taken in short slices so a
//! cancel is noticed promptly.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{Config, S3Error};

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per call, the first one included
    pub max_attempts: u32,
    /// Sleep before the second attempt
    pub initial_delay: Duration,
    /// First increment of the sleep
    pub initial_step: Duration,
    /// Growth of the increment after each sleep
    pub step_growth: Duration,
    /// Sleep slice between cancellation checks
    pub poll_interval: Duration,
}

impl RetryPolicy {
    /// Take the backoff parameters from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: config.initial_delay,
            initial_step: config.initial_step,
            step_growth: config.step_growth,
            poll_interval: config.cancel_poll_interval,
        }
    }

    /// The sleeps taken between consecutive attempts, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let mut delay = self.initial_delay;
        let mut step = self.initial_step;
        let growth = self.step_growth;
        std::iter::repeat_with(move || {
            let current = delay;
            delay += step;
            step += growth;
            current
        })
        .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Notifications emitted while an operation is retried.
pub trait RetryObserver: Send + Sync + std::fmt::Debug {
    /// Attempt number `attempt` is about to start after sleeping `delay`
    /// because the previous one failed with `error`.
    fn retrying(&self, attempt: u32, error: &S3Error, delay: Duration) {
        let _ = (attempt, error, delay);
    }

    /// The attempt cap was reached; `error` is what the last attempt returned.
    fn exceeded(&self, attempts: u32, error: &S3Error) {
        let _ = (attempts, error);
    }

    /// The operation was canceled before or between attempts.
    fn canceled(&self) {}

    /// The operation produced its terminal result.
    fn finished(&self, attempts: u32, result: Result<(), &S3Error>) {
        let _ = (attempts, result);
    }
}

/// [`RetryObserver`] that reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn retrying(&self, attempt: u32, error: &S3Error, delay: Duration) {
        warn!(attempt, error = %error, delay_ms = delay.as_millis() as u64, "Retrying");
    }

    fn exceeded(&self, attempts: u32, error: &S3Error) {
        warn!(attempts, error = %error, "Retries exceeded");
    }

    fn canceled(&self) {
        debug!("Operation canceled");
    }

    fn finished(&self, attempts: u32, result: Result<(), &S3Error>) {
        match result {
            Ok(()) => debug!(attempts, "Operation succeeded"),
            Err(error) => debug!(attempts, error = %error, "Operation failed"),
        }
    }
}

/// State of one logical call.
#[derive(Debug)]
struct RetryState<I> {
    attempts: u32,
    delays: I,
    access_denied_retried: bool,
}

impl<I: Iterator<Item = Duration>> RetryState<I> {
    fn should_retry(&mut self, error: &S3Error) -> bool {
        if error.is_transient() {
            return true;
        }
        if error.is_access_denied() && !self.access_denied_retried {
            self.access_denied_retried = true;
            return true;
        }
        false
    }
}

/// Retry driver bound to a policy and an observer.
#[derive(Debug, Clone, Copy)]
pub struct Retry<'a> {
    policy: &'a RetryPolicy,
    observer: &'a dyn RetryObserver,
}

impl<'a> Retry<'a> {
    /// Create a driver.
    pub fn new(policy: &'a RetryPolicy, observer: &'a dyn RetryObserver) -> Self {
        Self { policy, observer }
    }

    /// Run `attempt` until it yields a terminal result.
    ///
    /// The closure receives the 1-based attempt number. A
    /// [`S3Error::Canceled`] from the closure or a cancel of `cancel` ends
    /// the call with [`S3Error::Canceled`] without any further attempts.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut attempt: F) -> Result<T, S3Error>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, S3Error>>,
    {
        let mut state = RetryState {
            attempts: 0,
            delays: self.policy.delays(),
            access_denied_retried: false,
        };

        loop {
            if cancel.is_cancelled() {
                self.observer.canceled();
                return Err(S3Error::Canceled);
            }

            state.attempts += 1;
            let error = match attempt(state.attempts).await {
                Ok(value) => {
                    self.observer.finished(state.attempts, Ok(()));
                    return Ok(value);
                }
                Err(S3Error::Canceled) => {
                    self.observer.canceled();
                    return Err(S3Error::Canceled);
                }
                Err(error) => error,
            };

            if !state.should_retry(&error) {
                self.observer.finished(state.attempts, Err(&error));
                return Err(error);
            }

            let Some(delay) = state.delays.next() else {
                self.observer.exceeded(state.attempts, &error);
                return Err(error);
            };

            if sleep(delay, self.policy.poll_interval, cancel).await.is_err() {
                self.observer.canceled();
                return Err(S3Error::Canceled);
            }

            self.observer.retrying(state.attempts + 1, &error, delay);
        }
    }
}

/// Sleep for `duration` in slices of at most `slice`, giving up as soon as
/// `cancel` fires.
pub async fn sleep(
    duration: Duration,
    slice: Duration,
    cancel: &CancellationToken,
) -> Result<(), S3Error> {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return Err(S3Error::Canceled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        tokio::time::sleep(slice.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl RetryObserver for Recorder {
        fn retrying(&self, attempt: u32, _error: &S3Error, delay: Duration) {
            self.events
                .lock()
                .push(format!("retrying {} after {}s", attempt, delay.as_secs()));
        }

        fn exceeded(&self, attempts: u32, _error: &S3Error) {
            self.events.lock().push(format!("exceeded {}", attempts));
        }

        fn canceled(&self) {
            self.events.lock().push("canceled".into());
        }

        fn finished(&self, attempts: u32, result: Result<(), &S3Error>) {
            self.events
                .lock()
                .push(format!("finished {} {}", attempts, result.is_ok()));
        }
    }

    #[test]
    fn it_grows_delays_by_an_accelerating_step() {
        let delays: Vec<u64> = RetryPolicy::default().delays().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 3, 6, 10, 15, 21, 28]);
    }

    #[tokio::test(start_paused = true)]
    async fn it_sleeps_the_exact_schedule_and_stops_at_the_cap() {
        let policy = RetryPolicy::default();
        let recorder = Recorder::default();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), S3Error> = Retry::new(&policy, &recorder)
            .run(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(S3Error::ServiceUnavailable) }
            })
            .await;

        assert_eq!(result, Err(S3Error::ServiceUnavailable));
        assert_eq!(calls.load(Ordering::SeqCst), 8);
        let slept = start.elapsed();
        assert!(slept >= Duration::from_secs(84));
        assert!(slept < Duration::from_secs(85));
        assert_eq!(
            recorder.events(),
            vec![
                "retrying 2 after 1s",
                "retrying 3 after 3s",
                "retrying 4 after 6s",
                "retrying 5 after 10s",
                "retrying 6 after 15s",
                "retrying 7 after 21s",
                "retrying 8 after 28s",
                "exceeded 8",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn it_retries_access_denied_exactly_once() {
        let policy = RetryPolicy::default();
        let recorder = Recorder::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), S3Error> = Retry::new(&policy, &recorder)
            .run(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(S3Error::AccessDenied) }
            })
            .await;

        assert_eq!(result, Err(S3Error::AccessDenied));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(recorder.events(), vec!["retrying 2 after 1s", "finished 2 false"]);
    }

    #[tokio::test(start_paused = true)]
    async fn it_does_not_grant_a_second_access_denied_retry_after_transient_failures() {
        let policy = RetryPolicy::default();
        let recorder = Recorder::default();
        let script = Mutex::new(vec![
            S3Error::AccessDenied,
            S3Error::Timeout,
            S3Error::SignatureMismatch,
        ]);

        let result: Result<(), S3Error> = Retry::new(&policy, &recorder)
            .run(&CancellationToken::new(), |_| {
                let error = script.lock().remove(0);
                async move { Err(error) }
            })
            .await;

        assert_eq!(result, Err(S3Error::SignatureMismatch));
        assert_eq!(recorder.events().last().map(String::as_str), Some("finished 3 false"));
    }

    #[tokio::test(start_paused = true)]
    async fn it_returns_the_first_success() {
        let policy = RetryPolicy::default();
        let recorder = Recorder::default();

        let result = Retry::new(&policy, &recorder)
            .run(&CancellationToken::new(), |attempt| async move {
                if attempt < 3 {
                    Err(S3Error::Timeout)
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(
            recorder.events(),
            vec!["retrying 2 after 1s", "retrying 3 after 3s", "finished 3 true"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn it_does_not_retry_permanent_failures() {
        let policy = RetryPolicy::default();
        let recorder = Recorder::default();

        let result: Result<(), S3Error> = Retry::new(&policy, &recorder)
            .run(&CancellationToken::new(), |_| async {
                Err(S3Error::ObjectNotFound)
            })
            .await;

        assert_eq!(result, Err(S3Error::ObjectNotFound));
        assert_eq!(recorder.events(), vec!["finished 1 false"]);
    }

    #[tokio::test(start_paused = true)]
    async fn it_notices_cancellation_within_one_poll_slice() {
        let policy = RetryPolicy::default();
        let recorder = Arc::new(Recorder::default());
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(2_500)).await;
                cancel.cancel();
            })
        };

        let result: Result<(), S3Error> = Retry::new(&policy, recorder.as_ref())
            .run(&cancel, |_| async { Err(S3Error::Timeout) })
            .await;
        let _ = canceller.await;

        assert_eq!(result, Err(S3Error::Canceled));
        // The second sleep spans 1s..4s; the cancel lands at 2.5s.
        assert!(start.elapsed() <= Duration::from_millis(2_700));
        assert_eq!(
            recorder.events(),
            vec!["retrying 2 after 1s", "canceled"]
        );
    }

    #[tokio::test]
    async fn it_never_attempts_when_canceled_up_front() {
        let policy = RetryPolicy::default();
        let recorder = Recorder::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);

        let result: Result<(), S3Error> = Retry::new(&policy, &recorder)
            .run(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert_eq!(result, Err(S3Error::Canceled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.events(), vec!["canceled"]);
    }

    #[tokio::test]
    async fn it_reports_cancellation_from_the_attempt_itself() {
        let policy = RetryPolicy::default();
        let recorder = Recorder::default();

        let result: Result<(), S3Error> = Retry::new(&policy, &recorder)
            .run(&CancellationToken::new(), |_| async { Err(S3Error::Canceled) })
            .await;

        assert_eq!(result, Err(S3Error::Canceled));
        assert_eq!(recorder.events(), vec!["canceled"]);
    }
}
