//! Exponential backoff between watch reconnects.

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

/// Bounds of a [`Backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry, and after every reset. Zero is raised to
    /// [`Backoff::FLOOR`].
    pub min: Duration,
    /// Upper bound of any delay. Values below `min` are raised to `min`.
    pub max: Duration,
    /// Adds up to 10% random jitter to each doubled delay.
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(30),
            jitter: true,
        }
    }
}

/// Stateful exponential backoff.
///
/// The first delay after construction or [`Backoff::reset`] is `min`; each following
/// delay doubles the previous one, plus optional jitter, capped at `max`.
///
/// ```
/// use std::time::Duration;
/// use spiffe_workload::{Backoff, BackoffConfig};
///
/// let mut backoff = Backoff::new(BackoffConfig {
///     min: Duration::from_millis(100),
///     max: Duration::from_millis(500),
///     jitter: false,
/// });
///
/// assert_eq!(backoff.next(), Duration::from_millis(100));
/// assert_eq!(backoff.next(), Duration::from_millis(200));
/// assert_eq!(backoff.next(), Duration::from_millis(400));
/// assert_eq!(backoff.next(), Duration::from_millis(500));
///
/// backoff.reset();
/// assert_eq!(backoff.next(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    jitter: bool,
    previous: Option<Duration>,
}

impl Backoff {
    /// Smallest first delay; a zero delay could never grow.
    pub const FLOOR: Duration = Duration::from_millis(1);

    /// Creates a backoff in its initial state.
    pub fn new(config: BackoffConfig) -> Self {
        let min = if config.min.is_zero() {
            Self::FLOOR
        } else {
            config.min
        };
        Self {
            min,
            max: config.max.max(min),
            jitter: config.jitter,
            previous: None,
        }
    }

    /// Returns the delay to wait before the next attempt and advances the state.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Duration {
        let delay = match self.previous {
            None => self.min,
            Some(previous) => self.grow(previous),
        };
        self.previous = Some(delay);
        delay
    }

    /// Returns to the initial state: the next delay is `min` again.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    fn grow(&self, previous: Duration) -> Duration {
        let base = previous.saturating_mul(2).min(self.max);
        let jitter = if self.jitter {
            base.mul_f64(fastrand::f64() / 10.0)
        } else {
            Duration::ZERO
        };

        base.saturating_add(jitter).min(self.max).max(previous)
    }
}

/// Waits out backoff delays.
///
/// Watches sleep through this trait so tests can observe the requested delays
/// without waiting for them.
pub trait Sleeper: Send + Sync + fmt::Debug {
    /// Completes after `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}
