use crate::error::Error;
use log::debug;
use std::future::Future;
use std::time::Duration;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// Doubles after each failure, capped at `max`.
    Exponential { max: Duration },
}

/// Retry settings for scroll page requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Never less than one.
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }
}

/// The last error once every attempt failed.
#[derive(Debug)]
pub struct Exhausted {
    pub attempts: u32,
    pub last: Error,
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub const fn exponential(max_attempts: u32, delay: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Exponential { max },
        }
    }

    const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor).min(max)
            }
        }
    }

    /// Runs `operation` until it succeeds or the attempts run out. The
    /// closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, Exhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = crate::error::Result<T>>,
    {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(last) if attempt >= attempts => return Err(Exhausted { attempts, last }),
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    debug!("Attempt {attempt}/{attempts} failed: {e}. Retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
