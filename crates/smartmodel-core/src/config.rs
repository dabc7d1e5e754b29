use std::time::Duration;

use crate::traits::ResponseMode;

/// Retries after the first attempt, matching the historical attempt cap.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Delay schedule between consecutive attempts.
///
/// Retry `n` (1-indexed) waits `initial * multiplier^(n-1)`, capped at `max`.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            multiplier: 2.0,
            max: Duration::from_secs(4),
        }
    }
}

impl Backoff {
    /// Retry immediately.
    pub fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            multiplier: 1.0,
            max: Duration::ZERO,
        }
    }

    pub fn constant(delay: Duration) -> Self {
        Self {
            initial: delay,
            multiplier: 1.0,
            max: delay,
        }
    }

    /// Delay before retry number `retry` (1-indexed; 0 means no wait).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 || self.initial.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = self.initial.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Per-call configuration of the extraction loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    /// Retries allowed after the first attempt; total calls are `max_retries + 1`.
    pub max_retries: u32,
    /// Hint forwarded to the model client on every call.
    pub response_mode: ResponseMode,
    pub backoff: Backoff,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            response_mode: ResponseMode::Json,
            backoff: Backoff::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = mode;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Upper bound on model calls for one extraction.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}
