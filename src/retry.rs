//! Pacing of retry attempts after failed chunk transfers.

use std::time::Duration;

use rand::Rng;

use crate::error::Error;

/// Fraction by which an interval may randomly grow or shrink when the caller
/// does not pick a jitter of their own.
pub const DEFAULT_JITTER: f64 = 0.5;

/// How the base cooldown grows across consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryScale {
    /// Same cooldown for every attempt.
    Constant,
    /// Cooldown grows by the base amount each attempt.
    Linear,
    /// Cooldown doubles each attempt.
    #[default]
    Exponential,
}

impl RetryScale {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            RetryScale::Constant => "constant",
            RetryScale::Linear => "linear",
            RetryScale::Exponential => "exponential",
        }
    }
}

impl std::str::FromStr for RetryScale {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "constant" => Ok(RetryScale::Constant),
            "linear" => Ok(RetryScale::Linear),
            "exponential" => Ok(RetryScale::Exponential),
            _ => Err(Error::Config(format!(
                "Invalid retry scale: '{s}'. Valid scales are: constant, linear, exponential"
            ))),
        }
    }
}

/// Wait duration before re-attempting after the `attempt`-th failure
/// (0-indexed), with the default jitter applied.
pub fn interval(attempt: u32, base_s: u32, scale: RetryScale) -> Duration {
    interval_with_jitter(attempt, base_s, scale, DEFAULT_JITTER)
}

/// Like [`interval`], with an explicit jitter fraction.
///
/// The jitter multiplies the already-scaled base by a uniform factor in
/// `[1 - jitter, 1 + jitter)`, so a jitter of 0.5 may halve the wait or grow
/// it by half. The result is truncated to whole seconds. A zero base always
/// yields a zero wait.
pub fn interval_with_jitter(attempt: u32, base_s: u32, scale: RetryScale, jitter: f64) -> Duration {
    if base_s == 0 {
        return Duration::ZERO;
    }

    let base = if attempt == 0 {
        f64::from(base_s)
    } else {
        match scale {
            RetryScale::Constant => f64::from(base_s),
            RetryScale::Linear => f64::from(attempt + 1) * f64::from(base_s),
            RetryScale::Exponential => f64::from(base_s) * 2f64.powi(attempt as i32),
        }
    };

    let factor = if jitter == 0.0 {
        1.0
    } else {
        1.0 + jitter * (2.0 * rand::thread_rng().gen::<f64>() - 1.0)
    };

    let secs = (base * factor).floor().max(0.0);
    Duration::from_secs(secs as u64)
}
