use crate::error::{Error, Result};
use crate::retry::{RetryScale, DEFAULT_JITTER};

/// Default chunk size: 6 MiB per PATCH request.
pub const DEFAULT_CHUNK_BYTES: usize = 6 * 1024 * 1024;

/// Default cap on retry attempts per session.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Policy constants fixed for the lifetime of an upload session.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Upper bound on the bytes sent per PATCH request.
    pub max_chunk_bytes: usize,
    /// Failures tolerated before the session fails fatally.
    pub max_retries: u32,
    /// Growth of the retry cooldown across attempts.
    pub retry_scale: RetryScale,
    /// Cooldown in seconds before the first retry; zero disables waiting.
    pub first_retry_cooldown_s: u32,
    /// Random spread applied to retry cooldowns.
    pub retry_jitter: f64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_chunk_bytes: DEFAULT_CHUNK_BYTES,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_scale: RetryScale::Exponential,
            first_retry_cooldown_s: 0,
            retry_jitter: DEFAULT_JITTER,
        }
    }
}

impl ClientOptions {
    /// Checks the options are usable.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `max_chunk_bytes` is zero
    /// - `retry_jitter` is negative or not finite
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_bytes == 0 {
            return Err(Error::Config(
                "chunk size must be at least one byte".to_string(),
            ));
        }
        if !self.retry_jitter.is_finite() || self.retry_jitter < 0.0 {
            return Err(Error::Config(format!(
                "retry jitter must be a non-negative number, got {}",
                self.retry_jitter
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ClientOptions::default().validate().unwrap();
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let options = ClientOptions {
            max_chunk_bytes: 0,
            ..ClientOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn negative_jitter_is_rejected() {
        let options = ClientOptions {
            retry_jitter: -0.5,
            ..ClientOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
