pub mod engine;

pub use engine::{Upload, UploadControl, UploadOutcome};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::ClientOptions;
use crate::error::Result;
use crate::source::FileSource;
use crate::store::UploadStore;

/// Receives session lifecycle notifications.
///
/// Every method defaults to a no-op, so implementors only override what
/// they care about. `()` implements the trait for callers that want no
/// notifications at all.
pub trait UploadObserver: Send + Sync {
    /// Transfer is about to begin. `eta` is present when a bandwidth
    /// measurement is available.
    fn on_start(&self, eta: Option<Duration>) {
        let _ = eta;
    }

    /// Fired once per server-acknowledged chunk.
    fn on_progress(&self, percent: f64, eta: Option<Duration>) {
        let _ = (percent, eta);
    }

    /// Fired exactly once, when the server holds every byte.
    fn on_complete(&self) {}
}

impl UploadObserver for () {}

/// Owns the wait between retry attempts.
///
/// After a failed chunk the engine computes a suggested cooldown and hands
/// it to the hook; the hook sleeps (or applies a policy of its own) and
/// returns `true` to re-enter the transfer loop. Returning `false`, or
/// configuring no hook at all, makes the failure fatal.
#[async_trait]
pub trait RetryHook: Send + Sync {
    /// `attempt` counts failures from zero; `wait` is the suggested
    /// cooldown for this attempt.
    async fn backoff(&self, attempt: u32, wait: Duration) -> bool;
}

/// Hook that sleeps the suggested cooldown and always retries.
pub struct SleepRetry;

#[async_trait]
impl RetryHook for SleepRetry {
    async fn backoff(&self, _attempt: u32, wait: Duration) -> bool {
        tokio::time::sleep(wait).await;
        true
    }
}

/// Upload a file to a tus endpoint with default policy, retrying with the
/// configured backoff until `max_retries` is exhausted.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be opened or read
/// - The server violates the upload protocol
/// - The transfer keeps failing past the retry budget
pub async fn upload_file(
    path: impl AsRef<Path>,
    endpoint: Url,
    options: ClientOptions,
    store: Option<Arc<dyn UploadStore>>,
) -> Result<UploadOutcome> {
    let source = FileSource::open(path.as_ref()).await?;
    let mut upload = Upload::new(source, endpoint, options)?;
    if let Some(store) = store {
        upload = upload.with_store(store);
    }
    upload.upload(&(), Some(&SleepRetry), false).await
}
