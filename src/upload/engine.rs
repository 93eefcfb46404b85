//! The upload state machine: resolve or create the server-side resource,
//! synchronize the byte offset, and drive sequential chunk transfers with
//! pause, cancel and bounded retry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use url::Url;

use crate::api::{Client, HttpTransport, ReqwestTransport};
use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::metadata::{encode_metadata, fingerprint};
use crate::retry::interval_with_jitter;
use crate::source::UploadSource;
use crate::speed::SpeedProbe;
use crate::store::UploadStore;
use crate::upload::{RetryHook, UploadObserver};

/// Terminal state of a finished [`Upload::upload`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The server acknowledged every byte.
    Completed,
    /// The session stopped at a chunk boundary; calling `upload()` again
    /// resumes from the server-held offset.
    Paused,
    /// The session was cancelled and its store entry removed.
    Cancelled,
}

#[derive(Clone, Default)]
struct ControlFlags {
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl ControlFlags {
    fn reset(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cheaply clonable pause/cancel handle for a running session.
///
/// Both operations are cooperative: a chunk already on the wire finishes
/// its response cycle, then the transfer loop exits before the next one.
#[derive(Clone)]
pub struct UploadControl {
    flags: ControlFlags,
    store: Option<Arc<dyn UploadStore>>,
    fingerprint: String,
}

impl UploadControl {
    /// Stop sending at the next chunk boundary. Returns `false` when the
    /// session was already paused.
    pub fn pause(&self) -> bool {
        !self.flags.paused.swap(true, Ordering::SeqCst)
    }

    /// Abandon the upload: pause and drop the persisted handle so the next
    /// run starts fresh. Returns `false` when already cancelled.
    pub fn cancel(&self) -> bool {
        let newly_cancelled = !self.flags.cancelled.swap(true, Ordering::SeqCst);
        self.flags.paused.store(true, Ordering::SeqCst);
        if newly_cancelled {
            if let Some(store) = &self.store {
                if let Err(e) = store.delete(&self.fingerprint) {
                    warn!("could not drop store entry for {}: {e}", self.fingerprint);
                }
            }
        }
        newly_cancelled
    }
}

/// A single upload session.
///
/// Holds the payload, the policy constants and the transfer state. One
/// session drives one server resource; chunks are strictly sequential.
pub struct Upload<S> {
    source: S,
    endpoint: Url,
    transport: Arc<dyn HttpTransport>,
    client: Client,
    options: ClientOptions,
    store: Option<Arc<dyn UploadStore>>,
    fingerprint: String,
    metadata: HashMap<String, String>,
    headers: Vec<(String, String)>,
    file_size: u64,
    encoded_metadata: String,
    upload_uri: Option<Url>,
    offset: u64,
    attempt: u32,
    upload_speed_mbps: Option<f64>,
    flags: ControlFlags,
}

impl<S: UploadSource> Upload<S> {
    /// Create a session for `source`, registering new uploads at
    /// `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if `options` fails validation.
    pub fn new(source: S, endpoint: Url, options: ClientOptions) -> Result<Self> {
        options.validate()?;
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());
        let derived_fingerprint = fingerprint(source.path());
        let file_size = source.len();
        Ok(Self {
            source,
            endpoint,
            client: Client::new(transport.clone()),
            transport,
            options,
            store: None,
            fingerprint: derived_fingerprint,
            metadata: HashMap::new(),
            headers: Vec::new(),
            file_size,
            encoded_metadata: String::new(),
            upload_uri: None,
            offset: 0,
            attempt: 0,
            upload_speed_mbps: None,
            flags: ControlFlags::default(),
        })
    }

    /// Persist the resource handle so the upload survives a restart.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn UploadStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the default reqwest transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.client = Client::new(transport.clone());
        self.transport = transport;
        self
    }

    /// Override the fingerprint derived from the source path.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    /// Metadata sent in the `Upload-Metadata` header at create time.
    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self.encoded_metadata.clear();
        self
    }

    /// Extra headers merged into create and chunk requests.
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Next byte index to send, as last acknowledged by the server.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub fn upload_uri(&self) -> Option<&Url> {
        self.upload_uri.as_ref()
    }

    /// Pause/cancel handle usable from another task.
    #[must_use]
    pub fn control(&self) -> UploadControl {
        UploadControl {
            flags: self.flags.clone(),
            store: self.store.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }

    /// Stop sending at the next chunk boundary.
    pub fn pause(&self) -> bool {
        self.control().pause()
    }

    /// Abandon the upload and drop the persisted handle.
    pub fn cancel(&self) -> bool {
        self.control().cancel()
    }

    /// True when a store is configured and holds an entry for this file.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        self.store
            .as_ref()
            .is_some_and(|store| matches!(store.get(&self.fingerprint), Ok(Some(_))))
    }

    /// Register the upload with the server without sending any bytes.
    ///
    /// The server-assigned URI is persisted in the store (when one is
    /// configured) under this session's fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the create request fails, the response carries
    /// no usable `Location`, or the store rejects the new entry.
    pub async fn create_upload(&mut self) -> Result<()> {
        self.ensure_encoded_metadata();
        let upload_uri = self
            .client
            .create(
                &self.endpoint,
                self.file_size,
                &self.encoded_metadata,
                &self.headers,
            )
            .await?;

        if let Some(store) = &self.store {
            store.put(&self.fingerprint, upload_uri.as_str())?;
        }
        self.upload_uri = Some(upload_uri);
        Ok(())
    }

    /// Drive the transfer until it completes, pauses, is cancelled, or
    /// fails past the retry budget.
    ///
    /// A failed chunk is only retried when `retry_hook` is present: the
    /// engine computes the cooldown, the hook owns the sleep. Each retry
    /// re-probes the server offset before transmitting, so partial writes
    /// on the server never desynchronize the session.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The payload cannot be read
    /// - The server violates the protocol (bad status, missing headers,
    ///   diverged offset)
    /// - Failures exceed `max_retries`, or no retry hook is configured
    pub async fn upload(
        &mut self,
        observer: &dyn UploadObserver,
        retry_hook: Option<&dyn RetryHook>,
        measure_speed: bool,
    ) -> Result<UploadOutcome> {
        self.flags.reset();
        self.attempt = 0;
        self.ensure_encoded_metadata();

        if measure_speed && self.upload_speed_mbps.is_none() {
            self.upload_speed_mbps = SpeedProbe::default().measure(self.transport.as_ref()).await;
        }

        self.resolve_upload_uri().await?;

        let mut started = false;
        loop {
            match self.transmit(observer, &mut started).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if self.attempt >= self.options.max_retries => return Err(err),
                Err(err) => {
                    let failed_attempt = self.attempt;
                    let wait = interval_with_jitter(
                        failed_attempt,
                        self.options.first_retry_cooldown_s,
                        self.options.retry_scale,
                        self.options.retry_jitter,
                    );
                    self.attempt += 1;

                    let Some(hook) = retry_hook else {
                        return Err(err);
                    };
                    warn!(
                        "chunk transfer failed (attempt {failed_attempt}): {err}; retrying in {}s",
                        wait.as_secs()
                    );
                    if !hook.backoff(failed_attempt, wait).await {
                        return Err(err);
                    }
                }
            }
        }
    }

    /// One pass of the transmit loop: probe the authoritative offset, then
    /// send chunks until done, paused or cancelled.
    async fn transmit(
        &mut self,
        observer: &dyn UploadObserver,
        started: &mut bool,
    ) -> Result<UploadOutcome> {
        let upload_uri = match &self.upload_uri {
            Some(uri) => uri.clone(),
            None => return Err(Error::protocol("upload Uri not resolved")),
        };

        self.offset = self.client.offset(&upload_uri).await?;

        let timer = Instant::now();
        let baseline = self.offset;

        if !*started {
            *started = true;
            observer.on_start(self.initial_eta());
        }

        while self.offset < self.file_size {
            if self.flags.is_cancelled() {
                info!("upload of {} cancelled at offset {}", self.fingerprint, self.offset);
                return Ok(UploadOutcome::Cancelled);
            }
            if self.flags.is_paused() {
                debug!("upload of {} paused at offset {}", self.fingerprint, self.offset);
                return Ok(UploadOutcome::Paused);
            }

            let chunk = self
                .source
                .read_chunk(self.offset, self.options.max_chunk_bytes)
                .await?;
            let expected = self.offset + chunk.len() as u64;

            let acknowledged = self
                .client
                .patch(&upload_uri, self.offset, chunk, &self.headers)
                .await?;

            if acknowledged != expected {
                return Err(Error::protocol(format!(
                    "offset mismatch: server={acknowledged}, expected={expected}"
                )));
            }

            self.offset = acknowledged;
            self.attempt = 0;
            observer.on_progress(self.percent(), self.eta(timer.elapsed(), self.offset - baseline));
        }

        // The server holds everything; the persisted handle is stale now.
        if let Some(store) = &self.store {
            if let Err(e) = store.delete(&self.fingerprint) {
                warn!("could not drop store entry for {}: {e}", self.fingerprint);
            }
        }
        info!(
            "upload of {} complete ({} bytes)",
            self.fingerprint, self.file_size
        );
        observer.on_complete();
        Ok(UploadOutcome::Completed)
    }

    /// Adopt the stored resource URI when one exists, otherwise create a
    /// fresh upload. Within a session the URI is resolved at most once.
    async fn resolve_upload_uri(&mut self) -> Result<()> {
        if self.upload_uri.is_some() {
            return Ok(());
        }

        if let Some(store) = &self.store {
            if let Some(stored) = store.get(&self.fingerprint)? {
                match Url::parse(&stored) {
                    Ok(uri) => {
                        debug!("resuming {} from stored uri {uri}", self.fingerprint);
                        self.upload_uri = Some(uri);
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(
                            "ignoring unparseable stored uri for {}: {e}",
                            self.fingerprint
                        );
                    }
                }
            }
        }

        self.create_upload().await
    }

    fn ensure_encoded_metadata(&mut self) {
        if self.encoded_metadata.is_empty() {
            self.encoded_metadata = encode_metadata(&self.metadata, self.source.path());
        }
    }

    fn percent(&self) -> f64 {
        if self.file_size == 0 {
            return 100.0;
        }
        (100.0 * self.offset as f64 / self.file_size as f64).clamp(0.0, 100.0)
    }

    fn initial_eta(&self) -> Option<Duration> {
        let mbps = self.upload_speed_mbps.filter(|mbps| *mbps > 0.0)?;
        Some(Duration::from_secs_f64(
            self.file_size as f64 / (mbps * 1e6),
        ))
    }

    /// Remaining time from measured bandwidth when available, otherwise
    /// from the throughput observed since the last offset probe.
    fn eta(&self, elapsed: Duration, bytes_sent: u64) -> Option<Duration> {
        let remaining = self.file_size.saturating_sub(self.offset);
        if let Some(mbps) = self.upload_speed_mbps.filter(|mbps| *mbps > 0.0) {
            return Some(Duration::from_secs_f64(remaining as f64 / (mbps * 1e6)));
        }

        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 || bytes_sent == 0 {
            return None;
        }
        let bytes_per_sec = bytes_sent as f64 / secs;
        Some(Duration::from_secs_f64(remaining as f64 / bytes_per_sec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};

    struct BytesSource {
        path: PathBuf,
        bytes: Vec<u8>,
    }

    #[async_trait]
    impl UploadSource for BytesSource {
        fn len(&self) -> u64 {
            self.bytes.len() as u64
        }

        fn path(&self) -> &Path {
            &self.path
        }

        async fn read_chunk(&mut self, offset: u64, max_bytes: usize) -> Result<Vec<u8>> {
            let end = self.bytes.len().min(offset as usize + max_bytes);
            Ok(self.bytes[offset as usize..end].to_vec())
        }
    }

    fn session(bytes: &[u8]) -> Upload<BytesSource> {
        let source = BytesSource {
            path: PathBuf::from("/tmp/file.bin"),
            bytes: bytes.to_vec(),
        };
        Upload::new(
            source,
            Url::parse("https://tus.example/files").unwrap(),
            ClientOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn percent_is_clamped_and_total_for_empty_files() {
        let mut upload = session(b"1234");
        upload.offset = 2;
        assert!((upload.percent() - 50.0).abs() < f64::EPSILON);

        let empty = session(b"");
        assert!((empty.percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn initial_eta_requires_a_measured_speed() {
        let mut upload = session(b"123456");
        assert_eq!(upload.initial_eta(), None);

        upload.upload_speed_mbps = Some(0.0);
        assert_eq!(upload.initial_eta(), None);

        upload.upload_speed_mbps = Some(2.0);
        assert!(upload.initial_eta().is_some());
    }

    #[test]
    fn eta_falls_back_to_observed_throughput() {
        let mut upload = session(&[0u8; 100]);
        upload.offset = 50;

        // 50 bytes in one second leaves one more second for the rest.
        let eta = upload.eta(Duration::from_secs(1), 50).unwrap();
        assert_eq!(eta.as_secs(), 1);

        assert_eq!(upload.eta(Duration::from_secs(1), 0), None);
    }

    #[test]
    fn pause_and_cancel_report_state_changes() {
        let upload = session(b"data");
        let control = upload.control();

        assert!(control.pause());
        assert!(!control.pause());

        assert!(control.cancel());
        assert!(!control.cancel());
    }

    #[test]
    fn fingerprint_is_derived_from_the_source_path() {
        let upload = session(b"data");
        assert_eq!(upload.fingerprint(), ".tmp.file.bin");
    }
}
