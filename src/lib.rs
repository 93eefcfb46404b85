//! Client for the tus resumable upload protocol.
//!
//! Uploads are sent as sequential `PATCH` chunks against a server-assigned
//! resource URI, with the byte offset owned by the server. A transfer can
//! be paused and resumed, recovers from transient failures with bounded
//! backoff, and — with a [`FileStore`] — survives a full process restart.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tus_client::{ClientOptions, FileSource, FileStore, SleepRetry, Upload};
//!
//! # async fn run() -> tus_client::Result<()> {
//! let source = FileSource::open("video.mp4").await?;
//! let endpoint = url::Url::parse("https://tus.example/files").unwrap();
//! let store = Arc::new(FileStore::new("/var/lib/myapp/uploads")?);
//!
//! let mut upload = Upload::new(source, endpoint, ClientOptions::default())?
//!     .with_store(store);
//! upload.upload(&(), Some(&SleepRetry), false).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod file_config;
pub mod metadata;
pub mod retry;
pub mod source;
pub mod speed;
pub mod store;
pub mod upload;

pub use api::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use config::{ClientOptions, DEFAULT_CHUNK_BYTES, DEFAULT_MAX_RETRIES};
pub use error::{Error, Result};
pub use file_config::FileConfig;
pub use retry::RetryScale;
pub use source::{FileSource, UploadSource};
pub use speed::SpeedProbe;
pub use store::{FileStore, MemoryStore, UploadStore};
pub use upload::{
    upload_file, RetryHook, SleepRetry, Upload, UploadControl, UploadObserver, UploadOutcome,
};
