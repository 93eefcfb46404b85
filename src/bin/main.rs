use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tus_client::{
    ClientOptions, FileConfig, FileSource, FileStore, RetryScale, SleepRetry, Upload,
    UploadObserver, UploadOutcome, UploadStore, DEFAULT_CHUNK_BYTES, DEFAULT_MAX_RETRIES,
};
use url::Url;

#[derive(Parser)]
#[command(name = "tus-client")]
#[command(about = "Resumable uploads over the tus protocol", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload one or more files to a tus endpoint
    Upload {
        /// Files to upload (can specify multiple files)
        files: Vec<String>,

        /// Creation endpoint of the tus server
        #[arg(short, long, env = "TUS_ENDPOINT")]
        endpoint: Option<String>,

        /// Bytes per chunk
        #[arg(long, default_value_t = DEFAULT_CHUNK_BYTES)]
        chunk_size: usize,

        /// Retry attempts before giving up
        #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
        max_retries: u32,

        /// Cooldown in seconds before the first retry
        #[arg(long, default_value_t = 0)]
        retry_cooldown: u32,

        /// Cooldown growth across retries (`constant`, `linear` or `exponential`)
        #[arg(long, default_value = "exponential", value_parser = clap::value_parser!(RetryScale))]
        retry_scale: RetryScale,

        /// Directory for resume handles; uploads become restart-safe when set
        #[arg(long, env = "TUS_STORE_DIR")]
        store_dir: Option<PathBuf>,

        /// Metadata entry as key=value (repeatable)
        #[arg(short, long)]
        metadata: Vec<String>,

        /// Extra request header as 'Name: value' (repeatable)
        #[arg(long)]
        header: Vec<String>,

        /// Measure upstream bandwidth first for a better ETA
        #[arg(long)]
        speed_test: bool,

        /// Number of files uploaded in parallel (1-32, default: 4)
        #[arg(long, default_value = "4")]
        parallel: usize,

        /// Explicit config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

struct BarObserver {
    bar: ProgressBar,
}

impl UploadObserver for BarObserver {
    fn on_start(&self, eta: Option<Duration>) {
        if let Some(eta) = eta {
            self.bar.set_message(format!("eta {}s", eta.as_secs()));
        }
    }

    fn on_progress(&self, percent: f64, eta: Option<Duration>) {
        self.bar.set_position(percent.round() as u64);
        if let Some(eta) = eta {
            self.bar.set_message(format!("eta {}s", eta.as_secs()));
        }
    }

    fn on_complete(&self) {
        self.bar.finish_with_message("done");
    }
}

fn parse_metadata(entries: &[String]) -> Result<HashMap<String, String>> {
    let mut metadata = HashMap::new();
    for entry in entries {
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            anyhow::anyhow!("Invalid metadata entry '{entry}'. Expected key=value")
        })?;
        if key.contains(' ') || key.contains(',') {
            return Err(anyhow::anyhow!(
                "Metadata key '{key}' must not contain spaces or commas"
            ));
        }
        metadata.insert(key.to_string(), value.to_string());
    }
    Ok(metadata)
}

fn parse_headers(entries: &[String]) -> Result<Vec<(String, String)>> {
    entries
        .iter()
        .map(|entry| {
            let (name, value) = entry.split_once(':').ok_or_else(|| {
                anyhow::anyhow!("Invalid header '{entry}'. Expected 'Name: value'")
            })?;
            Ok((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            debug!("Error loading .env file: {e}");
        }
    } else {
        debug!("Loaded environment from .env file");
    }

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result: Result<()> = match cli.command {
        Commands::Upload {
            files,
            endpoint,
            chunk_size,
            max_retries,
            retry_cooldown,
            retry_scale,
            store_dir,
            metadata,
            header,
            speed_test,
            parallel,
            config,
        } => {
            if files.is_empty() {
                return Err(anyhow::anyhow!("No files specified for upload"));
            }

            if !(1..=32).contains(&parallel) {
                return Err(anyhow::anyhow!(
                    "Parallel value must be between 1 and 32, got {parallel}"
                ));
            }

            let file_config = FileConfig::load_with_fallback(config.as_ref())?;

            let endpoint = endpoint
                .or(file_config.endpoint)
                .ok_or_else(|| anyhow::anyhow!("No endpoint given (use --endpoint, TUS_ENDPOINT or a config file)"))?;
            let endpoint = Url::parse(&endpoint)
                .map_err(|e| anyhow::anyhow!("Invalid endpoint '{endpoint}': {e}"))?;
            info!("Using endpoint: {endpoint}");

            let options = ClientOptions {
                max_chunk_bytes: file_config.chunk_size.unwrap_or(chunk_size),
                max_retries: file_config.max_retries.unwrap_or(max_retries),
                retry_scale,
                first_retry_cooldown_s: retry_cooldown,
                ..ClientOptions::default()
            };

            let store: Option<Arc<dyn UploadStore>> =
                match store_dir.or(file_config.store_dir) {
                    Some(dir) => {
                        info!("Resume handles stored in {}", dir.display());
                        Some(Arc::new(FileStore::new(dir)?))
                    }
                    None => None,
                };

            let metadata = parse_metadata(&metadata)?;
            let mut headers = parse_headers(&header)?;
            if let Some(configured) = file_config.headers {
                for (name, value) in configured {
                    if !headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(&name)) {
                        headers.push((name, value));
                    }
                }
            }

            // Process files in parallel using streams
            let results: Vec<(String, Result<UploadOutcome>)> = stream::iter(files)
                .map(|file_path| {
                    let endpoint = endpoint.clone();
                    let options = options.clone();
                    let store = store.clone();
                    let metadata = metadata.clone();
                    let headers = headers.clone();

                    async move {
                        let result = upload_one(
                            &file_path, endpoint, options, store, metadata, headers, speed_test,
                        )
                        .await;
                        (file_path, result)
                    }
                })
                .buffer_unordered(parallel)
                .collect()
                .await;

            let mut uploaded = Vec::new();
            let mut errors = Vec::new();

            for (file_path, result) in results {
                match result {
                    Ok(UploadOutcome::Completed) => {
                        info!("✅ {file_path} uploaded successfully");
                        uploaded.push(file_path);
                    }
                    Ok(outcome) => {
                        errors.push(format!("{file_path}: upload ended early ({outcome:?})"));
                    }
                    Err(e) => {
                        errors.push(format!("{file_path}: {e}"));
                    }
                }
            }

            if !uploaded.is_empty() {
                println!("\n✅ Successfully uploaded {} file(s):", uploaded.len());
                for file in &uploaded {
                    println!("  {file}");
                }
            }

            if !errors.is_empty() {
                eprintln!("\n❌ Failed to upload {} file(s):", errors.len());
                for error in &errors {
                    eprintln!("  {error}");
                }
                return Err(anyhow::anyhow!("{} file(s) failed to upload", errors.len()));
            }

            Ok(())
        }
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Upload failed: {e}");
            std::process::exit(1);
        }
    }
}

async fn upload_one(
    file_path: &str,
    endpoint: Url,
    options: ClientOptions,
    store: Option<Arc<dyn UploadStore>>,
    metadata: HashMap<String, String>,
    headers: Vec<(String, String)>,
    speed_test: bool,
) -> Result<UploadOutcome> {
    let source = FileSource::open(file_path).await?;

    let mut upload = Upload::new(source, endpoint, options)?
        .with_metadata(metadata)
        .with_headers(headers);
    if let Some(store) = store {
        upload = upload.with_store(store);
    }

    if upload.is_resumable() {
        info!("Resuming previous upload of {file_path}");
    }

    let bar = ProgressBar::new(100);
    #[allow(clippy::expect_used)]
    bar.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}",
            )
            .expect("Failed to set progress bar template")
            .progress_chars("#>-"),
    );
    bar.set_message(file_path.to_string());

    let observer = BarObserver { bar };
    let outcome = upload
        .upload(&observer, Some(&SleepRetry), speed_test)
        .await?;

    Ok(outcome)
}
