//! Shared fixtures for upload flow tests.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tus_client::{
    Error, HttpRequest, HttpResponse, HttpTransport, Result, RetryHook, UploadObserver,
};

/// Replays a scripted list of responses and records every request it saw.
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<HttpResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::protocol("scripted transport ran out of responses"))
    }
}

pub fn response(status: u16, headers: &[(&str, &str)]) -> HttpResponse {
    HttpResponse {
        status,
        headers: headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
            .collect(),
    }
}

pub fn header<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
    request
        .headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub fn fixture_file(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

/// Observer that records every notification it receives.
#[derive(Default)]
pub struct RecordingObserver {
    pub started: Mutex<Vec<Option<Duration>>>,
    pub progress: Mutex<Vec<f64>>,
    pub completions: Mutex<u32>,
}

impl UploadObserver for RecordingObserver {
    fn on_start(&self, eta: Option<Duration>) {
        self.started.lock().unwrap().push(eta);
    }

    fn on_progress(&self, percent: f64, _eta: Option<Duration>) {
        self.progress.lock().unwrap().push(percent);
    }

    fn on_complete(&self) {
        *self.completions.lock().unwrap() += 1;
    }
}

/// Hook that records suggested waits and always retries without sleeping.
#[derive(Default)]
pub struct RecordingRetry {
    pub waits: Mutex<Vec<u64>>,
}

#[async_trait]
impl RetryHook for RecordingRetry {
    async fn backoff(&self, _attempt: u32, wait: Duration) -> bool {
        self.waits.lock().unwrap().push(wait.as_secs());
        true
    }
}
