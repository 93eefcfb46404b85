//! Upstream bandwidth measurement for ETA estimates.

use std::time::Instant;

use log::debug;
use rand::RngCore;
use reqwest::Method;
use url::Url;

use crate::api::{HttpRequest, HttpTransport};

/// Accepts arbitrary POST payloads and discards them, which is all a
/// throughput measurement needs.
pub const DEFAULT_PROBE_URL: &str = "https://speed.cloudflare.com/__up";

const DEFAULT_PAYLOAD_BYTES: usize = 512 * 1024;

/// Measures upstream throughput by timing a payload POST against a set of
/// measurement endpoints.
///
/// The probe is best-effort: endpoints are tried in order and every
/// failure, including degenerate timings, yields `None` so callers can
/// fall back to throughput observed during the transfer itself.
pub struct SpeedProbe {
    endpoints: Vec<Url>,
    payload_bytes: usize,
}

impl Default for SpeedProbe {
    fn default() -> Self {
        let endpoints = Url::parse(DEFAULT_PROBE_URL)
            .map(|url| vec![url])
            .unwrap_or_default();
        Self {
            endpoints,
            payload_bytes: DEFAULT_PAYLOAD_BYTES,
        }
    }
}

impl SpeedProbe {
    pub fn new(endpoints: Vec<Url>, payload_bytes: usize) -> Self {
        Self {
            endpoints,
            payload_bytes,
        }
    }

    /// Upstream bandwidth in megabits per second, or `None` when no
    /// endpoint produced a usable measurement.
    pub async fn measure(&self, transport: &dyn HttpTransport) -> Option<f64> {
        for endpoint in &self.endpoints {
            if let Some(mbps) = self.measure_one(transport, endpoint).await {
                debug!("measured {mbps:.2} Mbps against {endpoint}");
                return Some(mbps);
            }
        }
        debug!("speed probe produced no measurement");
        None
    }

    async fn measure_one(&self, transport: &dyn HttpTransport, endpoint: &Url) -> Option<f64> {
        let mut payload = vec![0u8; self.payload_bytes];
        rand::thread_rng().fill_bytes(&mut payload);

        let started = Instant::now();
        let response = transport
            .send(HttpRequest {
                method: Method::POST,
                url: endpoint.clone(),
                headers: vec![(
                    "Content-Type".to_string(),
                    "application/octet-stream".to_string(),
                )],
                body: payload,
            })
            .await
            .ok()?;

        if !response.is_success() {
            return None;
        }

        let secs = started.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        Some((self.payload_bytes as f64 * 8.0) / (secs * 1e6))
    }
}
