use crate::error::{Error, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Method;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Protocol version announced on every request.
pub const TUS_VERSION: &str = "1.0.0";

pub const HEADER_TUS_RESUMABLE: &str = "Tus-Resumable";
pub const HEADER_UPLOAD_LENGTH: &str = "Upload-Length";
pub const HEADER_UPLOAD_METADATA: &str = "Upload-Metadata";
pub const HEADER_UPLOAD_OFFSET: &str = "Upload-Offset";
pub const HEADER_LOCATION: &str = "Location";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";

/// Media type of every chunk body.
pub const OFFSET_STREAM_CONTENT_TYPE: &str = "application/offset+octet-stream";

/// A single outgoing request, reduced to what the protocol needs.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Response surface the protocol consumes: a status code and headers,
/// keyed by lower-cased header name.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Minimal HTTP capability the upload client drives.
///
/// Injected at session construction so transports can be swapped; tests use
/// a scripted implementation, production code the reqwest-backed one.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpTransport`] backed by a shared [`reqwest::Client`].
#[derive(Default, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.http.request(request.method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.body(request.body).send().await?;

        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }

        Ok(HttpResponse { status, headers })
    }
}

/// Issues the three wire operations of the protocol: create, offset probe
/// and chunk patch.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn HttpTransport>,
}

impl Client {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Register a new upload of `upload_length` bytes at `endpoint`.
    ///
    /// Returns the upload URI from the `Location` header, resolved against
    /// the endpoint. Besides 2xx, a 404 response is accepted as success:
    /// some long-lived deployments answer the create with 404 while still
    /// issuing a usable `Location`.
    ///
    /// # Errors
    ///
    /// Returns a protocol error on any other non-2xx status or when the
    /// `Location` header is missing or unresolvable.
    pub async fn create(
        &self,
        endpoint: &Url,
        upload_length: u64,
        encoded_metadata: &str,
        extra_headers: &[(String, String)],
    ) -> Result<Url> {
        debug!("creating upload of {upload_length} bytes at {endpoint}");

        let protocol_headers = vec![
            (HEADER_TUS_RESUMABLE.to_string(), TUS_VERSION.to_string()),
            (HEADER_UPLOAD_LENGTH.to_string(), upload_length.to_string()),
            (
                HEADER_UPLOAD_METADATA.to_string(),
                encoded_metadata.to_string(),
            ),
        ];

        let response = self
            .transport
            .send(HttpRequest {
                method: Method::POST,
                url: endpoint.clone(),
                headers: merge_headers(protocol_headers, extra_headers),
                body: Vec::new(),
            })
            .await?;

        if !response.is_success() && response.status != 404 {
            return Err(Error::protocol_status(
                "unexpected status creating upload",
                response.status,
            ));
        }

        let location = response
            .header(HEADER_LOCATION)
            .map(first_value)
            .unwrap_or_default();
        if location.is_empty() {
            return Err(Error::protocol("missing upload Uri in Location header"));
        }

        let upload_uri = resolve_location(endpoint, location)?;
        debug!("server assigned upload uri {upload_uri}");
        Ok(upload_uri)
    }

    /// Ask the server how many bytes of `upload_uri` it already holds.
    ///
    /// # Errors
    ///
    /// Returns a protocol error on a non-2xx status or when `Upload-Offset`
    /// is missing or unparseable.
    pub async fn offset(&self, upload_uri: &Url) -> Result<u64> {
        let response = self
            .transport
            .send(HttpRequest {
                method: Method::HEAD,
                url: upload_uri.clone(),
                headers: vec![(HEADER_TUS_RESUMABLE.to_string(), TUS_VERSION.to_string())],
                body: Vec::new(),
            })
            .await?;

        if !response.is_success() {
            return Err(Error::protocol_status(
                "unexpected status probing upload offset",
                response.status,
            ));
        }

        let offset = parse_offset(&response, "offset probe")?;
        debug!("server holds {offset} bytes of {upload_uri}");
        Ok(offset)
    }

    /// Send one chunk starting at `offset` and return the server's new
    /// offset.
    ///
    /// # Errors
    ///
    /// Returns a protocol error on a non-2xx status or when `Upload-Offset`
    /// is missing or unparseable.
    pub async fn patch(
        &self,
        upload_uri: &Url,
        offset: u64,
        chunk: Vec<u8>,
        extra_headers: &[(String, String)],
    ) -> Result<u64> {
        debug!("patching {} bytes at offset {offset}", chunk.len());

        let protocol_headers = vec![
            (HEADER_TUS_RESUMABLE.to_string(), TUS_VERSION.to_string()),
            (HEADER_UPLOAD_OFFSET.to_string(), offset.to_string()),
            (
                HEADER_CONTENT_TYPE.to_string(),
                OFFSET_STREAM_CONTENT_TYPE.to_string(),
            ),
        ];

        let response = self
            .transport
            .send(HttpRequest {
                method: Method::PATCH,
                url: upload_uri.clone(),
                headers: merge_headers(protocol_headers, extra_headers),
                body: chunk,
            })
            .await?;

        if !response.is_success() {
            return Err(Error::protocol_status(
                "unexpected status sending chunk",
                response.status,
            ));
        }

        parse_offset(&response, "chunk")
    }
}

/// Protocol headers layered over caller headers; on a name collision the
/// protocol wins.
fn merge_headers(
    protocol: Vec<(String, String)>,
    extra: &[(String, String)],
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = extra
        .iter()
        .filter(|(name, _)| {
            !protocol
                .iter()
                .any(|(reserved, _)| reserved.eq_ignore_ascii_case(name))
        })
        .cloned()
        .collect();
    merged.extend(protocol);
    merged
}

/// Some servers concatenate duplicate headers; everything after the first
/// comma is noise.
fn first_value(raw: &str) -> &str {
    raw.split(',').next().unwrap_or(raw).trim()
}

fn parse_offset(response: &HttpResponse, context: &str) -> Result<u64> {
    let raw = response.header(HEADER_UPLOAD_OFFSET).ok_or_else(|| {
        Error::protocol(format!("missing Upload-Offset header in {context} response"))
    })?;
    first_value(raw).parse::<u64>().map_err(|_| {
        Error::protocol(format!(
            "invalid Upload-Offset header in {context} response: {raw:?}"
        ))
    })
}

/// Resolve a `Location` value against the create endpoint. Relative paths
/// inherit scheme, host and port; scheme-relative URIs inherit the scheme.
fn resolve_location(endpoint: &Url, location: &str) -> Result<Url> {
    match Url::parse(location) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => endpoint
            .join(location)
            .map_err(|e| Error::protocol(format!("unresolvable Location {location:?}: {e}"))),
        Err(e) => Err(Error::protocol(format!(
            "invalid Location {location:?}: {e}"
        ))),
    }
}
