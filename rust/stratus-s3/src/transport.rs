//! The "send one signed HTTP request" capability.
//!
//! [`Transport`] is the seam between the client and the network. The
//! production implementation is [`ReqwestTransport`]; tests use the scripted
//! transport from the `helpers` module.

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::Method;
use thiserror::Error;
use url::Url;

use crate::S3Error;

/// A fully signed request, ready to go on the wire.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL, query included
    pub url: Url,
    /// Headers to send; names are lower-case
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Look up a request header by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A response with its body fully collected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers; names are lower-case
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Look up a response header by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .push((name.as_ref().to_lowercase(), value.into()));
        self
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Network-level failures, reported before any HTTP status is known.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// DNS resolution failed
    #[error("Host not found: {0}")]
    HostNotFound(String),

    /// The connection dropped while the exchange was in progress
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// No connection could be established
    #[error("No connection: {0}")]
    NoConnection(String),

    /// The exchange timed out
    #[error("Timed out")]
    Timeout,

    /// The exchange was canceled
    #[error("Canceled")]
    Canceled,

    /// Anything else
    #[error("Transport error: {0}")]
    Other(String),
}

/// Sends one request and collects the full response.
///
/// Implementations must not interpret the status code; classification is
/// the executor's job. Dropping the returned future cancels the exchange.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Perform a single HTTP exchange.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport whose exchanges time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, S3Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|error| S3Error::Configuration(format!("HTTP client: {}", error)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(request.method, request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let mut response = builder.send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_lowercase(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
        }

        Ok(HttpResponse {
            status,
            headers,
            body: body.freeze(),
        })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else if error.is_connect() {
            if is_dns_failure(&error) {
                TransportError::HostNotFound(error.to_string())
            } else {
                TransportError::NoConnection(error.to_string())
            }
        } else if error.is_body() || error.is_decode() {
            TransportError::ConnectionLost(error.to_string())
        } else if error.is_request() {
            TransportError::ConnectionLost(error.to_string())
        } else {
            TransportError::Other(error.to_string())
        }
    }
}

fn is_dns_failure(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        let message = cause.to_string().to_lowercase();
        if message.contains("dns error")
            || message.contains("failed to lookup address")
            || message.contains("name or service not known")
        {
            return true;
        }
        source = cause.source();
    }
    false
}
