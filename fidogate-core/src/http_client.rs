//! Shared HTTP plumbing for talking to a FIDO2 server.
//!
//! Every call is a single attempt bounded by the configured timeout. Responses
//! are consumed into an owned [`HttpReply`], so the underlying connection is
//! released on every path, including non-200 statuses and errors.

use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{FidoError, Operation, Result};

/// Longest body excerpt written to log fields.
const MAX_LOGGED_BODY: usize = 512;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

impl HttpReply {
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }
}

/// HTTP client shared by the metadata, assertion and verification calls.
///
/// Holds no per-request state; cloning it is cheap and clones share one
/// connection pool.
#[derive(Debug, Clone)]
pub struct FidoHttpClient {
    client: Client,
    timeout: Duration,
    connect_timeout: Duration,
}

impl FidoHttpClient {
    /// Create a new HTTP client from the given configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .https_only(config.https_only)
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| {
                warn!(error = %e, "Failed to create HTTP client");
                FidoError::Config(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            timeout: config.timeout,
            connect_timeout: config.connect_timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue a GET and read the whole body.
    pub async fn get(&self, url: &Url, operation: Operation) -> Result<HttpReply> {
        let start = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.classify(e, operation, start))?;

        self.read_reply(response, operation, start).await
    }

    /// Issue a POST with a JSON body and read the whole response body.
    pub async fn post_json<T>(&self, url: &Url, payload: &T, operation: Operation) -> Result<HttpReply>
    where
        T: Serialize + ?Sized,
    {
        let start = Instant::now();
        let response = self
            .client
            .post(url.clone())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| self.classify(e, operation, start))?;

        self.read_reply(response, operation, start).await
    }

    async fn read_reply(
        &self,
        response: Response,
        operation: Operation,
        start: Instant,
    ) -> Result<HttpReply> {
        let status = response.status();
        debug!(status = %status, %operation, "Received HTTP response");

        let body = response
            .text()
            .await
            .map_err(|e| self.classify(e, operation, start))?;

        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            bytes = body.len(),
            %operation,
            "Request completed"
        );

        Ok(HttpReply { status, body })
    }

    fn classify(&self, error: reqwest::Error, operation: Operation, start: Instant) -> FidoError {
        let latency_ms = start.elapsed().as_millis() as u64;
        if error.is_timeout() {
            warn!(error = %error, latency_ms, %operation, "Request timed out");
            FidoError::Timeout {
                operation,
                after: self.expired_bound(error.is_connect()),
            }
        } else {
            warn!(error = %error, latency_ms, %operation, "Transport error");
            FidoError::TransportError {
                operation,
                reason: error.to_string(),
            }
        }
    }
}

impl FidoHttpClient {
    /// The bound that fired: the connect timeout while still connecting,
    /// the request timeout afterwards.
    fn expired_bound(&self, connecting: bool) -> Duration {
        if connecting {
            self.connect_timeout
        } else {
            self.timeout
        }
    }
}

/// Resolve an endpoint reference against a base URL.
///
/// Absolute URLs are used as-is; relative ones are joined to `base`.
pub fn resolve_endpoint(base: &Url, endpoint: &str) -> Result<Url> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(FidoError::InvalidUrl("empty endpoint".into()));
    }

    base.join(endpoint)
        .map_err(|e| FidoError::InvalidUrl(format!("{endpoint}: {e}")))
}

/// Truncate a body for logging without splitting a UTF-8 character.
pub fn truncate_for_log(body: &str) -> &str {
    if body.len() <= MAX_LOGGED_BODY {
        return body;
    }
    let mut end = MAX_LOGGED_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
