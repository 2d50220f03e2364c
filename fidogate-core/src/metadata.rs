//! FIDO2 server metadata discovery and caching.
//!
//! The capability document is fetched from
//! `{base-url}/.well-known/fido2-configuration`. Two document shapes are
//! understood:
//!
//! - flat: `{"assertion_endpoint": "...", "verify_endpoint": "..."}`
//! - nested: `{"assertion": {"options_endpoint": "...", "result_endpoint": "..."}}`
//!
//! Relative endpoints are resolved against the base URL.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{FidoError, Operation, Result};
use crate::http_client::{resolve_endpoint, truncate_for_log, FidoHttpClient};

/// Well-known path of the capability document, relative to the base URL.
pub const DISCOVERY_PATH: &str = "/.well-known/fido2-configuration";

/// Resolved, immutable view of a FIDO2 server's capabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerMetadata {
    pub discovery_url: Url,
    pub assertion_endpoint: Url,
    pub verification_endpoint: Url,
    pub supported_algorithms: Vec<String>,
    pub issuer: Option<String>,
    pub version: Option<String>,
    /// Capability document exactly as the server returned it.
    pub raw_document: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CapabilityDocument {
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    issuer: Option<String>,
    #[serde(default)]
    assertion_endpoint: Option<String>,
    #[serde(default, alias = "verification_endpoint")]
    verify_endpoint: Option<String>,
    #[serde(default)]
    supported_algorithms: Option<Vec<Value>>,
    #[serde(default)]
    assertion: Option<AssertionSection>,
}

#[derive(Debug, Deserialize)]
struct AssertionSection {
    #[serde(default)]
    options_endpoint: Option<String>,
    #[serde(default)]
    result_endpoint: Option<String>,
    #[serde(default)]
    supported_algorithms: Option<Vec<Value>>,
}

impl ServerMetadata {
    /// Build metadata from a capability document body.
    ///
    /// Fails with [`FidoError::MetadataUnavailable`] if the body is not JSON
    /// or does not name both endpoints.
    pub fn from_document(base_url: &Url, discovery_url: Url, body: &str) -> Result<Self> {
        let unusable = |reason: String| FidoError::MetadataUnavailable {
            status: StatusCode::OK,
            reason,
            body: body.to_string(),
        };

        let doc: CapabilityDocument = serde_json::from_str(body)
            .map_err(|e| unusable(format!("capability document is not valid JSON: {e}")))?;

        let (nested_options, nested_result, nested_algs) = match doc.assertion {
            Some(section) => (
                section.options_endpoint,
                section.result_endpoint,
                section.supported_algorithms,
            ),
            None => (None, None, None),
        };

        let assertion_ref = non_empty(doc.assertion_endpoint)
            .or(non_empty(nested_options))
            .ok_or_else(|| unusable("capability document names no assertion endpoint".into()))?;
        let verify_ref = non_empty(doc.verify_endpoint)
            .or(non_empty(nested_result))
            .ok_or_else(|| unusable("capability document names no verification endpoint".into()))?;

        let assertion_endpoint =
            resolve_endpoint(base_url, &assertion_ref).map_err(|e| unusable(e.to_string()))?;
        let verification_endpoint =
            resolve_endpoint(base_url, &verify_ref).map_err(|e| unusable(e.to_string()))?;

        let supported_algorithms = doc
            .supported_algorithms
            .or(nested_algs)
            .unwrap_or_default()
            .iter()
            .filter_map(value_to_string)
            .collect();

        Ok(Self {
            discovery_url,
            assertion_endpoint,
            verification_endpoint,
            supported_algorithms,
            issuer: doc.issuer,
            version: doc.version.as_ref().and_then(value_to_string),
            raw_document: body.to_string(),
            fetched_at: Utc::now(),
        })
    }

    /// Age of this metadata relative to now.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    fn is_fresh(&self, max_age: Option<Duration>) -> bool {
        max_age.map_or(true, |max_age| self.age() < max_age)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Build the discovery URL by appending [`DISCOVERY_PATH`] to the base URL.
pub fn discovery_url(base_url: &Url) -> Url {
    let mut url = base_url.clone();
    url.set_query(None);
    url.set_fragment(None);
    let path = format!("{}{}", url.path().trim_end_matches('/'), DISCOVERY_PATH);
    url.set_path(&path);
    url
}

/// Fetch and parse the capability document. Single attempt, no caching.
#[instrument(level = "debug", skip_all, fields(base_url = %base_url))]
pub async fn resolve_metadata(http: &FidoHttpClient, base_url: &Url) -> Result<ServerMetadata> {
    let url = discovery_url(base_url);
    debug!(discovery_url = %url, "Inspecting fido2 configuration discovery URL");

    let reply = http.get(&url, Operation::Discovery).await?;

    if !reply.is_ok() {
        error!(
            status = %reply.status,
            body = truncate_for_log(&reply.body),
            "Problem retrieving fido metadata"
        );
        return Err(FidoError::MetadataUnavailable {
            status: reply.status,
            reason: "discovery endpoint returned an unexpected status".into(),
            body: reply.body,
        });
    }

    let metadata = ServerMetadata::from_document(base_url, url, &reply.body).map_err(|e| {
        error!(error = %e, body = truncate_for_log(&reply.body), "Unusable fido metadata");
        e
    })?;

    info!(
        assertion_endpoint = %metadata.assertion_endpoint,
        verification_endpoint = %metadata.verification_endpoint,
        algorithms = metadata.supported_algorithms.len(),
        "Resolved fido2 metadata"
    );
    Ok(metadata)
}

/// Caches resolved [`ServerMetadata`] for a single base URL.
///
/// Concurrent callers that find the cache empty or stale wait on one fetch
/// rather than each issuing their own.
#[derive(Debug)]
pub struct MetadataResolver {
    http: FidoHttpClient,
    base_url: Url,
    max_age: Option<Duration>,
    cache: RwLock<Option<Arc<ServerMetadata>>>,
}

impl MetadataResolver {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self::with_client(
            FidoHttpClient::new(config)?,
            config.base_url.clone(),
            config.metadata_max_age,
        ))
    }

    pub fn with_client(http: FidoHttpClient, base_url: Url, max_age: Option<Duration>) -> Self {
        Self {
            http,
            base_url,
            max_age,
            cache: RwLock::new(None),
        }
    }

    pub fn http(&self) -> &FidoHttpClient {
        &self.http
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Return cached metadata if still fresh, otherwise fetch it.
    pub async fn resolve(&self) -> Result<Arc<ServerMetadata>> {
        if let Some(metadata) = self.cached().await {
            return Ok(metadata);
        }

        let mut cache = self.cache.write().await;
        if let Some(metadata) = cache.as_ref().filter(|m| m.is_fresh(self.max_age)) {
            return Ok(Arc::clone(metadata));
        }

        let metadata = Arc::new(resolve_metadata(&self.http, &self.base_url).await?);
        *cache = Some(Arc::clone(&metadata));
        Ok(metadata)
    }

    /// Fetch metadata unconditionally. The cache is only replaced on success,
    /// and readers keep seeing the old value while the fetch is in flight.
    pub async fn refresh(&self) -> Result<Arc<ServerMetadata>> {
        let metadata = Arc::new(resolve_metadata(&self.http, &self.base_url).await?);
        *self.cache.write().await = Some(Arc::clone(&metadata));
        Ok(metadata)
    }

    /// Fresh cached metadata, without any network I/O. Returns `None` while a
    /// first fetch (or a fetch replacing expired metadata) holds the cache.
    pub async fn cached(&self) -> Option<Arc<ServerMetadata>> {
        self.cache
            .try_read()
            .ok()?
            .as_ref()
            .filter(|m| m.is_fresh(self.max_age))
            .cloned()
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}
