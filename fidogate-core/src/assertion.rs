//! Assertion request building.
//!
//! An [`AssertionService`] is a short-lived view over the shared HTTP client
//! and one resolved [`ServerMetadata`]. Build one per call; it holds no
//! mutable state, so concurrent requests for different users cannot see each
//! other's payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::error::{FidoError, Operation, Result};
use crate::http_client::{truncate_for_log, FidoHttpClient};
use crate::metadata::ServerMetadata;

/// WebAuthn user verification requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    Required,
    Preferred,
    Discouraged,
}

/// Options posted to the assertion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionOptions {
    username: String,
    #[serde(rename = "userVerification", skip_serializing_if = "Option::is_none")]
    user_verification: Option<UserVerification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

impl AssertionOptions {
    /// Minimal options for `username`. Empty or whitespace-only names are rejected.
    pub fn new(username: &str) -> Result<Self> {
        let username = username.trim();
        if username.is_empty() {
            return Err(FidoError::InvalidUsername);
        }

        Ok(Self {
            username: username.to_string(),
            user_verification: None,
            timeout: None,
            session_id: None,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn with_user_verification(mut self, user_verification: UserVerification) -> Self {
        self.user_verification = Some(user_verification);
        self
    }

    /// Ceremony timeout hint for the client, in milliseconds.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Challenge/options document issued by the server, relayed verbatim to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionChallenge {
    pub username: String,
    pub body: String,
}

impl AssertionChallenge {
    /// Parse the opaque body as JSON, for callers that want to look inside.
    pub fn as_json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.body)
    }
}

/// Per-call client bound to one resolved metadata document.
#[derive(Debug, Clone, Copy)]
pub struct AssertionService<'a> {
    pub(crate) http: &'a FidoHttpClient,
    pub(crate) metadata: &'a ServerMetadata,
}

impl<'a> AssertionService<'a> {
    pub fn new(http: &'a FidoHttpClient, metadata: &'a ServerMetadata) -> Self {
        Self { http, metadata }
    }

    pub fn metadata(&self) -> &ServerMetadata {
        self.metadata
    }

    /// Ask the server for an assertion challenge.
    #[instrument(
        level = "debug",
        skip_all,
        fields(username = %options.username, endpoint = %self.metadata.assertion_endpoint)
    )]
    pub async fn authenticate(&self, options: &AssertionOptions) -> Result<AssertionChallenge> {
        debug!("Building an assertion request");

        let reply = self
            .http
            .post_json(
                &self.metadata.assertion_endpoint,
                options,
                Operation::AssertionRequest,
            )
            .await?;

        if !reply.is_ok() {
            error!(
                status = %reply.status,
                body = truncate_for_log(&reply.body),
                "Assertion request building failed"
            );
            return Err(FidoError::AssertionRequestFailed {
                status: reply.status,
                body: reply.body,
            });
        }

        Ok(AssertionChallenge {
            username: options.username.clone(),
            body: reply.body,
        })
    }
}

/// Request a challenge for `username` from the server described by `metadata`.
///
/// Fails fast with [`FidoError::InvalidUsername`] before any network call.
pub async fn build_assertion_request(
    http: &FidoHttpClient,
    metadata: &ServerMetadata,
    username: &str,
) -> Result<AssertionChallenge> {
    let options = AssertionOptions::new(username)?;
    AssertionService::new(http, metadata)
        .authenticate(&options)
        .await
}
