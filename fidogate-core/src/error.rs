use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::AttemptState;

/// Message shown to end users for any failure. Details belong in the logs.
pub const USER_FACING_MESSAGE: &str = "Authentication could not be completed";

/// The network call an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Discovery,
    AssertionRequest,
    Verification,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Discovery => "metadata discovery",
            Operation::AssertionRequest => "assertion request",
            Operation::Verification => "assertion verification",
        };
        f.write_str(name)
    }
}

/// Coarse classification of [`FidoError`] for recovery policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MetadataUnavailable,
    AssertionRequestFailed,
    MalformedAssertionResponse,
    VerificationFailed,
    Timeout,
    Transport,
    InvalidInput,
    InvalidState,
    Config,
}

/// Structured error document some FIDO2 servers return alongside a non-200 status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServerErrorBody {
    /// Parse a response body, returning `None` unless it is a JSON object
    /// with at least one recognised field.
    pub fn parse(body: &str) -> Option<Self> {
        let parsed: Self = serde_json::from_str(body).ok()?;
        if parsed.is_empty() {
            None
        } else {
            Some(parsed)
        }
    }

    fn is_empty(&self) -> bool {
        self.error.is_none()
            && self.error_description.is_none()
            && self.reason.is_none()
            && self.message.is_none()
    }

    /// Most specific human-readable description the server gave.
    pub fn description(&self) -> Option<&str> {
        self.error_description
            .as_deref()
            .or(self.reason.as_deref())
            .or(self.message.as_deref())
            .or(self.error.as_deref())
    }
}

#[derive(Error, Debug)]
pub enum FidoError {
    #[error("FIDO2 metadata unavailable (status {status}): {reason}")]
    MetadataUnavailable {
        status: StatusCode,
        reason: String,
        body: String,
    },

    #[error("Assertion request building failed (status {status})")]
    AssertionRequestFailed { status: StatusCode, body: String },

    #[error("Malformed assertion response: {0}")]
    MalformedAssertionResponse(String),

    #[error("Verification step failed (status {status})")]
    VerificationFailed {
        status: StatusCode,
        body: String,
        server_error: Option<ServerErrorBody>,
    },

    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout { operation: Operation, after: Duration },

    #[error("{operation} transport error: {reason}")]
    TransportError { operation: Operation, reason: String },

    #[error("Username must not be empty")]
    InvalidUsername,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Attempt is {actual}, expected {expected}")]
    InvalidState {
        expected: AttemptState,
        actual: AttemptState,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FidoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FidoError::MetadataUnavailable { .. } => ErrorKind::MetadataUnavailable,
            FidoError::AssertionRequestFailed { .. } => ErrorKind::AssertionRequestFailed,
            FidoError::MalformedAssertionResponse(_) => ErrorKind::MalformedAssertionResponse,
            FidoError::VerificationFailed { .. } => ErrorKind::VerificationFailed,
            FidoError::Timeout { .. } => ErrorKind::Timeout,
            FidoError::TransportError { .. } => ErrorKind::Transport,
            FidoError::InvalidUsername | FidoError::InvalidUrl(_) => ErrorKind::InvalidInput,
            FidoError::InvalidState { .. } => ErrorKind::InvalidState,
            FidoError::Config(_) => ErrorKind::Config,
        }
    }

    /// HTTP status returned by the server, if the error came from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FidoError::MetadataUnavailable { status, .. }
            | FidoError::AssertionRequestFailed { status, .. }
            | FidoError::VerificationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body attached for diagnostics.
    pub fn body(&self) -> Option<&str> {
        match self {
            FidoError::MetadataUnavailable { body, .. }
            | FidoError::AssertionRequestFailed { body, .. }
            | FidoError::VerificationFailed { body, .. } => Some(body),
            _ => None,
        }
    }

    /// True when the server answered and refused the request (4xx), as
    /// opposed to being unreachable, timing out, or failing internally.
    pub fn is_rejection(&self) -> bool {
        match self.status() {
            Some(status) => status.is_client_error(),
            None => matches!(
                self,
                FidoError::MalformedAssertionResponse(_) | FidoError::InvalidUsername
            ),
        }
    }

    /// Generic message suitable for display to the end user.
    pub fn user_message(&self) -> &'static str {
        USER_FACING_MESSAGE
    }
}

pub type Result<T> = std::result::Result<T, FidoError>;
