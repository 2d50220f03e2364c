//! fidogate core - FIDO2/WebAuthn assertion coordinator
//!
//! This crate lets an authentication flow delegate WebAuthn assertions to an
//! external FIDO2 server. It discovers the server's capability document,
//! requests assertion challenges for a user, and forwards the client's signed
//! response for verification. Challenge generation, signature checks and
//! credential storage all stay on the server.
//!
//! # Features
//!
//! - Well-known metadata discovery with a shared, refreshable cache
//! - Per-call assertion services with no shared mutable request state
//! - Bounded timeouts on every call, reported separately from transport errors
//! - Structured server error bodies surfaced on verification failure
//! - Per-attempt lifecycle tracking
//!
//! # Example
//!
//! ```no_run
//! use fidogate_core::{AttemptState, AssertionValidator, ClientConfig};
//! use std::time::Duration;
//!
//! # async fn example(signed_response: &str) -> fidogate_core::Result<()> {
//! let config = ClientConfig::new("https://auth.example.com")?
//!     .with_timeout(Duration::from_secs(5));
//! let validator = AssertionValidator::connect(config).await?;
//!
//! let mut attempt = validator.attempt();
//! attempt.resolve_metadata().await?;
//! let challenge = attempt.request_assertion("alice").await?;
//! // ... relay challenge.body to the client authenticator ...
//! let outcome = attempt.verify_assertion(signed_response).await?;
//!
//! assert!(outcome.success);
//! assert_eq!(attempt.state(), AttemptState::Verified);
//! # Ok(())
//! # }
//! ```

pub mod assertion;
pub mod config;
pub mod error;
pub mod http_client;
pub mod metadata;
pub mod session;
pub mod verify;

// Re-export main types for convenience
pub use assertion::{
    build_assertion_request, AssertionChallenge, AssertionOptions, AssertionService,
    UserVerification,
};
pub use config::ClientConfig;
pub use error::{ErrorKind, FidoError, Operation, Result, ServerErrorBody, USER_FACING_MESSAGE};
pub use http_client::FidoHttpClient;
pub use metadata::{discovery_url, resolve_metadata, MetadataResolver, ServerMetadata, DISCOVERY_PATH};
pub use session::{AssertionValidator, AttemptState, AuthenticationAttempt};
pub use verify::{verify_assertion, AssertionResponse, VerificationOutcome};
