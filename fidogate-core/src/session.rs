//! Authentication attempt lifecycle.
//!
//! [`AssertionValidator`] is the facade an authentication flow talks to: it
//! can only be built once metadata has been resolved, and every call builds
//! its own [`AssertionService`] from the cached metadata.
//!
//! [`AuthenticationAttempt`] tracks one attempt through
//! `Unstarted -> MetadataResolved -> ChallengeIssued -> ResponseReceived ->
//! Verified | Failed`. Nothing is retried; any failure ends the attempt.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::assertion::{AssertionChallenge, AssertionOptions, AssertionService};
use crate::config::ClientConfig;
use crate::error::{FidoError, Result};
use crate::metadata::{MetadataResolver, ServerMetadata};
use crate::verify::{AssertionResponse, VerificationOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Unstarted,
    MetadataResolved,
    ChallengeIssued,
    ResponseReceived,
    Verified,
    Failed,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Verified | AttemptState::Failed)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptState::Unstarted => "unstarted",
            AttemptState::MetadataResolved => "metadata-resolved",
            AttemptState::ChallengeIssued => "challenge-issued",
            AttemptState::ResponseReceived => "response-received",
            AttemptState::Verified => "verified",
            AttemptState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Entry point for an authentication flow.
///
/// ## Example
///
/// ```no_run
/// use fidogate_core::AssertionValidator;
///
/// # async fn example(signed_response: &str) -> fidogate_core::Result<()> {
/// let validator = AssertionValidator::resolve_metadata("https://auth.example.com").await?;
/// let challenge = validator.request_assertion("alice").await?;
/// // ... relay challenge.body to the browser, receive signed_response ...
/// let outcome = validator.verify_assertion(signed_response).await?;
/// assert!(outcome.success);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AssertionValidator {
    resolver: Arc<MetadataResolver>,
}

impl AssertionValidator {
    /// Resolve metadata for `base_url` with default settings.
    pub async fn resolve_metadata(base_url: &str) -> Result<Self> {
        Self::connect(ClientConfig::new(base_url)?).await
    }

    /// Resolve metadata eagerly. No validator exists unless this succeeds.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        Self::from_resolver(Arc::new(MetadataResolver::new(&config)?)).await
    }

    pub async fn from_resolver(resolver: Arc<MetadataResolver>) -> Result<Self> {
        resolver.resolve().await?;
        Ok(Self { resolver })
    }

    /// Current metadata, refetched only if the cache has expired.
    pub async fn metadata(&self) -> Result<Arc<ServerMetadata>> {
        self.resolver.resolve().await
    }

    pub async fn refresh_metadata(&self) -> Result<Arc<ServerMetadata>> {
        self.resolver.refresh().await
    }

    pub async fn request_assertion(&self, username: &str) -> Result<AssertionChallenge> {
        let options = AssertionOptions::new(username)?;
        self.request_assertion_with(&options).await
    }

    pub async fn request_assertion_with(
        &self,
        options: &AssertionOptions,
    ) -> Result<AssertionChallenge> {
        let metadata = self.resolver.resolve().await?;
        AssertionService::new(self.resolver.http(), &metadata)
            .authenticate(options)
            .await
    }

    pub async fn verify_assertion(&self, response_json: &str) -> Result<VerificationOutcome> {
        let response = AssertionResponse::parse(response_json)?;
        self.verify_response(&response).await
    }

    pub async fn verify_response(&self, response: &AssertionResponse) -> Result<VerificationOutcome> {
        let metadata = self.resolver.resolve().await?;
        AssertionService::new(self.resolver.http(), &metadata)
            .verify(response)
            .await
    }

    /// Start a tracked attempt sharing this validator's metadata cache.
    pub fn attempt(&self) -> AuthenticationAttempt {
        AuthenticationAttempt::new(Arc::clone(&self.resolver))
    }
}

/// One authentication attempt. Restarting means creating a new attempt.
#[derive(Debug)]
pub struct AuthenticationAttempt {
    id: Uuid,
    resolver: Arc<MetadataResolver>,
    state: AttemptState,
    metadata: Option<Arc<ServerMetadata>>,
    username: Option<String>,
    challenge: Option<AssertionChallenge>,
    outcome: Option<VerificationOutcome>,
}

impl AuthenticationAttempt {
    pub fn new(resolver: Arc<MetadataResolver>) -> Self {
        Self {
            id: Uuid::new_v4(),
            resolver,
            state: AttemptState::Unstarted,
            metadata: None,
            username: None,
            challenge: None,
            outcome: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn challenge(&self) -> Option<&AssertionChallenge> {
        self.challenge.as_ref()
    }

    /// Terminal outcome, set once the attempt is verified or failed.
    pub fn outcome(&self) -> Option<&VerificationOutcome> {
        self.outcome.as_ref()
    }

    #[instrument(level = "debug", skip_all, fields(attempt_id = %self.id))]
    pub async fn resolve_metadata(&mut self) -> Result<Arc<ServerMetadata>> {
        self.require_state(AttemptState::Unstarted)?;

        match self.resolver.resolve().await {
            Ok(metadata) => {
                self.metadata = Some(Arc::clone(&metadata));
                self.transition(AttemptState::MetadataResolved);
                Ok(metadata)
            }
            Err(e) => self.fail(e),
        }
    }

    #[instrument(level = "debug", skip_all, fields(attempt_id = %self.id))]
    pub async fn request_assertion(&mut self, username: &str) -> Result<AssertionChallenge> {
        self.require_state(AttemptState::MetadataResolved)?;

        let options = match AssertionOptions::new(username) {
            Ok(options) => options,
            Err(e) => return self.fail(e),
        };
        let Some(metadata) = self.metadata.clone() else {
            return self.fail(FidoError::InvalidState {
                expected: AttemptState::MetadataResolved,
                actual: self.state,
            });
        };

        match AssertionService::new(self.resolver.http(), &metadata)
            .authenticate(&options)
            .await
        {
            Ok(challenge) => {
                self.username = Some(options.username().to_string());
                self.challenge = Some(challenge.clone());
                self.transition(AttemptState::ChallengeIssued);
                Ok(challenge)
            }
            Err(e) => self.fail(e),
        }
    }

    #[instrument(level = "debug", skip_all, fields(attempt_id = %self.id))]
    pub async fn verify_assertion(&mut self, response_json: &str) -> Result<VerificationOutcome> {
        self.require_state(AttemptState::ChallengeIssued)?;

        let response = match AssertionResponse::parse(response_json) {
            Ok(response) => response,
            Err(e) => return self.fail(e),
        };
        self.transition(AttemptState::ResponseReceived);

        let Some(metadata) = self.metadata.clone() else {
            return self.fail(FidoError::InvalidState {
                expected: AttemptState::ResponseReceived,
                actual: self.state,
            });
        };

        match AssertionService::new(self.resolver.http(), &metadata)
            .verify(&response)
            .await
        {
            Ok(outcome) => {
                self.outcome = Some(outcome.clone());
                self.transition(AttemptState::Verified);
                info!(username = self.username.as_deref(), "Authentication attempt verified");
                Ok(outcome)
            }
            Err(e) => self.fail(e),
        }
    }

    fn require_state(&self, expected: AttemptState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            warn!(%expected, actual = %self.state, "Out-of-order attempt operation");
            Err(FidoError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn transition(&mut self, next: AttemptState) {
        debug!(from = %self.state, to = %next, "Attempt state transition");
        self.state = next;
    }

    fn fail<T>(&mut self, error: FidoError) -> Result<T> {
        warn!(error = %error, at = %self.state, "Authentication attempt failed");
        self.outcome = Some(VerificationOutcome::from_error(&error));
        self.transition(AttemptState::Failed);
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt() -> AuthenticationAttempt {
        let config = ClientConfig::new("http://127.0.0.1:9").unwrap();
        AuthenticationAttempt::new(Arc::new(MetadataResolver::new(&config).unwrap()))
    }

    #[test]
    fn test_terminal_states() {
        assert!(AttemptState::Verified.is_terminal());
        assert!(AttemptState::Failed.is_terminal());
        assert!(!AttemptState::Unstarted.is_terminal());
        assert!(!AttemptState::ResponseReceived.is_terminal());
    }

    #[test]
    fn test_new_attempt_is_unstarted() {
        let attempt = attempt();
        assert_eq!(attempt.state(), AttemptState::Unstarted);
        assert!(attempt.outcome().is_none());
        assert!(attempt.challenge().is_none());
        assert_ne!(attempt.id(), self::attempt().id());
    }

    #[tokio::test]
    async fn test_request_before_metadata_is_rejected() {
        let mut attempt = attempt();
        let err = attempt.request_assertion("alice").await.unwrap_err();
        assert!(matches!(
            err,
            FidoError::InvalidState {
                expected: AttemptState::MetadataResolved,
                actual: AttemptState::Unstarted
            }
        ));
        // Out-of-order calls leave the attempt untouched.
        assert_eq!(attempt.state(), AttemptState::Unstarted);
    }

    #[tokio::test]
    async fn test_verify_before_challenge_is_rejected() {
        let mut attempt = attempt();
        let err = attempt.verify_assertion("{}").await.unwrap_err();
        assert!(matches!(err, FidoError::InvalidState { .. }));
        assert_eq!(attempt.state(), AttemptState::Unstarted);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(AttemptState::ChallengeIssued.to_string(), "challenge-issued");
        let err = FidoError::InvalidState {
            expected: AttemptState::ChallengeIssued,
            actual: AttemptState::Failed,
        };
        assert_eq!(err.to_string(), "Attempt is failed, expected challenge-issued");
    }
}
