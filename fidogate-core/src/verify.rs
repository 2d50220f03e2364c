//! Assertion verification.
//!
//! The client's signed assertion is parsed locally (so malformed input never
//! reaches the network) and forwarded to the verification endpoint. Trust in
//! the result is delegated entirely to the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument};

use crate::assertion::AssertionService;
use crate::error::{FidoError, Operation, Result, ServerErrorBody};
use crate::http_client::{truncate_for_log, FidoHttpClient};
use crate::metadata::ServerMetadata;

/// Credential type every WebAuthn assertion carries.
pub const PUBLIC_KEY_CREDENTIAL_TYPE: &str = "public-key";

/// Signed assertion returned by the client authenticator (a WebAuthn
/// `PublicKeyCredential`).
///
/// The typed fields are a parsed view for checks and logging. The document
/// the client sent is kept verbatim and is what gets serialized, so keys the
/// view does not model (including explicit `null`s) are forwarded unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionResponse {
    pub id: String,
    pub raw_id: Option<String>,
    pub credential_type: String,
    pub response: AuthenticatorAssertionResponse,
    pub extra: Map<String, Value>,
    document: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default)]
    pub user_handle: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialFields {
    id: String,
    #[serde(default)]
    raw_id: Option<String>,
    #[serde(rename = "type")]
    credential_type: String,
    response: AuthenticatorAssertionResponse,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl AssertionResponse {
    /// Parse the JSON the client sent back.
    pub fn parse(json: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(json)
            .map_err(|e| FidoError::MalformedAssertionResponse(e.to_string()))?;
        let fields = CredentialFields::deserialize(&document)
            .map_err(|e| FidoError::MalformedAssertionResponse(e.to_string()))?;

        if fields.id.trim().is_empty() {
            return Err(FidoError::MalformedAssertionResponse(
                "credential id is empty".into(),
            ));
        }

        if fields.credential_type != PUBLIC_KEY_CREDENTIAL_TYPE {
            return Err(FidoError::MalformedAssertionResponse(format!(
                "unexpected credential type: {}",
                fields.credential_type
            )));
        }

        Ok(Self {
            id: fields.id,
            raw_id: fields.raw_id,
            credential_type: fields.credential_type,
            response: fields.response,
            extra: fields.extra,
            document,
        })
    }

    /// The credential JSON as the client sent it.
    pub fn document(&self) -> &Value {
        &self.document
    }
}

impl Serialize for AssertionResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.document.serialize(serializer)
    }
}

/// Terminal result of a verification step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub success: bool,
    pub failure_reason: Option<String>,
    /// Body the server answered with, if any.
    pub server_response: Option<String>,
    pub verified_at: DateTime<Utc>,
}

impl VerificationOutcome {
    pub fn accepted(server_response: String) -> Self {
        Self {
            success: true,
            failure_reason: None,
            server_response: Some(server_response),
            verified_at: Utc::now(),
        }
    }

    /// Failed outcome describing `error`, preferring the server's own explanation.
    pub fn from_error(error: &FidoError) -> Self {
        let reason = match error {
            FidoError::VerificationFailed {
                server_error: Some(server_error),
                ..
            } => server_error
                .description()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
            _ => error.to_string(),
        };

        Self {
            success: false,
            failure_reason: Some(reason),
            server_response: error.body().map(str::to_string),
            verified_at: Utc::now(),
        }
    }
}

impl AssertionService<'_> {
    /// Forward a parsed assertion to the verification endpoint.
    #[instrument(
        level = "debug",
        skip_all,
        fields(credential_id = %response.id, endpoint = %self.metadata.verification_endpoint)
    )]
    pub async fn verify(&self, response: &AssertionResponse) -> Result<VerificationOutcome> {
        debug!("Verifying fido token response");

        let reply = self
            .http
            .post_json(
                &self.metadata.verification_endpoint,
                response,
                Operation::Verification,
            )
            .await?;

        if !reply.is_ok() {
            let server_error = ServerErrorBody::parse(&reply.body);
            error!(
                status = %reply.status,
                server_error = server_error.as_ref().and_then(|e| e.description()),
                body = truncate_for_log(&reply.body),
                "Verification step failed"
            );
            return Err(FidoError::VerificationFailed {
                status: reply.status,
                body: reply.body,
                server_error,
            });
        }

        info!("Assertion verified by server");
        Ok(VerificationOutcome::accepted(reply.body))
    }
}

/// Parse `response_json` and have the server described by `metadata` verify it.
///
/// Malformed input fails with [`FidoError::MalformedAssertionResponse`] before
/// any network call.
pub async fn verify_assertion(
    http: &FidoHttpClient,
    metadata: &ServerMetadata,
    response_json: &str,
) -> Result<VerificationOutcome> {
    let response = AssertionResponse::parse(response_json).map_err(|e| {
        error!(error = %e, "Rejecting malformed assertion response");
        e
    })?;
    AssertionService::new(http, metadata).verify(&response).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    const VALID: &str = r#"{
        "id": "Y3JlZC1pZA",
        "rawId": "Y3JlZC1pZA",
        "type": "public-key",
        "authenticatorAttachment": "cross-platform",
        "clientExtensionResults": {},
        "response": {
            "clientDataJSON": "eyJ0eXBlIjoid2ViYXV0aG4uZ2V0In0",
            "authenticatorData": "SZYN5YgOjGh0NBcPZHZgW4_krrmihjLHmVzzuoMdl2MFAAAAAQ",
            "signature": "MEUCIQD",
            "userHandle": null
        }
    }"#;

    #[test]
    fn test_parse_valid_response() {
        let response = AssertionResponse::parse(VALID).unwrap();
        assert_eq!(response.id, "Y3JlZC1pZA");
        assert_eq!(response.credential_type, "public-key");
        assert!(response.response.user_handle.is_none());
        assert_eq!(response.extra["authenticatorAttachment"], "cross-platform");
    }

    #[test]
    fn test_unknown_fields_are_forwarded() {
        let response = AssertionResponse::parse(VALID).unwrap();
        let forwarded = serde_json::to_value(&response).unwrap();
        assert_eq!(forwarded["clientExtensionResults"], serde_json::json!({}));
        assert_eq!(
            forwarded["response"]["clientDataJSON"],
            "eyJ0eXBlIjoid2ViYXV0aG4uZ2V0In0"
        );
        assert_eq!(forwarded["type"], "public-key");
        assert_eq!(forwarded["rawId"], "Y3JlZC1pZA");
    }

    #[test]
    fn test_null_fields_are_forwarded() {
        let input = r#"{
            "id": "abc",
            "rawId": null,
            "type": "public-key",
            "response": {
                "clientDataJSON": "c",
                "authenticatorData": "a",
                "signature": "s",
                "userHandle": null
            }
        }"#;
        let response = AssertionResponse::parse(input).unwrap();
        assert!(response.raw_id.is_none());
        assert!(response.response.user_handle.is_none());

        let original: Value = serde_json::from_str(input).unwrap();
        assert_eq!(serde_json::to_value(&response).unwrap(), original);
        assert_eq!(response.document(), &original);
    }

    #[test]
    fn test_absent_fields_are_not_added() {
        let input = r#"{"id":"abc","type":"public-key","response":{"clientDataJSON":"c","authenticatorData":"a","signature":"s"}}"#;
        let forwarded = serde_json::to_value(AssertionResponse::parse(input).unwrap()).unwrap();
        assert!(forwarded.get("rawId").is_none());
        assert!(forwarded["response"].get("userHandle").is_none());
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        for input in ["", "{", "not json", "[]", r#"{"id":"x"}"#] {
            assert!(
                matches!(
                    AssertionResponse::parse(input),
                    Err(FidoError::MalformedAssertionResponse(_))
                ),
                "expected malformed for {input:?}"
            );
        }
    }

    #[test]
    fn test_wrong_type_is_malformed() {
        let input = VALID.replace("public-key", "password");
        let err = AssertionResponse::parse(&input).unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_empty_id_is_malformed() {
        let input = VALID.replacen("\"Y3JlZC1pZA\"", "\"\"", 1);
        assert!(AssertionResponse::parse(&input).is_err());
    }

    #[test]
    fn test_outcome_from_structured_error() {
        let error = FidoError::VerificationFailed {
            status: StatusCode::BAD_REQUEST,
            body: r#"{"error":"invalid","reason":"Signature mismatch"}"#.into(),
            server_error: ServerErrorBody::parse(r#"{"error":"invalid","reason":"Signature mismatch"}"#),
        };
        let outcome = VerificationOutcome::from_error(&error);
        assert!(!outcome.success);
        assert_eq!(outcome.failure_reason.as_deref(), Some("Signature mismatch"));
        assert!(outcome.server_response.is_some());
    }

    #[test]
    fn test_outcome_from_transport_error() {
        let error = FidoError::TransportError {
            operation: Operation::Verification,
            reason: "connection refused".into(),
        };
        let outcome = VerificationOutcome::from_error(&error);
        assert!(!outcome.success);
        assert!(outcome.failure_reason.unwrap().contains("connection refused"));
        assert!(outcome.server_response.is_none());
    }
}
