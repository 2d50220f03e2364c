//! Exit codes following sysexits.h conventions.
//!
//! Scripts driving an authentication flow can tell a rejected assertion
//! apart from an unreachable server or a timeout.

use fidogate_core::{ErrorKind, FidoError};

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid URL, empty username).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Assertion malformed or rejected by the server.
/// Maps to EX_DATAERR from sysexits.h.
pub const VERIFICATION_FAILED: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// FIDO2 server unavailable or request failed.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const NETWORK_ERROR: i32 = 69;

/// Request timed out; the attempt may be restarted.
/// Maps to EX_TEMPFAIL from sysexits.h.
pub const TIMEOUT: i32 = 75;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Classify by the first typed error found in the chain
        let code = if let Some(fido) = err.chain().find_map(|e| e.downcast_ref::<FidoError>()) {
            code_for(fido)
        } else if err
            .chain()
            .any(|e| e.downcast_ref::<std::io::Error>().is_some())
        {
            INPUT_ERROR
        } else {
            GENERAL_ERROR
        };

        Self {
            code,
            message: Some(message),
        }
    }
}

/// Exit code for a library error.
pub fn code_for(err: &FidoError) -> i32 {
    match err.kind() {
        ErrorKind::InvalidInput | ErrorKind::Config => USAGE_ERROR,
        ErrorKind::MalformedAssertionResponse => VERIFICATION_FAILED,
        ErrorKind::VerificationFailed if err.is_rejection() => VERIFICATION_FAILED,
        ErrorKind::VerificationFailed
        | ErrorKind::MetadataUnavailable
        | ErrorKind::AssertionRequestFailed
        | ErrorKind::Transport => NETWORK_ERROR,
        ErrorKind::Timeout => TIMEOUT,
        ErrorKind::InvalidState => GENERAL_ERROR,
    }
}
