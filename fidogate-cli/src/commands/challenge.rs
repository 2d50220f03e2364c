//! Challenge command implementation.

use anyhow::{Context, Result};
use clap::ValueEnum;
use fidogate_core::{AssertionOptions, AssertionValidator, ClientConfig, UserVerification};
use tracing::info;

/// User verification requirement accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum UserVerificationArg {
    Required,
    Preferred,
    Discouraged,
}

impl From<UserVerificationArg> for UserVerification {
    fn from(arg: UserVerificationArg) -> Self {
        match arg {
            UserVerificationArg::Required => UserVerification::Required,
            UserVerificationArg::Preferred => UserVerification::Preferred,
            UserVerificationArg::Discouraged => UserVerification::Discouraged,
        }
    }
}

/// Execute the challenge command.
///
/// The challenge body is written to stdout verbatim so it can be piped to
/// the client performing the WebAuthn ceremony.
pub async fn execute(
    config: ClientConfig,
    username: String,
    user_verification: Option<UserVerificationArg>,
) -> Result<()> {
    // Validate before touching the network.
    let mut options = AssertionOptions::new(&username)?;
    if let Some(uv) = user_verification {
        options = options.with_user_verification(uv.into());
    }

    let validator = AssertionValidator::connect(config)
        .await
        .context("Metadata discovery failed")?;

    let challenge = validator
        .request_assertion_with(&options)
        .await
        .context("Assertion request failed")?;

    info!(username = %challenge.username, bytes = challenge.body.len(), "Challenge issued");
    println!("{}", challenge.body);
    Ok(())
}
