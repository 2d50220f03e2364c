//! Verify command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use fidogate_core::{AssertionResponse, AssertionValidator, ClientConfig, FidoError};
use tracing::{error, info};

use crate::utils::{print_field, read_input};

/// Execute the verify command.
pub async fn execute(config: ClientConfig, response: Option<PathBuf>, quiet: bool) -> Result<()> {
    let raw = read_input(response.as_deref())?;

    // Malformed input is rejected before any network call.
    let response = AssertionResponse::parse(&raw).context("Verification failed")?;
    info!(credential_id = %response.id, "Read assertion response");

    let validator = AssertionValidator::connect(config)
        .await
        .context("Metadata discovery failed")?;

    match validator.verify_response(&response).await {
        Ok(outcome) => {
            if !quiet {
                println!();
                println!("{}", "╔════════════════════════════════════════╗".green());
                println!("{}", "║              VERIFIED                  ║".green().bold());
                println!("{}", "╚════════════════════════════════════════╝".green());
                println!();
                print_field("Credential", &response.id);
                print_field(
                    "Verified at",
                    outcome.verified_at.format("%Y-%m-%d %H:%M:%S UTC"),
                );
            }
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "Assertion was not verified");

            if !quiet {
                let reason = match &err {
                    FidoError::VerificationFailed {
                        server_error: Some(server_error),
                        ..
                    } => server_error.description().unwrap_or("rejected").to_string(),
                    other => other.to_string(),
                };
                println!();
                println!("{}", "╔════════════════════════════════════════╗".red());
                println!("{}", "║              REJECTED                  ║".red().bold());
                println!("{}", "╚════════════════════════════════════════╝".red());
                println!();
                print_field("Credential", &response.id);
                print_field("Reason", reason.red());
            }
            Err(err).context("Verification failed")
        }
    }
}
