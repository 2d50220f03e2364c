//! Discover command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use fidogate_core::{ClientConfig, MetadataResolver};
use serde_json::json;
use tracing::info;

use crate::utils::print_field;

/// Execute the discover command.
pub async fn execute(config: ClientConfig, as_json: bool, quiet: bool) -> Result<()> {
    let resolver = MetadataResolver::new(&config)?;
    let metadata = resolver
        .resolve()
        .await
        .context("Metadata discovery failed")?;

    info!(
        assertion_endpoint = %metadata.assertion_endpoint,
        verification_endpoint = %metadata.verification_endpoint,
        "Discovered FIDO2 metadata"
    );

    if as_json {
        let doc = json!({
            "discovery_url": metadata.discovery_url.as_str(),
            "assertion_endpoint": metadata.assertion_endpoint.as_str(),
            "verification_endpoint": metadata.verification_endpoint.as_str(),
            "supported_algorithms": metadata.supported_algorithms,
            "issuer": metadata.issuer,
            "version": metadata.version,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    if quiet {
        println!("{}", metadata.assertion_endpoint);
        println!("{}", metadata.verification_endpoint);
        return Ok(());
    }

    println!();
    println!("{}", "FIDO2 metadata".bold());
    print_field("Discovery", &metadata.discovery_url);
    print_field("Assertion", metadata.assertion_endpoint.as_str().green());
    print_field("Verification", metadata.verification_endpoint.as_str().green());
    if let Some(issuer) = &metadata.issuer {
        print_field("Issuer", issuer);
    }
    if let Some(version) = &metadata.version {
        print_field("Version", version);
    }
    if !metadata.supported_algorithms.is_empty() {
        print_field("Algorithms", metadata.supported_algorithms.join(", "));
    }
    Ok(())
}
