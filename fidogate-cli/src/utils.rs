//! Common utility functions shared across CLI commands.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use fidogate_core::ClientConfig;
use tracing::debug;

/// Connection settings shared by every subcommand.
#[derive(Args, Clone, Debug)]
pub struct ServerArgs {
    /// Base URL of the authentication server
    #[arg(long, env = "FIDOGATE_BASE_URL", value_name = "URL")]
    pub base_url: String,

    /// Timeout for each request, in seconds
    #[arg(long, env = "FIDOGATE_TIMEOUT_SECS", default_value_t = 10, value_name = "SECS")]
    pub timeout_secs: u64,

    /// Timeout for establishing a connection, in seconds
    #[arg(long, env = "FIDOGATE_CONNECT_TIMEOUT_SECS", default_value_t = 5, value_name = "SECS")]
    pub connect_timeout_secs: u64,

    /// Refuse plain http:// endpoints
    #[arg(long, env = "FIDOGATE_HTTPS_ONLY")]
    pub https_only: bool,

    /// Refetch metadata once it is older than this many seconds
    #[arg(long, env = "FIDOGATE_METADATA_MAX_AGE_SECS", value_name = "SECS")]
    pub metadata_max_age_secs: Option<u64>,
}

/// Build the client configuration from command line arguments.
pub fn build_config(args: &ServerArgs) -> Result<ClientConfig> {
    let mut config = ClientConfig::new(&args.base_url)?
        .with_timeout(Duration::from_secs(args.timeout_secs.max(1)))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout_secs.max(1)))
        .with_https_only(args.https_only);
    if let Some(secs) = args.metadata_max_age_secs.filter(|secs| *secs > 0) {
        config = config.with_metadata_max_age(Duration::from_secs(secs));
    }

    debug!(
        base_url = %config.base_url,
        timeout_secs = config.timeout.as_secs(),
        https_only = config.https_only,
        "Using FIDO2 server"
    );
    Ok(config)
}

/// Read an input document from a file, or from stdin when the path is absent or "-".
pub fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read response file: {}", path.display())),
        _ => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read response from stdin")?;
            Ok(buffer)
        }
    }
}

/// Print a dimmed label followed by a value.
pub fn print_field(label: &str, value: impl std::fmt::Display) {
    println!("   {} {}", format!("{label}:").dimmed(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn server_args(base_url: &str) -> ServerArgs {
        ServerArgs {
            base_url: base_url.to_string(),
            timeout_secs: 10,
            connect_timeout_secs: 5,
            https_only: false,
            metadata_max_age_secs: None,
        }
    }

    #[test]
    fn test_build_config() {
        let args = ServerArgs {
            timeout_secs: 3,
            ..server_args("https://auth.example.com")
        };
        let config = build_config(&args).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(!config.https_only);
        assert!(config.metadata_max_age.is_none());

        let args = ServerArgs {
            timeout_secs: 0,
            ..server_args("https://auth.example.com")
        };
        assert_eq!(build_config(&args).unwrap().timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_build_config_applies_connection_settings() {
        let args = ServerArgs {
            connect_timeout_secs: 2,
            https_only: true,
            metadata_max_age_secs: Some(300),
            ..server_args("https://auth.example.com")
        };
        let config = build_config(&args).unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert!(config.https_only);
        assert_eq!(config.metadata_max_age, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_build_config_rejects_invalid_url() {
        assert!(build_config(&server_args("not a url")).is_err());
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_input(Some(&PathBuf::from("/nonexistent/response.json"))).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read response file"));
    }
}
