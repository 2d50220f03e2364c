//! fidogate CLI - FIDO2 assertion flows from the command line.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod exit_codes;
mod utils;

use commands::challenge::UserVerificationArg;
use exit_codes::ExitCode;
use utils::ServerArgs;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error (invalid URL, empty username)
  65  Assertion malformed or rejected by the server
  66  Cannot read input file
  69  FIDO2 server unavailable or request failed
  75  Request timed out";

#[derive(Parser)]
#[command(name = "fidogate")]
#[command(author, version, about = "FIDO2/WebAuthn assertion helper", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppress decorated output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and display the server's FIDO2 metadata
    Discover {
        #[command(flatten)]
        server: ServerArgs,

        /// Print metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Request an assertion challenge for a user
    Challenge {
        #[command(flatten)]
        server: ServerArgs,

        /// User to authenticate
        #[arg(short, long)]
        username: String,

        /// User verification requirement to request
        #[arg(long, value_enum)]
        user_verification: Option<UserVerificationArg>,
    },

    /// Verify a signed assertion response
    Verify {
        #[command(flatten)]
        server: ServerArgs,

        /// File holding the assertion JSON (reads stdin when omitted or "-")
        #[arg(value_name = "RESPONSE")]
        response: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "fidogate_core=info,fidogate=info,warn",
        _ => "fidogate_core=debug,fidogate=debug,info",
    };

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let quiet = cli.quiet;
    match cli.command {
        Commands::Discover { server, json } => {
            let config = utils::build_config(&server)?;
            commands::discover::execute(config, json, quiet).await
        }
        Commands::Challenge {
            server,
            username,
            user_verification,
        } => {
            let config = utils::build_config(&server)?;
            commands::challenge::execute(config, username, user_verification).await
        }
        Commands::Verify { server, response } => {
            let config = utils::build_config(&server)?;
            commands::verify::execute(config, response, quiet).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit = match run(cli).await {
        Ok(()) => ExitCode::success(),
        Err(err) => ExitCode::from_anyhow(&err),
    };

    if let Some(message) = &exit.message {
        eprintln!("{} {}", "error:".red().bold(), message);
    }
    std::process::exit(exit.code);
}
