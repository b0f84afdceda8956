//! SiteCopy
//!
//! Mirrors a production site (file tree plus MySQL database) onto the local
//! machine in one run: archive and dump over SSH, download, unpack, reimport.

// sitecopy/src/main.rs
mod capture;  // Remote archive/dump commands and snapshot naming
mod cleanup;  // Artifact deletion and handle release
mod config;   // config.json loading and validation
mod errors;
mod pipeline; // The run state machine
mod restore;  // Local extraction and database reimport
mod session;  // SSH session, file channel, local MySQL store
mod snapshot; // Snapshot identity and artifact names
mod transfer; // Atomic artifact downloads
mod utils;

#[cfg(test)]
mod testing;

use clap::{ArgAction, Parser};
use config::RunConfiguration;
use pipeline::Pipeline;
use session::SystemConnector;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit code for an unusable configuration (EX_CONFIG).
const EXIT_CONFIG: u8 = 78;
/// Exit code after Ctrl-C (128 + SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "sitecopy",
    version,
    about = "Copy a production site's files and database to this machine",
    disable_version_flag = true
)]
struct Cli {
    /// Path to the run configuration
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sitecopy=info")),
        )
        .with_target(false)
        .init();

    let config = match RunConfiguration::load_from_json(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration error: {:?}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    println!("🚀 Starting snapshot of {}@{}...", config.ssh.user, config.ssh.host);
    let mut pipeline = Pipeline::new(config);
    let outcome = pipeline.run(&SystemConnector).await;
    debug!("Pipeline states: {:?}", pipeline.history());
    match outcome {
        Ok(()) => {
            if let Some(identity) = pipeline.identity() {
                println!("📸 Snapshot {} is now the local copy.", identity.base_name);
            }
            println!("✅ Snapshot completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) if e.is_interrupted() => {
            eprintln!("❌ {}", e);
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(e) if e.is_configuration() => {
            eprintln!("❌ Error: {}", e);
            ExitCode::from(EXIT_CONFIG)
        }
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
