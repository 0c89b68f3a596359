//! sixhound unified CLI.
//!
//! IPv6 host discovery through model-driven scanning, alias-network
//! detection, and neighborhood fan-out.
//!
//! # Quick Start
//!
//! ```bash
//! # Run the discovery pipeline indefinitely
//! sixhound scan
//!
//! # Check a single range for aliasing and find its boundary
//! sixhound alias 2001:db8::/32
//!
//! # Apply the current blacklist to an address list
//! sixhound clean responses.hex cleaned.hex
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// sixhound - IPv6 host discovery through statistical scanning.
#[derive(Parser)]
#[command(name = "sixhound")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory holding sixhound.toml and the data root.
    #[arg(short, long, default_value = ".")]
    project_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the discovery pipeline until interrupted.
    Scan {
        /// Override the target network for candidate generation.
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Detect whether a CIDR range is aliased and locate its boundary.
    Alias {
        /// The range to test, in CIDR notation.
        cidr: String,
    },

    /// Filter an address list through the current blacklist.
    Clean {
        /// Input hex-line address file.
        input: String,

        /// Output hex-line address file.
        output: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { target } => commands::scan::run(&cli.project_dir, target.as_deref()),
        Commands::Alias { cidr } => commands::alias::run(&cli.project_dir, &cidr),
        Commands::Clean { input, output } => {
            commands::clean::run(&cli.project_dir, &input, &output)
        }
    }
}
