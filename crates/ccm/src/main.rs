//! CCM - migrate a Claude Code configuration between machines.

mod commands;

use ccm_migrate::Layout;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ccm")]
#[command(
    author,
    version,
    about = "Back up a Claude Code configuration or push it to a remote host"
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or create the ccm config file
    Config {
        /// Write the default config file
        #[arg(long)]
        init: bool,

        /// Print the config file path
        #[arg(long)]
        path: bool,
    },

    /// Pack the configuration into a local archive
    Backup {
        /// Archive path, or a directory to place the archive in
        output: Option<String>,

        /// List the files without writing an archive
        #[arg(long)]
        dry_run: bool,
    },

    /// Push the configuration to a remote host over SSH
    Push {
        /// Remote host as user@host[:port] (defaults to the configured target)
        target: Option<String>,

        /// List the files without connecting
        #[arg(long)]
        dry_run: bool,

        /// Do not compare local and remote Claude Code versions
        #[arg(long)]
        skip_version_check: bool,
    },

    /// Unpack an archive and show its manifest
    Extract {
        /// Archive to unpack
        archive: PathBuf,

        /// Destination directory
        dest: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let layout = Layout::detect()?;

    match cli.command {
        Commands::Config { init, path } => commands::config(&layout, init, path)?,
        Commands::Backup { output, dry_run } => {
            commands::backup(&layout, output.as_deref(), dry_run).await?
        }
        Commands::Push {
            target,
            dry_run,
            skip_version_check,
        } => commands::push(&layout, target, dry_run, skip_version_check).await?,
        Commands::Extract { archive, dest } => commands::extract(&archive, &dest)?,
    }

    Ok(())
}
