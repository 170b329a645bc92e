mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{
    inspect::InspectCommand,
    remove::{RemoveCommand, RemoveVolumeCommand},
    restore::RestoreCommand,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "blockvault",
    about = "Incremental block-level backups of volume snapshots",
    long_about = "Blockvault stores deduplicated, content-addressed block backups of volume snapshots in an object store and restores them to local devices"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, help = "Enable quiet mode")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Remove a backup and garbage-collect its blocks")]
    Remove(RemoveCommand),

    #[command(about = "Remove a backup volume and everything stored under it")]
    RemoveVolume(RemoveVolumeCommand),

    #[command(about = "Restore a backup to a local device or file")]
    Restore(RestoreCommand),

    #[command(about = "Print a backup manifest")]
    Inspect(InspectCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);
    blockvault_backends::register_builtin_drivers();

    match cli.command {
        Commands::Remove(ref cmd) => cmd.run(&cli).await,
        Commands::RemoveVolume(ref cmd) => cmd.run(&cli).await,
        Commands::Restore(ref cmd) => cmd.run(&cli).await,
        Commands::Inspect(ref cmd) => cmd.run(&cli).await,
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!("blockvault={}", level)))
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Setting default subscriber failed");
}
