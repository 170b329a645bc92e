use anyhow::Result;
use blockvault_core::{inspect_backup, restore_backup, restore_backup_incrementally};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct RestoreCommand {
    #[arg(help = "Backup URL, e.g. s3://bucket/store?backup=<name>&volume=<volume>")]
    backup_url: String,

    #[arg(help = "Target device or file path")]
    output: PathBuf,

    #[arg(
        long,
        help = "Name of the backup currently on the device; switches to incremental restore"
    )]
    last_backup: Option<String>,
}

impl RestoreCommand {
    pub async fn run(&self, _cli: &crate::Cli) -> Result<()> {
        let backup = inspect_backup(&self.backup_url).await?;

        info!("Restoring backup: {}", backup.name);

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        pb.set_message(format!(
            "Restoring {} blocks to {}...",
            backup.blocks.len(),
            self.output.display()
        ));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        match &self.last_backup {
            Some(last_backup) => {
                restore_backup_incrementally(&self.backup_url, &self.output, last_backup).await?;
            }
            None => {
                restore_backup(&self.backup_url, &self.output).await?;
            }
        }

        pb.finish_with_message("Restore completed");

        println!("Restored backup {} of volume {}", backup.name, backup.volume_name);
        println!("Snapshot: {}", backup.snapshot_name);
        println!("Blocks:   {}", backup.blocks.len());
        println!("Target:   {}", self.output.display());
        Ok(())
    }
}
