use anyhow::Result;
use blockvault_core::{delete_backup, delete_volume, DeleteOptions};
use clap::Args;
use tracing::info;

#[derive(Args)]
pub struct RemoveCommand {
    #[arg(help = "Backup URL, e.g. s3://bucket/store?backup=<name>&volume=<volume>")]
    backup_url: String,

    #[arg(
        long,
        help = "When removing the volume's last backup, also remove its orphaned block files"
    )]
    sweep_orphans: bool,
}

impl RemoveCommand {
    pub async fn run(&self, _cli: &crate::Cli) -> Result<()> {
        info!("Removing backup: {}", self.backup_url);

        let opts = DeleteOptions {
            sweep_orphaned_blocks: self.sweep_orphans,
        };
        delete_backup(&self.backup_url, &opts).await?;

        println!("Removed backup {}", self.backup_url);
        Ok(())
    }
}

#[derive(Args)]
pub struct RemoveVolumeCommand {
    #[arg(help = "Volume URL, e.g. s3://bucket/store?volume=<volume>")]
    volume_url: String,
}

impl RemoveVolumeCommand {
    pub async fn run(&self, _cli: &crate::Cli) -> Result<()> {
        info!("Removing backup volume: {}", self.volume_url);

        delete_volume(&self.volume_url).await?;

        println!("Removed backup volume {}", self.volume_url);
        Ok(())
    }
}
