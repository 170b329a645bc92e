use anyhow::Result;
use blockvault_core::inspect_backup;
use clap::Args;

#[derive(Args)]
pub struct InspectCommand {
    #[arg(help = "Backup URL, e.g. s3://bucket/store?backup=<name>&volume=<volume>")]
    backup_url: String,
}

impl InspectCommand {
    pub async fn run(&self, _cli: &crate::Cli) -> Result<()> {
        let backup = inspect_backup(&self.backup_url).await?;
        println!("{}", serde_json::to_string_pretty(&backup)?);
        Ok(())
    }
}
