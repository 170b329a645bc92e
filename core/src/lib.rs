pub mod backup;
pub mod codec;
pub mod delete;
pub mod driver;
pub mod error;
pub mod manifest;
pub mod ops;
pub mod restore;
pub mod store;
pub mod types;

pub use backup::{create_backup, BackupConfig};
pub use delete::{delete_backup, delete_volume, DeleteOptions};
pub use error::{Error, Result};
pub use manifest::{inspect_backup, Backup, Volume};
pub use restore::{restore_backup, restore_backup_incrementally};
pub use types::*;
