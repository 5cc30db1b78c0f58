pub mod backup;
pub mod database;
pub mod ids;
pub mod manifest;
pub mod result;
pub mod storage;
pub mod telemetry;

pub use backup::{list_backups, restore_backup, Backup, BackupEntry, BackupManager, BackupRecord};
pub use database::DatabaseCleaner;
pub use manifest::{RunManifest, RunSummary};
pub use result::{
    IdeReport, OperationError, OperationResult, Outcome, ResultTree, RunStatus, Step,
};
pub use storage::{StorageCleaner, StorageOptions};
pub use telemetry::TelemetryResetter;
