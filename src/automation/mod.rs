pub mod options;
pub mod orchestrator;

pub use options::{AutomationOptions, StorageOptions};
pub use orchestrator::{
    guarded, CancelToken, CleanSettings, Orchestrator, ProgressEvent, SIGNIN_INSTRUCTIONS,
};
