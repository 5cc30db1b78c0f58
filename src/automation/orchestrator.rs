use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::options::{AutomationOptions, StorageOptions};
use crate::cleaner::{
    Backup, DatabaseCleaner, OperationResult, ResultTree, RunStatus, Step, StorageCleaner,
    TelemetryResetter,
};
use crate::common::config::Config;
use crate::common::errors::ErrorKind;
use crate::ides::{Detector, Family, IdeDescriptor};
use crate::process::ProcessController;

/// Next steps shown once the identifiers are gone
pub const SIGNIN_INSTRUCTIONS: &[&str] = &[
    "Start the IDE",
    "Install or enable the extension if needed",
    "Sign in with the new account",
];

/// Cooperative cancellation flag, checked between steps and between IDEs
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// True when both tokens share one flag
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Emitted while a run progresses
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Detected { count: usize },
    StepStarted { ide: String, step: Step },
    StepFinished {
        ide: String,
        step: Step,
        success: bool,
        message: String,
    },
    IdeFinished { ide: String, success: bool },
}

/// Knobs the cleaners need from the configuration
#[derive(Debug, Clone)]
pub struct CleanSettings {
    pub vendor_marker: String,
    pub lock_jetbrains_ids: bool,
}

impl Default for CleanSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for CleanSettings {
    fn from(config: &Config) -> Self {
        Self {
            vendor_marker: config.vendor_marker.clone(),
            lock_jetbrains_ids: config.lock_jetbrains_ids,
        }
    }
}

/// Drives stop → clean → sign-in prep → restart across IDEs, one at a time
pub struct Orchestrator {
    backup: Box<dyn Backup + Send>,
    processes: ProcessController,
    settings: CleanSettings,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(
        backup: Box<dyn Backup + Send>,
        processes: ProcessController,
        settings: CleanSettings,
    ) -> Self {
        Self {
            backup,
            processes,
            settings,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn processes(&mut self) -> &mut ProcessController {
        &mut self.processes
    }

    // ─── Single operations ───────────────────────────────────────────────

    pub fn telemetry(&self, ide: &IdeDescriptor) -> OperationResult {
        TelemetryResetter::new(&*self.backup)
            .lock_jetbrains_ids(self.settings.lock_jetbrains_ids)
            .reset(ide)
    }

    pub fn database(&self, ide: &IdeDescriptor) -> OperationResult {
        if ide.family == Family::JetBrains {
            return OperationResult::skipped("JetBrains IDEs keep no editor state database");
        }
        DatabaseCleaner::new(&*self.backup, &self.settings.vendor_marker).clean(ide)
    }

    pub fn workspace_storage(&self, ide: &IdeDescriptor) -> OperationResult {
        if ide.family == Family::JetBrains {
            return OperationResult::skipped("JetBrains IDEs keep no workspace storage");
        }
        StorageCleaner::new(&*self.backup, &self.settings.vendor_marker).clean_workspace(ide)
    }

    pub fn global_storage(&self, ide: &IdeDescriptor) -> OperationResult {
        if ide.family == Family::JetBrains {
            return OperationResult::skipped("JetBrains IDEs keep no global storage");
        }
        StorageCleaner::new(&*self.backup, &self.settings.vendor_marker).clean_global(ide)
    }

    pub fn storage(&self, ide: &IdeDescriptor, options: &StorageOptions) -> OperationResult {
        if ide.family == Family::JetBrains {
            return OperationResult::skipped("JetBrains IDEs keep no editor storage");
        }
        StorageCleaner::new(&*self.backup, &self.settings.vendor_marker)
            .clean_comprehensive(ide, options)
    }

    pub fn signin_prep(&self, ide: &IdeDescriptor) -> OperationResult {
        OperationResult::ok(format!("{} is ready for a new sign-in", ide.display_name))
            .with("instructions", SIGNIN_INSTRUCTIONS)
    }

    // ─── Pipelines ───────────────────────────────────────────────────────

    /// Detect IDEs, then run the enabled steps on each
    pub fn run_automation(
        &mut self,
        detector: &Detector,
        options: &AutomationOptions,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> ResultTree {
        let ides = detector.scan();
        self.run_on(&ides, options, progress)
    }

    /// Run the enabled steps on the given IDEs. Every IDE and every enabled
    /// step is attempted regardless of earlier failures.
    pub fn run_on(
        &mut self,
        ides: &[IdeDescriptor],
        options: &AutomationOptions,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> ResultTree {
        const OPERATION: &str = "automation";
        progress(ProgressEvent::Detected { count: ides.len() });
        if ides.is_empty() {
            tracing::warn!("No IDEs detected; automation aborted");
            return ResultTree::aborted(OPERATION, "No supported IDEs were detected");
        }

        let mut tree = ResultTree::new(OPERATION);
        'ides: for ide in ides {
            let mut plan: Vec<Step> = Vec::new();
            if options.include_signout {
                plan.push(Step::Signout);
            }
            if options.include_cleaning {
                plan.extend(CLEANING_STEPS);
            }
            if options.include_signin {
                plan.push(Step::SigninPrep);
            }
            if options.include_restart {
                plan.push(Step::Restart);
            }

            for step in plan {
                if self.cancel.is_cancelled() {
                    tree.status = RunStatus::Cancelled;
                    break 'ides;
                }
                self.run_step(ide, step, &mut tree, progress);
            }

            let success = tree.ide(&ide.display_name).map_or(true, |r| r.success);
            progress(ProgressEvent::IdeFinished {
                ide: ide.display_name.clone(),
                success,
            });
        }

        tree.finish();
        tree
    }

    /// Every cleaning step on every IDE, without touching processes
    pub fn run_cleaning(
        &mut self,
        ides: &[IdeDescriptor],
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> ResultTree {
        let options = AutomationOptions {
            include_signout: false,
            include_cleaning: true,
            include_signin: false,
            include_restart: false,
        };
        let mut tree = self.run_on(ides, &options, progress);
        tree.operation = "all".to_string();
        tree
    }

    fn run_step(
        &mut self,
        ide: &IdeDescriptor,
        step: Step,
        tree: &mut ResultTree,
        progress: &mut dyn FnMut(ProgressEvent),
    ) {
        progress(ProgressEvent::StepStarted {
            ide: ide.display_name.clone(),
            step,
        });

        let result = guarded(&ide.display_name, step, || match step {
            Step::Signout | Step::Stop => self.processes.stop(ide),
            Step::Telemetry => self.telemetry(ide),
            Step::Database if ide.db_path.is_none() && !ide.is_jetbrains() => {
                OperationResult::skipped("No state database detected")
            }
            Step::Database => self.database(ide),
            Step::WorkspaceStorage
                if ide.workspace_storage_path.is_none() && !ide.is_jetbrains() =>
            {
                OperationResult::skipped("No workspace storage detected")
            }
            Step::WorkspaceStorage => self.workspace_storage(ide),
            Step::GlobalStorage if ide.global_storage_path.is_none() && !ide.is_jetbrains() => {
                OperationResult::skipped("No global storage detected")
            }
            Step::GlobalStorage => self.global_storage(ide),
            Step::Storage => self.storage(ide, &StorageOptions::default()),
            Step::SigninPrep => self.signin_prep(ide),
            Step::Restart | Step::Start => self.processes.start(ide),
        });

        if result.is_success() {
            tracing::info!("{} / {}: {}", ide.display_name, step, result.message());
        } else {
            tracing::warn!("{} / {} failed: {}", ide.display_name, step, result.message());
        }

        progress(ProgressEvent::StepFinished {
            ide: ide.display_name.clone(),
            step,
            success: result.is_success(),
            message: result.message().to_string(),
        });
        tree.record(&ide.display_name, step, result);
    }
}

/// Run one step, turning a panic inside it into a failed result so the
/// remaining steps and IDEs still run.
pub fn guarded<F>(ide: &str, step: Step, op: F) -> OperationResult
where
    F: FnOnce() -> OperationResult,
{
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("{} / {} panicked: {}", ide, step, detail);
            OperationResult::failed(
                format!("{} aborted unexpectedly", step),
                ErrorKind::Unexpected,
                detail,
            )
        }
    }
}

const CLEANING_STEPS: [Step; 4] = [
    Step::Telemetry,
    Step::Database,
    Step::WorkspaceStorage,
    Step::GlobalStorage,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::BackupManager;
    use crate::ides::Product;
    use crate::process::{Launcher, ProcessInfo, ProcessLister};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    struct NoProcesses;

    impl ProcessLister for NoProcesses {
        fn list(&mut self) -> Vec<ProcessInfo> {
            Vec::new()
        }
        fn terminate(&mut self, _pid: u32) -> bool {
            false
        }
        fn kill(&mut self, _pid: u32) -> bool {
            false
        }
        fn is_alive(&mut self, _pid: u32) -> bool {
            false
        }
    }

    struct NoLaunch;

    impl Launcher for NoLaunch {
        fn launch(&mut self, _exe: &Path) -> std::io::Result<u32> {
            Err(std::io::Error::from(std::io::ErrorKind::NotFound))
        }
    }

    fn orchestrator() -> Orchestrator {
        let processes = ProcessController::new(Box::new(NoProcesses), Box::new(NoLaunch))
            .with_timeouts(Duration::from_millis(10), Duration::from_millis(10));
        Orchestrator::new(
            Box::new(BackupManager::default()),
            processes,
            CleanSettings::default(),
        )
    }

    fn editor(dir: &Path) -> IdeDescriptor {
        let storage = dir.join("storage.json");
        std::fs::write(&storage, r#"{"telemetry.machineId": "old"}"#).unwrap();
        let mut d = IdeDescriptor::new(Product::VsCode);
        d.storage_path = Some(storage);
        d
    }

    #[test]
    fn test_guarded_turns_panic_into_unexpected_failure() {
        let result = guarded("VS Code", Step::Telemetry, || panic!("boom"));
        assert!(!result.is_success());
        let error = result.error().unwrap();
        assert_eq!(error.kind, ErrorKind::Unexpected);
        assert_eq!(error.detail, "boom");

        let fine = guarded("VS Code", Step::SigninPrep, || OperationResult::ok("done"));
        assert!(fine.is_success());
    }

    #[test]
    fn test_empty_detection_aborts() {
        let mut events = Vec::new();
        let tree = orchestrator().run_on(&[], &AutomationOptions::default(), &mut |e| {
            events.push(e)
        });
        assert_eq!(tree.status, RunStatus::Aborted);
        assert!(tree.ides.is_empty());
        assert_eq!(events, vec![ProgressEvent::Detected { count: 0 }]);
    }

    #[test]
    fn test_steps_run_in_order_and_missing_paths_are_skipped() {
        let dir = TempDir::new().unwrap();
        let ide = editor(dir.path());
        let options = AutomationOptions {
            include_restart: false,
            ..Default::default()
        };

        let tree = orchestrator().run_on(&[ide], &options, &mut |_| {});
        let report = tree.ide("VS Code").unwrap();
        let steps: Vec<Step> = report.steps.keys().copied().collect();
        assert_eq!(
            steps,
            vec![
                Step::Signout,
                Step::Telemetry,
                Step::Database,
                Step::WorkspaceStorage,
                Step::GlobalStorage,
                Step::SigninPrep,
            ]
        );
        assert!(report.success, "{:?}", report);
        assert!(report.get(Step::Database).unwrap().is_skipped());
        assert_eq!(report.get(Step::Signout).unwrap().count("processes_closed"), 0);
    }

    #[test]
    fn test_failed_restart_marks_ide_failed_but_keeps_other_steps() {
        let dir = TempDir::new().unwrap();
        let ide = editor(dir.path());

        let tree = orchestrator().run_on(&[ide], &AutomationOptions::default(), &mut |_| {});
        let report = tree.ide("VS Code").unwrap();
        assert!(!report.success);
        assert_eq!(report.failed_steps(), vec![Step::Restart]);
        assert!(report.get(Step::Telemetry).unwrap().is_success());
        assert_eq!(tree.status, RunStatus::Done);
        assert_eq!(tree.message, "0 of 1 IDEs completed successfully");
    }

    #[test]
    fn test_jetbrains_editor_steps_are_skipped() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("JetBrains/GoLand2024.1");
        std::fs::create_dir_all(&config).unwrap();
        let mut ide = IdeDescriptor::new(Product::GoLand);
        ide.config_path = Some(config);

        let options = AutomationOptions {
            include_signout: false,
            include_restart: false,
            ..Default::default()
        };
        let tree = orchestrator().run_on(&[ide], &options, &mut |_| {});
        let report = tree.ide("GoLand").unwrap();
        assert!(report.success, "{:?}", report);
        assert!(report.get(Step::Database).unwrap().is_skipped());
        assert!(report.get(Step::GlobalStorage).unwrap().is_skipped());
        assert!(!report.get(Step::Telemetry).unwrap().is_skipped());
    }

    #[test]
    fn test_cancel_before_start_records_nothing() {
        let dir = TempDir::new().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let tree = orchestrator().with_cancel(cancel).run_on(
            &[editor(dir.path())],
            &AutomationOptions::default(),
            &mut |_| {},
        );
        assert_eq!(tree.status, RunStatus::Cancelled);
        assert!(tree.ides.is_empty());
    }

    #[test]
    fn test_progress_reports_every_step() {
        let dir = TempDir::new().unwrap();
        let options = AutomationOptions {
            include_signout: false,
            include_cleaning: false,
            ..Default::default()
        };
        let mut finished = Vec::new();
        orchestrator().run_on(&[editor(dir.path())], &options, &mut |e| {
            if let ProgressEvent::StepFinished { step, .. } = e {
                finished.push(step);
            }
        });
        assert_eq!(finished, vec![Step::SigninPrep, Step::Restart]);
    }
}
