//! Invocation surface shared by the CLI and the FFI bridge.
//!
//! Every operation takes a [`Target`], fans out over the matching IDEs and
//! returns a [`ResultTree`]. Nothing here returns `Err`: failures are
//! recorded in the tree against the IDE and step they belong to.

use std::path::PathBuf;

use crate::automation::{
    guarded, AutomationOptions, CancelToken, CleanSettings, Orchestrator, ProgressEvent,
    StorageOptions,
};
use crate::cleaner::{BackupManager, OperationResult, ResultTree, RunManifest, Step};
use crate::common::config::Config;
use crate::ides::{Detector, Environment, IdeDescriptor};
use crate::process::ProcessController;

/// Which IDEs an operation applies to
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Target {
    /// Every detected IDE
    #[default]
    All,
    /// Detected IDEs whose slug or display name matches
    Named(String),
    /// A descriptor the caller already holds
    Descriptor(Box<IdeDescriptor>),
}

impl Target {
    pub fn from_selector(selector: Option<&str>) -> Self {
        match selector.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => Target::Named(name.to_string()),
            None => Target::All,
        }
    }
}

pub struct Api {
    config: Config,
    env: Environment,
    run_log_dir: Option<PathBuf>,
    cancel: CancelToken,
    orchestrator: Orchestrator,
}

impl Api {
    pub fn new(config: Config, env: Environment) -> Self {
        let cancel = CancelToken::new();
        let orchestrator =
            Self::build_orchestrator(&config, ProcessController::default(), cancel.clone());
        Self {
            config,
            env,
            run_log_dir: Some(Config::logs_dir()),
            cancel,
            orchestrator,
        }
    }

    /// Api for the current user with the on-disk configuration
    pub fn from_system() -> Self {
        let config = Config::load().unwrap_or_else(|e| {
            tracing::warn!("Falling back to default config: {:#}", e);
            Config::default()
        });
        Self::new(config, Environment::from_process())
    }

    fn build_orchestrator(
        config: &Config,
        processes: ProcessController,
        cancel: CancelToken,
    ) -> Orchestrator {
        Orchestrator::new(
            Box::new(BackupManager::new(config.backup_root.clone())),
            processes,
            CleanSettings::from(config),
        )
        .with_cancel(cancel)
    }

    /// Use a different process controller (fake listers in tests)
    pub fn with_process_controller(mut self, processes: ProcessController) -> Self {
        self.orchestrator = Self::build_orchestrator(&self.config, processes, self.cancel.clone());
        self
    }

    /// Token that stops a running pipeline between steps
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Where run trees are appended; `None` disables the run log
    pub fn with_run_log(mut self, dir: Option<PathBuf>) -> Self {
        self.run_log_dir = dir;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn detector(&self) -> Detector {
        Detector::new(self.env.clone()).with_exclusions(&self.config.exclude_ides)
    }

    // ─── Operations ──────────────────────────────────────────────────────

    pub fn detect_ides(&self) -> Vec<IdeDescriptor> {
        self.detector().scan()
    }

    pub fn modify_telemetry(&mut self, target: &Target) -> ResultTree {
        self.fan_out("telemetry", target, Step::Telemetry, |o, ide| o.telemetry(ide))
    }

    pub fn clean_database(&mut self, target: &Target) -> ResultTree {
        self.fan_out("database", target, Step::Database, |o, ide| o.database(ide))
    }

    pub fn clean_workspace(&mut self, target: &Target) -> ResultTree {
        self.fan_out("workspace", target, Step::WorkspaceStorage, |o, ide| {
            o.workspace_storage(ide)
        })
    }

    pub fn clean_global_storage(&mut self, target: &Target) -> ResultTree {
        self.fan_out("global_storage", target, Step::GlobalStorage, |o, ide| {
            o.global_storage(ide)
        })
    }

    pub fn clean_storage_comprehensive(
        &mut self,
        target: &Target,
        options: &StorageOptions,
    ) -> ResultTree {
        let options = *options;
        self.fan_out("storage", target, Step::Storage, move |o, ide| {
            o.storage(ide, &options)
        })
    }

    /// Telemetry, database and both storage cleans on each IDE
    pub fn run_all_operations(
        &mut self,
        target: &Target,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> ResultTree {
        let ides = match self.resolve("all", target) {
            Ok(ides) => ides,
            Err(tree) => return self.logged(tree),
        };
        let tree = self.orchestrator.run_cleaning(&ides, progress);
        self.logged(tree)
    }

    /// Full pipeline; `options` falls back to the configured defaults
    pub fn run_full_automation(
        &mut self,
        target: &Target,
        options: Option<&AutomationOptions>,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> ResultTree {
        let options = options.copied().unwrap_or(self.config.automation);
        let ides = match self.resolve("automation", target) {
            Ok(ides) => ides,
            Err(tree) => return self.logged(tree),
        };
        let tree = self.orchestrator.run_on(&ides, &options, progress);
        self.logged(tree)
    }

    pub fn stop_ide(&mut self, target: &Target) -> ResultTree {
        self.fan_out_mut("stop", target, Step::Stop, |o, ide| o.processes().stop(ide))
    }

    pub fn start_ide(&mut self, target: &Target) -> ResultTree {
        self.fan_out_mut("start", target, Step::Start, |o, ide| o.processes().start(ide))
    }

    // ─── Plumbing ────────────────────────────────────────────────────────

    /// IDEs a target currently resolves to
    pub fn targets(&self, target: &Target) -> Vec<IdeDescriptor> {
        match target {
            Target::Descriptor(d) => vec![(**d).clone()],
            Target::All => self.detect_ides(),
            Target::Named(name) => self
                .detect_ides()
                .into_iter()
                .filter(|d| d.matches(name))
                .collect(),
        }
    }

    fn resolve(&self, operation: &str, target: &Target) -> Result<Vec<IdeDescriptor>, ResultTree> {
        let ides = self.targets(target);

        if ides.is_empty() {
            let message = match target {
                Target::Named(name) => format!("No detected IDE matches '{}'", name),
                _ => "No supported IDEs were detected".to_string(),
            };
            tracing::warn!("{}: {}", operation, message);
            return Err(ResultTree::aborted(operation, message));
        }
        Ok(ides)
    }

    fn fan_out<F>(&mut self, operation: &str, target: &Target, step: Step, op: F) -> ResultTree
    where
        F: Fn(&Orchestrator, &IdeDescriptor) -> OperationResult,
    {
        self.fan_out_mut(operation, target, step, |o, ide| op(&*o, ide))
    }

    fn fan_out_mut<F>(
        &mut self,
        operation: &str,
        target: &Target,
        step: Step,
        mut op: F,
    ) -> ResultTree
    where
        F: FnMut(&mut Orchestrator, &IdeDescriptor) -> OperationResult,
    {
        let ides = match self.resolve(operation, target) {
            Ok(ides) => ides,
            Err(tree) => return self.logged(tree),
        };

        let mut tree = ResultTree::new(operation);
        for ide in &ides {
            let orchestrator = &mut self.orchestrator;
            let result = guarded(&ide.display_name, step, || op(orchestrator, ide));
            tree.record(&ide.display_name, step, result);
        }
        tree.finish();
        self.logged(tree)
    }

    fn logged(&self, tree: ResultTree) -> ResultTree {
        if let Some(dir) = &self.run_log_dir {
            if let Err(e) = RunManifest::new(&tree).append(dir) {
                tracing::warn!("Could not write run log: {:#}", e);
            }
        }
        tree
    }
}
