use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::backup::{Backup, BackupRecord};
use super::result::OperationResult;
use crate::common::errors::{ErrorKind, ResetError};
use crate::common::{format, safety};
use crate::ides::IdeDescriptor;

/// Which storage areas a comprehensive clean touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageOptions {
    #[serde(default = "default_true")]
    pub include_workspace_storage: bool,
    #[serde(default = "default_true")]
    pub include_global_storage: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            include_workspace_storage: true,
            include_global_storage: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Workspace,
    Global,
}

impl Scope {
    fn key(self) -> &'static str {
        match self {
            Scope::Workspace => "workspace",
            Scope::Global => "global",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Scope::Workspace => "workspace storage",
            Scope::Global => "global storage",
        }
    }

    fn path(self, ide: &IdeDescriptor) -> Option<&Path> {
        match self {
            Scope::Workspace => ide.workspace_storage_path.as_deref(),
            Scope::Global => ide.global_storage_path.as_deref(),
        }
    }

    /// Depth at which vendor entries live: globalStorage/<ext>,
    /// workspaceStorage/<hash>/<ext>
    fn max_depth(self) -> usize {
        match self {
            Scope::Workspace => 2,
            Scope::Global => 1,
        }
    }
}

/// Entries selected for removal under one storage root
#[derive(Debug)]
struct Plan {
    scope: Scope,
    root: PathBuf,
    targets: Vec<PathBuf>,
}

/// What was actually removed; targets that failed are not counted
#[derive(Debug, Default)]
struct Removal {
    entries: usize,
    files: usize,
    bytes: u64,
    errors: Vec<ResetError>,
}

/// Removes vendor-scoped cache entries from editor storage directories
pub struct StorageCleaner<'a> {
    backup: &'a dyn Backup,
    marker: String,
}

impl<'a> StorageCleaner<'a> {
    pub fn new(backup: &'a dyn Backup, marker: &str) -> Self {
        Self {
            backup,
            marker: marker.trim().to_lowercase(),
        }
    }

    /// An empty marker would match every entry
    fn refuse_empty_marker(&self) -> Option<OperationResult> {
        self.marker.is_empty().then(|| {
            OperationResult::failed(
                "Vendor marker is empty; refusing to clean storage",
                ErrorKind::Unexpected,
                "vendor_marker must not be empty",
            )
        })
    }

    pub fn clean_workspace(&self, ide: &IdeDescriptor) -> OperationResult {
        self.clean_scope(ide, Scope::Workspace)
    }

    pub fn clean_global(&self, ide: &IdeDescriptor) -> OperationResult {
        self.clean_scope(ide, Scope::Global)
    }

    /// Clean the selected areas. Every selected area is archived before
    /// anything is removed from any of them.
    pub fn clean_comprehensive(
        &self,
        ide: &IdeDescriptor,
        options: &StorageOptions,
    ) -> OperationResult {
        let mut scopes = Vec::new();
        if options.include_workspace_storage {
            scopes.push(Scope::Workspace);
        }
        if options.include_global_storage {
            scopes.push(Scope::Global);
        }
        if scopes.is_empty() {
            return OperationResult::skipped("No storage area selected");
        }
        if let Some(refused) = self.refuse_empty_marker() {
            return refused;
        }

        let mut plans = Vec::new();
        let mut missing = Vec::new();
        for scope in scopes {
            match self.plan(ide, scope) {
                Ok(plan) => plans.push(plan),
                Err(e) => missing.push((scope, e)),
            }
        }

        let mut backups = Vec::new();
        for plan in &plans {
            match self.archive(plan) {
                Ok(record) => backups.push(record),
                Err(e) => {
                    return OperationResult::from_error(
                        format!(
                            "Backup of {} failed; no storage was removed",
                            plan.scope.label()
                        ),
                        &e,
                    )
                }
            }
        }

        let mut parts = Vec::new();
        let mut entries_total = 0;
        let mut files_total = 0;
        let mut bytes_total = 0;
        let mut first_error: Option<ResetError> = None;
        let mut data = serde_json::Map::new();

        for (plan, backup) in plans.iter().zip(backups) {
            let removal = self.remove(plan);
            entries_total += removal.entries;
            files_total += removal.files;
            bytes_total += removal.bytes;
            parts.push(format!("{}: {}", plan.scope.label(), summary(plan, &removal)));
            data.insert(plan.scope.key().to_string(), scope_data(plan, backup.as_ref(), &removal));
            if let Some(e) = removal.errors.into_iter().next() {
                first_error.get_or_insert(e);
            }
        }
        for (scope, e) in missing {
            parts.push(format!("{}: {}", scope.label(), e));
            data.insert(
                scope.key().to_string(),
                json!({ "success": false, "error": e.to_string() }),
            );
            first_error.get_or_insert(e);
        }

        let message = parts.join("; ");
        let mut result = match first_error {
            Some(e) => OperationResult::from_error(message, &e),
            None => OperationResult::ok(message),
        };
        for (key, value) in data {
            result.insert(&key, value);
        }
        result
            .with("entries_deleted", entries_total)
            .with("files_deleted", files_total)
            .with("bytes_freed", bytes_total)
    }

    fn clean_scope(&self, ide: &IdeDescriptor, scope: Scope) -> OperationResult {
        if let Some(refused) = self.refuse_empty_marker() {
            return refused;
        }
        let plan = match self.plan(ide, scope) {
            Ok(plan) => plan,
            Err(e) => {
                return OperationResult::from_error(
                    format!("No {} found for {}", scope.label(), ide.display_name),
                    &e,
                )
            }
        };

        let backup = match self.archive(&plan) {
            Ok(backup) => backup,
            Err(e) => {
                return OperationResult::from_error(
                    format!("Backup of {} failed; nothing was removed", scope.label()),
                    &e,
                )
            }
        };

        let removal = self.remove(&plan);
        let message = format!("{} {}", ide.display_name, summary(&plan, &removal));
        let mut result = match removal.errors.first() {
            Some(e) => OperationResult::failed(message, e.kind(), e.to_string())
                .with("failures", removal.errors.len()),
            None => OperationResult::ok(message),
        };

        result.insert("path", &plan.root);
        result.insert("entries_deleted", removal.entries);
        result.insert("files_deleted", removal.files);
        result.insert("bytes_freed", removal.bytes);
        if let Some(record) = &backup {
            result.insert("backup_path", &record.backup_path);
        }
        result
    }

    fn plan(&self, ide: &IdeDescriptor, scope: Scope) -> Result<Plan, ResetError> {
        let root = scope
            .path(ide)
            .ok_or_else(|| {
                ResetError::not_found(Path::new(match scope {
                    Scope::Workspace => "workspaceStorage",
                    Scope::Global => "globalStorage",
                }))
            })?
            .to_path_buf();
        if !root.is_dir() {
            return Err(ResetError::not_found(&root));
        }

        let mut targets = Vec::new();
        let mut walker = WalkDir::new(&root)
            .min_depth(1)
            .max_depth(scope.max_depth())
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name.contains(&self.marker) {
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                targets.push(entry.into_path());
            }
        }

        Ok(Plan {
            scope,
            root,
            targets,
        })
    }

    fn archive(&self, plan: &Plan) -> Result<Option<BackupRecord>, ResetError> {
        if plan.targets.is_empty() {
            return Ok(None);
        }
        self.backup.archive(&plan.root, &plan.targets).map(Some)
    }

    fn remove(&self, plan: &Plan) -> Removal {
        let mut removal = Removal::default();
        for target in &plan.targets {
            if !safety::is_safe_to_remove(&plan.root, target) {
                tracing::warn!("Refusing to remove protected path {}", target.display());
                continue;
            }
            let (files, bytes) = footprint(target);
            match force_remove(target) {
                Ok(()) => {
                    removal.entries += 1;
                    removal.files += files;
                    removal.bytes += bytes;
                }
                Err(e) => {
                    tracing::warn!("Could not remove {}: {}", target.display(), e);
                    removal.errors.push(ResetError::from_io(target, e));
                }
            }
        }
        removal
    }
}

fn summary(plan: &Plan, removal: &Removal) -> String {
    if plan.targets.is_empty() {
        return "had nothing to clean".to_string();
    }
    let mut text = format!(
        "removed {} {} ({}, {})",
        removal.entries,
        if removal.entries == 1 { "entry" } else { "entries" },
        format::format_count(removal.files, "file"),
        format::format_size(removal.bytes)
    );
    if !removal.errors.is_empty() {
        text.push_str(&format!(", {} failed", removal.errors.len()));
    }
    text
}

fn scope_data(
    plan: &Plan,
    backup: Option<&BackupRecord>,
    removal: &Removal,
) -> serde_json::Value {
    json!({
        "success": removal.errors.is_empty(),
        "path": plan.root,
        "entries_deleted": removal.entries,
        "files_deleted": removal.files,
        "bytes_freed": removal.bytes,
        "backup_path": backup.map(|b| &b.backup_path),
    })
}

/// Regular files and their total size beneath `path`
fn footprint(path: &Path) -> (usize, u64) {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(n, size), e| {
            (n + 1, size + e.metadata().map(|m| m.len()).unwrap_or(0))
        })
}

/// Remove a file or directory, clearing read-only bits if the first attempt is refused
fn force_remove(path: &Path) -> std::io::Result<()> {
    let attempt = |p: &Path| {
        if p.is_dir() {
            std::fs::remove_dir_all(p)
        } else {
            std::fs::remove_file(p)
        }
    };

    match attempt(path) {
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
                crate::common::permissions::unlock_file(entry.path());
            }
            attempt(path)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::backup::BackupManager;
    use crate::ides::Product;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "data").unwrap();
    }

    fn editor(root: &Path) -> IdeDescriptor {
        let global = root.join("User/globalStorage");
        let workspace = root.join("User/workspaceStorage");
        touch(&global.join("storage.json"));
        touch(&global.join("augment.vscode-augment/cache.json"));
        touch(&global.join("augment.vscode-augment/nested/blob"));
        touch(&global.join("ms-python.python/state"));
        touch(&workspace.join("abc123/workspace.json"));
        touch(&workspace.join("abc123/Augment.vscode-augment/index"));
        touch(&workspace.join("def456/state.vscdb"));

        let mut d = IdeDescriptor::new(Product::VsCode);
        d.global_storage_path = Some(global);
        d.workspace_storage_path = Some(workspace);
        d
    }

    #[test]
    fn test_global_clean_removes_only_vendor_entries() {
        let dir = TempDir::new().unwrap();
        let ide = editor(dir.path());
        let manager = BackupManager::default();

        let result = StorageCleaner::new(&manager, "augment").clean_global(&ide);
        assert!(result.is_success(), "{:?}", result);
        assert_eq!(result.count("entries_deleted"), 1);
        assert_eq!(result.count("files_deleted"), 2);

        let global = ide.global_storage_path.unwrap();
        assert!(!global.join("augment.vscode-augment").exists());
        assert!(global.join("ms-python.python/state").exists());
        assert!(global.join("storage.json").exists());

        let backup = result.get("backup_path").unwrap().as_str().unwrap();
        assert!(std::fs::metadata(backup).unwrap().len() > 0);
    }

    #[test]
    fn test_workspace_clean_looks_inside_each_workspace() {
        let dir = TempDir::new().unwrap();
        let ide = editor(dir.path());
        let manager = BackupManager::default();

        let result = StorageCleaner::new(&manager, "augment").clean_workspace(&ide);
        assert!(result.is_success());
        assert_eq!(result.count("entries_deleted"), 1);

        let ws = ide.workspace_storage_path.unwrap();
        assert!(!ws.join("abc123/Augment.vscode-augment").exists());
        assert!(ws.join("abc123/workspace.json").exists());
        assert!(ws.join("def456/state.vscdb").exists());
    }

    #[test]
    fn test_nothing_to_clean_needs_no_backup() {
        let dir = TempDir::new().unwrap();
        let ide = editor(dir.path());
        let manager = BackupManager::default();

        let result = StorageCleaner::new(&manager, "copilot").clean_global(&ide);
        assert!(result.is_success());
        assert_eq!(result.count("entries_deleted"), 0);
        assert!(result.get("backup_path").is_none());
    }

    #[test]
    fn test_missing_path_is_not_found() {
        let manager = BackupManager::default();
        let ide = IdeDescriptor::new(Product::Windsurf);
        let result = StorageCleaner::new(&manager, "augment").clean_workspace(&ide);
        assert!(!result.is_success());
        assert_eq!(result.error().unwrap().kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_comprehensive_merges_counts() {
        let dir = TempDir::new().unwrap();
        let ide = editor(dir.path());
        let manager = BackupManager::default();

        let result = StorageCleaner::new(&manager, "augment")
            .clean_comprehensive(&ide, &StorageOptions::default());
        assert!(result.is_success(), "{:?}", result);
        assert_eq!(result.count("entries_deleted"), 2);
        assert_eq!(result.count("files_deleted"), 3);
        assert_eq!(result.get("workspace").unwrap()["success"], true);
        assert_eq!(result.get("global").unwrap()["entries_deleted"], 1);
    }

    #[test]
    fn test_blank_marker_removes_nothing() {
        let dir = TempDir::new().unwrap();
        let ide = editor(dir.path());
        let manager = BackupManager::default();

        for marker in ["", "   "] {
            let cleaner = StorageCleaner::new(&manager, marker);
            let global = cleaner.clean_global(&ide);
            assert!(!global.is_success());
            assert_eq!(global.error().unwrap().kind, ErrorKind::Unexpected);
            let all = cleaner.clean_comprehensive(&ide, &StorageOptions::default());
            assert!(!all.is_success());
        }

        let global = ide.global_storage_path.unwrap();
        assert!(global.join("storage.json").exists());
        assert!(global.join("ms-python.python/state").exists());
        assert!(global.join("augment.vscode-augment/cache.json").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_counts_cover_only_entries_actually_removed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let ide = editor(dir.path());
        let ws = ide.workspace_storage_path.clone().unwrap();
        let stuck = ws.join("def456");
        touch(&stuck.join("augment-state"));
        std::fs::set_permissions(&stuck, std::fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users can write anyway; nothing to observe then
        let canary = stuck.join("canary");
        if std::fs::write(&canary, "").is_ok() {
            let _ = std::fs::remove_file(&canary);
            std::fs::set_permissions(&stuck, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let manager = BackupManager::default();
        let result = StorageCleaner::new(&manager, "augment").clean_workspace(&ide);
        std::fs::set_permissions(&stuck, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(!result.is_success());
        assert_eq!(result.count("entries_deleted"), 1);
        assert_eq!(result.count("files_deleted"), 1);
        assert_eq!(result.count("bytes_freed"), 4);
        assert!(stuck.join("augment-state").exists());
    }

    #[test]
    fn test_comprehensive_with_nothing_selected_is_skipped() {
        let manager = BackupManager::default();
        let ide = IdeDescriptor::new(Product::VsCode);
        let options = StorageOptions {
            include_workspace_storage: false,
            include_global_storage: false,
        };
        let result = StorageCleaner::new(&manager, "augment").clean_comprehensive(&ide, &options);
        assert!(result.is_success());
        assert!(result.is_skipped());
    }
}
