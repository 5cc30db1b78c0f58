use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::backup::Backup;
use super::ids;
use super::result::OperationResult;
use crate::common::errors::{ErrorKind, ResetError, ResetResult};
use crate::common::permissions;
use crate::ides::{Family, IdeDescriptor};

pub const MACHINE_ID_KEY: &str = "telemetry.machineId";
pub const DEVICE_ID_KEY: &str = "telemetry.devDeviceId";
pub const MAC_MACHINE_ID_KEY: &str = "telemetry.macMachineId";
pub const SQM_ID_KEY: &str = "telemetry.sqmId";

const PERMANENT_DEVICE_ID: &str = "PermanentDeviceId";
const PERMANENT_USER_ID: &str = "PermanentUserId";

/// Rewrites locally stored machine and device identifiers
pub struct TelemetryResetter<'a> {
    backup: &'a dyn Backup,
    lock_jetbrains_ids: bool,
}

impl<'a> TelemetryResetter<'a> {
    pub fn new(backup: &'a dyn Backup) -> Self {
        Self {
            backup,
            lock_jetbrains_ids: true,
        }
    }

    pub fn lock_jetbrains_ids(mut self, lock: bool) -> Self {
        self.lock_jetbrains_ids = lock;
        self
    }

    pub fn reset(&self, ide: &IdeDescriptor) -> OperationResult {
        let result = match ide.family {
            Family::Editor => self.reset_editor(ide),
            Family::JetBrains => self.reset_jetbrains(ide),
        };
        if result.is_success() {
            tracing::info!("Telemetry reset for {}", ide.display_name);
        } else {
            tracing::warn!("Telemetry reset for {} failed: {}", ide.display_name, result.message());
        }
        result
    }

    // ─── Editor family ───────────────────────────────────────────────────

    fn reset_editor(&self, ide: &IdeDescriptor) -> OperationResult {
        let Some(storage_path) = ide.storage_path.as_deref() else {
            return OperationResult::failed(
                format!("Storage file not found for {}", ide.display_name),
                ErrorKind::NotFound,
                "storage_path is not set",
            );
        };

        let mut storage = match read_storage(storage_path) {
            Ok(map) => map,
            Err(e) => return OperationResult::from_error("Could not read storage file", &e),
        };

        let record = match self.backup.backup(storage_path) {
            Ok(record) => record,
            Err(e) => {
                return OperationResult::from_error(
                    "Backup failed; storage file left unchanged",
                    &e,
                )
            }
        };

        let mut result = OperationResult::ok(format!("Telemetry IDs reset for {}", ide.display_name))
            .with("storage_path", storage_path)
            .with("storage_backup", &record.backup_path);

        let new_machine_id = ids::machine_id();
        let new_device_id = ids::device_id();
        let mut changes = vec![
            ("machine_id", MACHINE_ID_KEY, new_machine_id),
            ("device_id", DEVICE_ID_KEY, new_device_id.clone()),
        ];
        if storage.contains_key(MAC_MACHINE_ID_KEY) {
            changes.push(("mac_machine_id", MAC_MACHINE_ID_KEY, ids::machine_id()));
        }
        if storage.contains_key(SQM_ID_KEY) {
            changes.push(("sqm_id", SQM_ID_KEY, ids::sqm_id()));
        }

        for (label, key, new_value) in changes {
            let old = storage.get(key).cloned().unwrap_or(Value::Null);
            result.insert(&format!("old_{}", label), old);
            result.insert(&format!("new_{}", label), &new_value);
            storage.insert(key.to_string(), Value::String(new_value));
        }

        let json = match serde_json::to_string_pretty(&Value::Object(storage)) {
            Ok(json) => json,
            Err(e) => {
                return OperationResult::from_error(
                    "Could not serialize storage file",
                    &ResetError::unexpected("serialize storage.json", e),
                )
            }
        };
        if let Err(e) = write_replacing(storage_path, &json) {
            return OperationResult::from_error("Could not write storage file", &e)
                .with("storage_backup", &record.backup_path);
        }

        if let Some(machine_id_path) = ide.machine_id_path.as_deref() {
            match self.rewrite_id_file(machine_id_path, &new_device_id) {
                Ok(change) => {
                    result.insert("machine_id_file", machine_id_path);
                    result.insert("machine_id_file_backup", &change.backup_path);
                    result.insert("old_machine_id_file", &change.old_value);
                    result.insert("new_machine_id_file", &change.new_value);
                }
                Err(e) => {
                    let mut failed = OperationResult::from_error(
                        "Storage file reset, but the machine id file could not be rewritten",
                        &e,
                    );
                    for (k, v) in result.data() {
                        failed.insert(k, v);
                    }
                    return failed;
                }
            }
        }

        result
    }

    // ─── JetBrains family ────────────────────────────────────────────────

    fn reset_jetbrains(&self, ide: &IdeDescriptor) -> OperationResult {
        let targets = jetbrains_targets(ide);
        if targets.is_empty() {
            return OperationResult::failed(
                format!("No ID files found for {}", ide.display_name),
                ErrorKind::NotFound,
                "config_path and ID file paths are not set",
            );
        }

        let mut result =
            OperationResult::ok(format!("Permanent IDs reset for {}", ide.display_name));
        let mut warnings: Vec<String> = Vec::new();
        let mut failure: Option<ResetError> = None;

        for (label, path) in targets {
            let new_value = ids::device_id();
            let change = if path.exists() {
                self.rewrite_id_file(&path, &new_value)
            } else {
                create_id_file(&path, &new_value)
            };

            match change {
                Ok(change) => {
                    result.insert(&format!("old_{}", label), &change.old_value);
                    result.insert(&format!("new_{}", label), &change.new_value);
                    result.insert(&format!("{}_path", label), &path);
                    result.insert(&format!("{}_backup", label), &change.backup_path);
                    if self.lock_jetbrains_ids {
                        let lock_warnings = permissions::lock_file(&path);
                        result.insert(&format!("{}_locked", label), lock_warnings.is_empty());
                        warnings.extend(lock_warnings);
                    }
                }
                Err(e) => {
                    tracing::warn!("Could not reset {}: {}", path.display(), e);
                    failure.get_or_insert(e);
                }
            }
        }

        if !warnings.is_empty() {
            result.insert("warnings", &warnings);
        }

        match failure {
            Some(e) => {
                let mut failed = OperationResult::from_error(
                    format!("Some ID files of {} could not be reset", ide.display_name),
                    &e,
                );
                for (k, v) in result.data() {
                    failed.insert(k, v);
                }
                failed
            }
            None => result,
        }
    }

    /// Back up an existing ID file, then replace its contents
    fn rewrite_id_file(&self, path: &Path, new_value: &str) -> ResetResult<IdChange> {
        let old_value = std::fs::read_to_string(path)
            .map_err(|e| ResetError::from_io(path, e))?
            .trim()
            .to_string();
        let record = self.backup.backup(path)?;
        write_replacing(path, new_value)?;
        Ok(IdChange {
            old_value: Some(old_value),
            new_value: new_value.to_string(),
            backup_path: Some(record.backup_path),
        })
    }
}

struct IdChange {
    old_value: Option<String>,
    new_value: String,
    backup_path: Option<PathBuf>,
}

/// ID files to rewrite. A missing file is created in the shared JetBrains
/// directory above the product config.
fn jetbrains_targets(ide: &IdeDescriptor) -> Vec<(&'static str, PathBuf)> {
    let shared = ide
        .config_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);

    [
        ("device_id", &ide.permanent_device_id_path, PERMANENT_DEVICE_ID),
        ("user_id", &ide.permanent_user_id_path, PERMANENT_USER_ID),
    ]
    .into_iter()
    .filter_map(|(label, known, file_name)| {
        known
            .clone()
            .or_else(|| shared.as_ref().map(|dir| dir.join(file_name)))
            .map(|path| (label, path))
    })
    .collect()
}

fn create_id_file(path: &Path, value: &str) -> ResetResult<IdChange> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ResetError::from_io(parent, e))?;
    }
    std::fs::write(path, value).map_err(|e| ResetError::from_io(path, e))?;
    Ok(IdChange {
        old_value: None,
        new_value: value.to_string(),
        backup_path: None,
    })
}

fn read_storage(path: &Path) -> ResetResult<Map<String, Value>> {
    let contents = std::fs::read_to_string(path).map_err(|e| ResetError::from_io(path, e))?;
    if contents.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ResetError::unexpected(
            format!("parse '{}'", path.display()),
            "storage file is not a JSON object",
        )),
        Err(e) => Err(ResetError::unexpected(format!("parse '{}'", path.display()), e)),
    }
}

/// Replace a file's contents through a temporary sibling and a rename
fn write_replacing(path: &Path, contents: &str) -> ResetResult<()> {
    if !permissions::can_write(path) && path.exists() {
        permissions::unlock_file(path);
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.idereset-tmp", file_name));

    let written = std::fs::File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        })
        .and_then(|_| std::fs::rename(&tmp, path));

    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(ResetError::from_io(path, e));
    }
    Ok(())
}
