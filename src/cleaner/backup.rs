use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use walkdir::WalkDir;

use crate::common::errors::{ResetError, ResetResult};

/// Marker between the original file name and the timestamp
pub const BACKUP_MARKER: &str = ".bak.";

/// Suffix stem of storage archives: `<dir>_backup_<stamp>.zip`
pub const ARCHIVE_MARKER: &str = "_backup_";

/// Index of backups written to a dedicated backup root
const INDEX_FILE: &str = "index.jsonl";

static BACKUP_SEQ: AtomicU64 = AtomicU64::new(0);

/// A completed, flushed backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub source_path: PathBuf,
    pub backup_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Backup seam used by every mutating operation.
/// A returned record means the copy is on disk and synced.
pub trait Backup {
    /// Copy a file byte-for-byte or a directory recursively
    fn backup(&self, path: &Path) -> ResetResult<BackupRecord>;

    /// Zip `entries` (all beneath `root`) into one archive
    fn archive(&self, root: &Path, entries: &[PathBuf]) -> ResetResult<BackupRecord>;
}

/// Writes backups beside their originals, or under `backup_root` when set
#[derive(Debug, Clone, Default)]
pub struct BackupManager {
    backup_root: Option<PathBuf>,
}

impl BackupManager {
    pub fn new(backup_root: Option<PathBuf>) -> Self {
        Self { backup_root }
    }

    pub fn backup_root(&self) -> Option<&Path> {
        self.backup_root.as_deref()
    }

    fn stamp() -> String {
        let seq = BACKUP_SEQ.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S%3f"), seq)
    }

    fn destination_dir(&self, source: &Path) -> ResetResult<PathBuf> {
        let dir = match &self.backup_root {
            Some(root) => root.clone(),
            None => source
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| ResetError::backup_failed(source, "path has no parent directory"))?,
        };
        std::fs::create_dir_all(&dir).map_err(|e| ResetError::backup_failed(source, e))?;
        Ok(dir)
    }

    fn finish(&self, source: &Path, backup_path: PathBuf) -> ResetResult<BackupRecord> {
        let record = BackupRecord {
            source_path: source.to_path_buf(),
            backup_path,
            created_at: Utc::now(),
        };
        if let Some(root) = &self.backup_root {
            append_index(root, &record).map_err(|e| ResetError::backup_failed(source, e))?;
        }
        tracing::info!(
            "Backed up {} -> {}",
            record.source_path.display(),
            record.backup_path.display()
        );
        Ok(record)
    }
}

impl Backup for BackupManager {
    fn backup(&self, path: &Path) -> ResetResult<BackupRecord> {
        let meta = std::fs::metadata(path).map_err(|e| ResetError::from_io(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ResetError::backup_failed(path, "path has no file name"))?;

        let dest = self
            .destination_dir(path)?
            .join(format!("{}{}{}", name, BACKUP_MARKER, Self::stamp()));

        let copied = if meta.is_dir() {
            copy_dir_synced(path, &dest)
        } else {
            copy_file_synced(path, &dest)
        };

        if let Err(e) = copied {
            // Never leave a half-written backup behind
            let _ = if dest.is_dir() {
                std::fs::remove_dir_all(&dest)
            } else {
                std::fs::remove_file(&dest)
            };
            return Err(match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    ResetError::from_io(path, e)
                }
                _ => ResetError::backup_failed(path, e),
            });
        }

        self.finish(path, dest)
    }

    fn archive(&self, root: &Path, entries: &[PathBuf]) -> ResetResult<BackupRecord> {
        if !root.is_dir() {
            return Err(ResetError::not_found(root));
        }
        let dir_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "storage".to_string());
        let parent = self.destination_dir(root)?;
        let dest = parent.join(format!("{}{}{}.zip", dir_name, ARCHIVE_MARKER, Self::stamp()));

        if let Err(e) = write_archive(root, entries, &dest) {
            let _ = std::fs::remove_file(&dest);
            return Err(ResetError::backup_failed(root, e));
        }

        self.finish(root, dest)
    }
}

/// Copy through a handle we own for writing, so the flush works on every
/// platform and a read-only source still yields a writable copy.
fn copy_file_synced(src: &Path, dst: &Path) -> std::io::Result<()> {
    let mut reader = File::open(src)?;
    let mut writer = File::create(dst)?;
    std::io::copy(&mut reader, &mut writer)?;
    writer.sync_all()
}

fn copy_dir_synced(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            copy_file_synced(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn write_archive(root: &Path, entries: &[PathBuf], dest: &Path) -> anyhow::Result<()> {
    use zip::write::SimpleFileOptions;

    let file = File::create(dest)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in entries {
        for item in WalkDir::new(entry).follow_links(false) {
            let item = item?;
            let rel = item.path().strip_prefix(root)?;
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            if item.file_type().is_dir() {
                zip.add_directory(format!("{}/", name), options)?;
            } else if item.file_type().is_file() {
                zip.start_file(name, options)?;
                let bytes = std::fs::read(item.path())?;
                zip.write_all(&bytes)?;
            }
        }
    }

    let file = zip.finish()?;
    file.sync_all()?;
    Ok(())
}

fn append_index(root: &Path, record: &BackupRecord) -> anyhow::Result<()> {
    let line = serde_json::to_string(record)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(root.join(INDEX_FILE))?;
    writeln!(file, "{}", line)?;
    file.sync_all()?;
    Ok(())
}

// ─── Listing and restore ─────────────────────────────────────────────────

/// A backup artifact found on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub backup_path: PathBuf,
    /// Path the backup was taken from, when it can be derived
    pub source_path: Option<PathBuf>,
    pub is_archive: bool,
    pub size_bytes: u64,
}

/// Original path for a `<name>.bak.<stamp>` sibling
pub fn original_for(backup_path: &Path) -> Option<PathBuf> {
    let name = backup_path.file_name()?.to_string_lossy().to_string();
    let (original, _) = name.rsplit_once(BACKUP_MARKER)?;
    if original.is_empty() {
        return None;
    }
    Some(backup_path.with_file_name(original))
}

fn entry_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}

/// Backups sitting in `dirs` plus everything indexed under `backup_root`
pub fn list_backups(dirs: &[PathBuf], backup_root: Option<&Path>) -> Vec<BackupEntry> {
    let mut found = Vec::new();

    for dir in dirs {
        let Ok(read) = std::fs::read_dir(dir) else {
            continue;
        };
        let mut here: Vec<BackupEntry> = read
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                let name = e.file_name().to_string_lossy().to_string();
                if name.contains(BACKUP_MARKER) {
                    Some(BackupEntry {
                        source_path: original_for(&path),
                        size_bytes: entry_size(&path),
                        backup_path: path,
                        is_archive: false,
                    })
                } else if name.contains(ARCHIVE_MARKER) && name.ends_with(".zip") {
                    Some(BackupEntry {
                        source_path: None,
                        size_bytes: entry_size(&path),
                        backup_path: path,
                        is_archive: true,
                    })
                } else {
                    None
                }
            })
            .collect();
        here.sort_by(|a, b| a.backup_path.cmp(&b.backup_path));
        found.extend(here);
    }

    if let Some(root) = backup_root {
        for record in read_index(root) {
            if found.iter().any(|e| e.backup_path == record.backup_path) {
                continue;
            }
            if record.backup_path.exists() {
                let is_archive = record
                    .backup_path
                    .extension()
                    .is_some_and(|ext| ext == "zip");
                found.push(BackupEntry {
                    size_bytes: entry_size(&record.backup_path),
                    backup_path: record.backup_path,
                    source_path: Some(record.source_path),
                    is_archive,
                });
            }
        }
    }

    found
}

fn read_index(root: &Path) -> Vec<BackupRecord> {
    std::fs::read_to_string(root.join(INDEX_FILE))
        .map(|s| {
            s.lines()
                .filter_map(|line| serde_json::from_str(line).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Copy a file or directory backup back over its original and return the
/// restored path. The current original is backed up first; archives are not
/// restorable here.
pub fn restore_backup(
    manager: &dyn Backup,
    backup_path: &Path,
    backup_root: Option<&Path>,
) -> ResetResult<PathBuf> {
    if !backup_path.exists() {
        return Err(ResetError::not_found(backup_path));
    }

    let target = original_for(backup_path)
        .filter(|_| !backup_root.is_some_and(|root| backup_path.starts_with(root)))
        .or_else(|| {
            backup_root.and_then(|root| {
                read_index(root)
                    .into_iter()
                    .find(|r| r.backup_path == backup_path)
                    .map(|r| r.source_path)
            })
        })
        .ok_or_else(|| {
            ResetError::unexpected(
                "restore",
                format!("cannot tell where '{}' came from", backup_path.display()),
            )
        })?;

    if target.exists() {
        manager.backup(&target)?;
        let removed = if target.is_dir() {
            std::fs::remove_dir_all(&target)
        } else {
            std::fs::remove_file(&target)
        };
        removed.map_err(|e| ResetError::from_io(&target, e))?;
    }

    let copied = if backup_path.is_dir() {
        copy_dir_synced(backup_path, &target)
    } else {
        copy_file_synced(backup_path, &target)
    };
    copied.map_err(|e| ResetError::from_io(&target, e))?;

    tracing::info!("Restored {} from {}", target.display(), backup_path.display());
    Ok(target)
}
