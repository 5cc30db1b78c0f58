use std::path::Path;

/// Check if we can read a path (file: open it, directory: list it)
pub fn can_read(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::read_dir(path).is_ok(),
        Ok(_) => std::fs::File::open(path).is_ok(),
        Err(_) => false,
    }
}

/// Check if we can write to a path
pub fn can_write(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

/// Hint printed next to permission and lock failures
pub fn permission_hint() -> &'static str {
    if cfg!(windows) {
        "Close the IDE and check the file is not read-only. Running as administrator may help."
    } else {
        "Close the IDE and check file ownership and permissions."
    }
}

#[allow(clippy::permissions_set_readonly_false)]
fn set_readonly(path: &Path, readonly: bool) -> std::io::Result<()> {
    let mut perms = std::fs::metadata(path)?.permissions();
    if perms.readonly() == readonly {
        return Ok(());
    }
    perms.set_readonly(readonly);
    std::fs::set_permissions(path, perms)
}

/// Best-effort lock: read-only bit everywhere, plus the user-immutable flag on macOS.
/// Returns warnings for every step that did not take effect.
pub fn lock_file(path: &Path) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Err(e) = set_readonly(path, true) {
        warnings.push(format!(
            "Could not mark '{}' read-only: {}",
            path.display(),
            e
        ));
    }

    if cfg!(target_os = "macos") {
        match std::process::Command::new("chflags")
            .arg("uchg")
            .arg(path)
            .output()
        {
            Ok(out) if out.status.success() => {}
            Ok(out) => warnings.push(format!(
                "chflags uchg failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )),
            Err(e) => warnings.push(format!("chflags unavailable: {}", e)),
        }
    }

    for w in &warnings {
        tracing::warn!("{}", w);
    }
    warnings
}

/// Undo `lock_file` so the file can be rewritten. Failures surface on the following write.
pub fn unlock_file(path: &Path) {
    if cfg!(target_os = "macos") {
        let _ = std::process::Command::new("chflags")
            .arg("nouchg")
            .arg(path)
            .output();
    }
    if let Err(e) = set_readonly(path, false) {
        tracing::debug!("Could not clear read-only on '{}': {}", path.display(), e);
    }
}
