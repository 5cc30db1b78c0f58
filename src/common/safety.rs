use std::path::Path;

/// Home subdirectories that must never be removed, whatever a storage listing says
const PROTECTED_HOME_DIRS: &[&str] = &[
    "",
    ".config",
    ".local",
    ".local/share",
    "AppData",
    "AppData/Roaming",
    "AppData/Local",
    "Library",
    "Library/Application Support",
    "Desktop",
    "Documents",
    ".ssh",
    ".gnupg",
];

/// Check if a path is protected and should NEVER be deleted
pub fn is_protected(path: &Path) -> bool {
    // Filesystem roots and drive roots
    if path.parent().is_none() || path.components().count() <= 1 {
        return true;
    }

    if let Some(home) = dirs::home_dir() {
        let hit = PROTECTED_HOME_DIRS.iter().any(|dir| {
            if dir.is_empty() {
                path == home
            } else {
                path == home.join(dir)
            }
        });
        if hit {
            return true;
        }
    }

    for var in ["APPDATA", "LOCALAPPDATA", "XDG_CONFIG_HOME"] {
        if let Some(value) = std::env::var_os(var) {
            if !value.is_empty() && path == Path::new(&value) {
                return true;
            }
        }
    }

    false
}

/// A removal target is acceptable only when it lies strictly inside `root`
/// and is not a protected location.
pub fn is_safe_to_remove(root: &Path, target: &Path) -> bool {
    target != root && target.starts_with(root) && !is_protected(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_protected() {
        assert!(is_protected(Path::new("/")));
    }

    #[test]
    fn test_home_dirs_protected() {
        if let Some(home) = dirs::home_dir() {
            assert!(is_protected(&home));
            assert!(is_protected(&home.join(".config")));
            assert!(is_protected(&home.join(".ssh")));
        }
    }

    #[test]
    fn test_storage_entry_not_protected() {
        if let Some(home) = dirs::home_dir() {
            let entry = home.join(".config/Code/User/globalStorage/augment.vscode-augment");
            assert!(!is_protected(&entry));
        }
    }

    #[test]
    fn test_safe_to_remove_requires_containment() {
        let root = Path::new("/tmp/ws");
        assert!(is_safe_to_remove(root, Path::new("/tmp/ws/abc/augment")));
        assert!(!is_safe_to_remove(root, root));
        assert!(!is_safe_to_remove(root, Path::new("/tmp/other")));
    }
}
