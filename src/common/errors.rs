use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Typed errors for reset operations.
/// The CLI uses `anyhow` at the top level, but library components return
/// these so every failure can be classified before it reaches a caller.
#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    /// A path, process or IDE is absent
    #[error("Not found: '{}'", path.display())]
    NotFound { path: PathBuf },

    /// Filesystem or process-signal denial
    #[error("Permission denied: '{}': {source}", path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file or database is locked by another process
    #[error("Resource busy: '{}': {message}", path.display())]
    ResourceBusy { path: PathBuf, message: String },

    /// The backup a mutation depends on could not be made
    #[error("Backup of '{}' failed: {message}", path.display())]
    BackupFailed { path: PathBuf, message: String },

    /// Anything uncategorized
    #[error("{context}: {message}")]
    Unexpected { context: String, message: String },
}

/// Serializable error classification carried inside operation results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    ResourceBusy,
    BackupFailed,
    Unexpected,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not found"),
            ErrorKind::PermissionDenied => write!(f, "permission denied"),
            ErrorKind::ResourceBusy => write!(f, "resource busy"),
            ErrorKind::BackupFailed => write!(f, "backup failed"),
            ErrorKind::Unexpected => write!(f, "unexpected"),
        }
    }
}

/// Windows ERROR_SHARING_VIOLATION and ERROR_LOCK_VIOLATION
const WINDOWS_SHARING_ERRORS: &[i32] = &[32, 33];

impl ResetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResetError::NotFound { .. } => ErrorKind::NotFound,
            ResetError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            ResetError::ResourceBusy { .. } => ErrorKind::ResourceBusy,
            ResetError::BackupFailed { .. } => ErrorKind::BackupFailed,
            ResetError::Unexpected { .. } => ErrorKind::Unexpected,
        }
    }

    pub fn not_found(path: &Path) -> Self {
        ResetError::NotFound {
            path: path.to_path_buf(),
        }
    }

    pub fn unexpected(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ResetError::Unexpected {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Classify an I/O error raised while touching `path`
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        if cfg!(windows)
            && source
                .raw_os_error()
                .is_some_and(|code| WINDOWS_SHARING_ERRORS.contains(&code))
        {
            return ResetError::ResourceBusy {
                path: path.to_path_buf(),
                message: source.to_string(),
            };
        }

        match source.kind() {
            std::io::ErrorKind::NotFound => ResetError::not_found(path),
            std::io::ErrorKind::PermissionDenied => ResetError::PermissionDenied {
                path: path.to_path_buf(),
                source,
            },
            _ => ResetError::Unexpected {
                context: format!("I/O error at '{}'", path.display()),
                message: source.to_string(),
            },
        }
    }

    /// Wrap any error that prevented a backup
    pub fn backup_failed(path: &Path, cause: impl std::fmt::Display) -> Self {
        ResetError::BackupFailed {
            path: path.to_path_buf(),
            message: cause.to_string(),
        }
    }
}

pub type ResetResult<T> = std::result::Result<T, ResetError>;
