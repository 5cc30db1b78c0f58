use std::path::{Path, PathBuf};

use crate::common::permissions;

/// Existence and readability checks for candidate paths.
///
/// A missing or unreadable path is an expected outcome ("not installed"),
/// so every check answers with `Option` instead of an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathProbe;

impl PathProbe {
    pub fn new() -> Self {
        Self
    }

    /// Return the path if it exists and can be read
    pub fn verify(&self, path: &Path) -> Option<PathBuf> {
        if permissions::can_read(path) {
            tracing::debug!("probe ok: {}", path.display());
            Some(path.to_path_buf())
        } else {
            tracing::debug!("probe miss: {}", path.display());
            None
        }
    }

    /// Like `verify`, but the path must be a regular file
    pub fn verify_file(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            self.verify(path)
        } else {
            None
        }
    }

    /// Like `verify`, but the path must be a directory
    pub fn verify_dir(&self, path: &Path) -> Option<PathBuf> {
        if path.is_dir() {
            self.verify(path)
        } else {
            None
        }
    }

    /// First candidate that verifies as a file
    pub fn first_file<'a, I>(&self, candidates: I) -> Option<PathBuf>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        candidates.into_iter().find_map(|p| self.verify_file(p))
    }
}
