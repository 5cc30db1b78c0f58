use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::product::{Family, Product};

/// Normalized record of one installed IDE.
///
/// Every populated path was verified on disk when the descriptor was built.
/// Descriptors are never updated in place; a new scan produces new ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeDescriptor {
    /// Stable product slug, e.g. `vscode`
    pub name: String,
    pub display_name: String,
    pub family: Family,
    #[serde(default)]
    pub version: Option<String>,

    // Editor family
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub machine_id_path: Option<PathBuf>,
    #[serde(default)]
    pub workspace_storage_path: Option<PathBuf>,
    #[serde(default)]
    pub global_storage_path: Option<PathBuf>,

    // JetBrains family
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    #[serde(default)]
    pub permanent_device_id_path: Option<PathBuf>,
    #[serde(default)]
    pub permanent_user_id_path: Option<PathBuf>,

    /// Main executable, when one could be located
    #[serde(default)]
    pub executable_path: Option<PathBuf>,
}

impl IdeDescriptor {
    /// Empty descriptor for a product; the detector fills in verified paths
    pub fn new(product: Product) -> Self {
        Self {
            name: product.slug().to_string(),
            display_name: product.display_name().to_string(),
            family: product.family(),
            version: None,
            storage_path: None,
            db_path: None,
            machine_id_path: None,
            workspace_storage_path: None,
            global_storage_path: None,
            config_path: None,
            permanent_device_id_path: None,
            permanent_user_id_path: None,
            executable_path: None,
        }
    }

    pub fn product(&self) -> Option<Product> {
        Product::from_name(&self.name)
    }

    pub fn is_jetbrains(&self) -> bool {
        self.family == Family::JetBrains
    }

    /// Populated data paths with their field names, in field order
    pub fn paths(&self) -> Vec<(&'static str, &Path)> {
        [
            ("storage_path", &self.storage_path),
            ("db_path", &self.db_path),
            ("machine_id_path", &self.machine_id_path),
            ("workspace_storage_path", &self.workspace_storage_path),
            ("global_storage_path", &self.global_storage_path),
            ("config_path", &self.config_path),
            ("permanent_device_id_path", &self.permanent_device_id_path),
            ("permanent_user_id_path", &self.permanent_user_id_path),
        ]
        .into_iter()
        .filter_map(|(field, path)| path.as_deref().map(|p| (field, p)))
        .collect()
    }

    pub fn has_any_path(&self) -> bool {
        !self.paths().is_empty()
    }

    /// Case-insensitive match against slug or display name
    pub fn matches(&self, selector: &str) -> bool {
        let wanted = selector.trim();
        self.name.eq_ignore_ascii_case(wanted) || self.display_name.eq_ignore_ascii_case(wanted)
    }
}
