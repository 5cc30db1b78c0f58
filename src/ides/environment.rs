use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::product::Platform;

/// OS-standard roots every IDE path is derived from.
///
/// `from_process` reads them from the environment; tests build a sandboxed
/// one with `rooted`.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub platform: Platform,
    pub home: PathBuf,
    /// Roaming application data (`%APPDATA%`)
    pub appdata: Option<PathBuf>,
    /// Local application data (`%LOCALAPPDATA%`)
    pub local_appdata: Option<PathBuf>,
    pub xdg_config_home: Option<PathBuf>,
    /// Directories searched for launcher commands
    pub path_dirs: Vec<PathBuf>,
    /// Application folders searched for macOS bundles
    pub applications_dirs: Vec<PathBuf>,
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

impl Environment {
    pub fn from_process() -> Self {
        let platform = Platform::current();
        let home = env_path("HOME")
            .or_else(|| env_path("USERPROFILE"))
            .or_else(dirs::home_dir)
            .unwrap_or_else(std::env::temp_dir);

        let path_dirs = std::env::var_os("PATH")
            .map(|p: OsString| std::env::split_paths(&p).collect())
            .unwrap_or_default();

        let applications_dirs = match platform {
            Platform::MacOs => vec![PathBuf::from("/Applications"), home.join("Applications")],
            _ => Vec::new(),
        };

        Self {
            platform,
            appdata: env_path("APPDATA"),
            local_appdata: env_path("LOCALAPPDATA"),
            xdg_config_home: env_path("XDG_CONFIG_HOME"),
            home,
            path_dirs,
            applications_dirs,
        }
    }

    /// Environment whose every root lives under `home`; no PATH lookup.
    pub fn rooted(platform: Platform, home: &Path) -> Self {
        let (appdata, local_appdata) = match platform {
            Platform::Windows => (
                Some(home.join("AppData").join("Roaming")),
                Some(home.join("AppData").join("Local")),
            ),
            _ => (None, None),
        };
        let applications_dirs = match platform {
            Platform::MacOs => vec![home.join("Applications")],
            _ => Vec::new(),
        };
        Self {
            platform,
            home: home.to_path_buf(),
            appdata,
            local_appdata,
            xdg_config_home: None,
            path_dirs: Vec::new(),
            applications_dirs,
        }
    }

    /// Per-user configuration root that IDEs write their state under
    pub fn config_root(&self) -> PathBuf {
        match self.platform {
            Platform::Windows => self
                .appdata
                .clone()
                .unwrap_or_else(|| self.home.join("AppData").join("Roaming")),
            Platform::MacOs => self.home.join("Library").join("Application Support"),
            Platform::Linux => self
                .xdg_config_home
                .clone()
                .unwrap_or_else(|| self.home.join(".config")),
        }
    }

    pub fn local_data_root(&self) -> PathBuf {
        match self.platform {
            Platform::Windows => self
                .local_appdata
                .clone()
                .unwrap_or_else(|| self.home.join("AppData").join("Local")),
            _ => self.config_root(),
        }
    }

    pub fn jetbrains_root(&self) -> PathBuf {
        self.vendor_root("JetBrains")
    }

    /// Per-vendor directory holding versioned IDE configs (`JetBrains`, `Google`)
    pub fn vendor_root(&self, vendor: &str) -> PathBuf {
        self.config_root().join(vendor)
    }
}
