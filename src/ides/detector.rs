use std::path::{Path, PathBuf};

use super::descriptor::IdeDescriptor;
use super::environment::Environment;
use super::probe::PathProbe;
use super::product::{Family, Platform, Product, ProductSpec};

/// Subdirectories that mark a JetBrains directory as a real product config
const JETBRAINS_MARKERS: &[&str] = &["options", "config", "system", "plugins"];

const PERMANENT_DEVICE_ID: &str = "PermanentDeviceId";
const PERMANENT_USER_ID: &str = "PermanentUserId";

/// Finds installed IDEs and builds verified descriptors for them
pub struct Detector {
    env: Environment,
    probe: PathProbe,
    exclude: Vec<String>,
}

impl Detector {
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            probe: PathProbe::new(),
            exclude: Vec::new(),
        }
    }

    /// Skip products whose slug or display name appears in `names`
    pub fn with_exclusions(mut self, names: &[String]) -> Self {
        self.exclude = names.to_vec();
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Scan every known product, in registry order.
    /// At most one descriptor per product; unreadable candidates count as absent.
    pub fn scan(&self) -> Vec<IdeDescriptor> {
        let mut found = Vec::new();

        for product in Product::all() {
            let spec = product.spec();
            if self.is_excluded(spec) {
                tracing::debug!("Skipping excluded product {}", spec.display_name);
                continue;
            }

            let descriptor = match spec.family {
                Family::Editor => self.detect_editor(spec),
                Family::JetBrains => self.detect_jetbrains(spec),
            };

            if let Some(d) = descriptor.filter(IdeDescriptor::has_any_path) {
                tracing::info!("Detected {} ({} paths)", d.display_name, d.paths().len());
                found.push(d);
            }
        }

        found
    }

    fn is_excluded(&self, spec: &ProductSpec) -> bool {
        self.exclude.iter().any(|e| {
            e.eq_ignore_ascii_case(spec.slug) || e.eq_ignore_ascii_case(spec.display_name)
        })
    }

    // ─── Editor family ───────────────────────────────────────────────────

    fn detect_editor(&self, spec: &ProductSpec) -> Option<IdeDescriptor> {
        let config_root = self.env.config_root();

        spec.config_dirs.iter().find_map(|dir| {
            let root = config_root.join(dir);
            let user = root.join("User");
            let global = user.join("globalStorage");

            let storage_path = self.probe.verify_file(&global.join("storage.json"))?;

            let mut d = IdeDescriptor::new(spec.product);
            d.storage_path = Some(storage_path);
            d.db_path = self.probe.verify_file(&global.join("state.vscdb"));
            let machine_id_user = user.join("machineid");
            let machine_id_root = root.join("machineid");
            d.machine_id_path = self
                .probe
                .first_file([machine_id_user.as_path(), machine_id_root.as_path()]);
            d.workspace_storage_path = self.probe.verify_dir(&user.join("workspaceStorage"));
            d.global_storage_path = self.probe.verify_dir(&global);
            d.version = read_product_version(&root.join("product.json"));
            d.executable_path = self.find_executable(spec);
            Some(d)
        })
    }

    // ─── JetBrains family ────────────────────────────────────────────────

    fn detect_jetbrains(&self, spec: &ProductSpec) -> Option<IdeDescriptor> {
        let jb_root = match spec.config_vendor {
            Some(vendor) => self.env.vendor_root(vendor),
            None => self.env.jetbrains_root(),
        };
        let (dir, version) = self.newest_jetbrains_dir(&jb_root, spec)?;
        let config_path = self.probe.verify_dir(&dir)?;

        let mut d = IdeDescriptor::new(spec.product);
        d.version = Some(version.to_string());
        d.permanent_device_id_path = self.find_id_file(&config_path, &jb_root, PERMANENT_DEVICE_ID);
        d.permanent_user_id_path = self.find_id_file(&config_path, &jb_root, PERMANENT_USER_ID);
        d.config_path = Some(config_path);
        d.executable_path = self.find_executable(spec);
        Some(d)
    }

    /// Highest-versioned product directory under the vendor root
    fn newest_jetbrains_dir(
        &self,
        jb_root: &Path,
        spec: &ProductSpec,
    ) -> Option<(PathBuf, JetBrainsVersion)> {
        let entries = match std::fs::read_dir(jb_root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Cannot list {}: {}", jb_root.display(), e);
                return None;
            }
        };

        entries
            .filter_map(|e| e.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                let version = spec
                    .config_dirs
                    .iter()
                    .find_map(|prefix| match_jetbrains_dir(&name, prefix))?;
                let path = entry.path();
                let is_product_dir = JETBRAINS_MARKERS.iter().any(|m| path.join(m).is_dir());
                is_product_dir.then_some((path, version))
            })
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
    }

    fn find_id_file(&self, product_dir: &Path, jb_root: &Path, name: &str) -> Option<PathBuf> {
        let local = product_dir.join(name);
        let shared = jb_root.join(name);
        self.probe.first_file([local.as_path(), shared.as_path()])
    }

    // ─── Executables ─────────────────────────────────────────────────────

    /// Locate the product's launcher: PATH first, then per-OS install locations
    pub fn find_executable(&self, spec: &ProductSpec) -> Option<PathBuf> {
        let suffixes: &[&str] = match self.env.platform {
            Platform::Windows => &[".cmd", ".exe", ""],
            _ => &[""],
        };

        for launcher in spec.launchers {
            for dir in &self.env.path_dirs {
                for suffix in suffixes {
                    let candidate = dir.join(format!("{}{}", launcher, suffix));
                    if let Some(found) = self.probe.verify_file(&candidate) {
                        return Some(found);
                    }
                }
            }
        }

        match self.env.platform {
            Platform::Windows => {
                let programs = self.env.local_data_root().join("Programs");
                spec.windows_install
                    .iter()
                    .find_map(|rel| self.probe.verify_file(&programs.join(rel)))
            }
            Platform::MacOs => spec.macos_bundle.iter().find_map(|rel| {
                self.env
                    .applications_dirs
                    .iter()
                    .find_map(|apps| self.probe.verify_file(&apps.join(rel)))
            }),
            Platform::Linux => None,
        }
    }
}

/// `(year, minor)` parsed from a JetBrains directory name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct JetBrainsVersion {
    pub year: u32,
    pub minor: u32,
}

impl std::fmt::Display for JetBrainsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.year, self.minor)
    }
}

/// Match `<prefix>[edition]<year>.<minor>` such as `PyCharm2024.1` or `PyCharmCE2023.3`
pub fn match_jetbrains_dir(name: &str, prefix: &str) -> Option<JetBrainsVersion> {
    let rest = name.strip_prefix(prefix)?;
    let digits_at = rest.find(|c: char| c.is_ascii_digit())?;
    let (edition, version) = rest.split_at(digits_at);
    if !edition.chars().all(|c| c.is_ascii_alphabetic()) || edition.len() > 2 {
        return None;
    }
    parse_version(version)
}

fn parse_version(s: &str) -> Option<JetBrainsVersion> {
    let (year, minor) = s.split_once('.')?;
    if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let minor_digits: String = minor.chars().take_while(|c| c.is_ascii_digit()).collect();
    Some(JetBrainsVersion {
        year: year.parse().ok()?,
        minor: minor_digits.parse().ok()?,
    })
}

fn read_product_version(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    let json: serde_json::Value = serde_json::from_str(&contents).ok()?;
    json.get("version")?.as_str().map(str::to_string)
}
