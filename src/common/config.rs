use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::automation::AutomationOptions;

/// Global idereset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Substring identifying the extension's records and cache entries
    #[serde(default = "default_vendor_marker")]
    pub vendor_marker: String,

    /// Dedicated backup directory; backups go beside their originals when unset
    #[serde(default)]
    pub backup_root: Option<PathBuf>,

    /// Mark JetBrains ID files read-only after rewriting them
    #[serde(default = "default_true")]
    pub lock_jetbrains_ids: bool,

    /// IDE slugs or display names to leave alone
    #[serde(default)]
    pub exclude_ides: Vec<String>,

    /// Default automation steps
    #[serde(default)]
    pub automation: AutomationOptions,

    /// Output format preference
    #[serde(default)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Quiet,
}

fn default_vendor_marker() -> String {
    "augment".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vendor_marker: default_vendor_marker(),
            backup_root: None,
            lock_jetbrains_ids: true,
            exclude_ides: Vec::new(),
            automation: AutomationOptions::default(),
            output_format: OutputFormat::Human,
        }
    }
}

impl Config {
    /// Get the idereset data directory (~/.idereset)
    pub fn data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".idereset")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// Get the logs directory
    pub fn logs_dir() -> PathBuf {
        Self::data_dir().join("logs")
    }

    /// Get the preferences file path
    pub fn preferences_path() -> PathBuf {
        Self::data_dir().join("preferences.toml")
    }

    /// Load config from file, or use defaults if it does not exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let mut config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            config.vendor_marker = config.vendor_marker.trim().to_string();
            if config.vendor_marker.is_empty() {
                anyhow::bail!(
                    "Invalid config {}: vendor_marker must not be empty",
                    path.display()
                );
            }
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Initialize all idereset directories
    pub fn init_dirs() -> Result<()> {
        for dir in [Self::data_dir(), Self::logs_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    /// Set a single key from its string form (used by `config set`)
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "vendor_marker" => {
                if value.trim().is_empty() {
                    anyhow::bail!("vendor_marker must not be empty");
                }
                self.vendor_marker = value.trim().to_string();
            }
            "backup_root" => {
                self.backup_root = if value.is_empty() || value == "none" {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "lock_jetbrains_ids" => self.lock_jetbrains_ids = parse_bool(key, value)?,
            "exclude_ides" => {
                self.exclude_ides = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "automation.include_signout" => {
                self.automation.include_signout = parse_bool(key, value)?
            }
            "automation.include_cleaning" => {
                self.automation.include_cleaning = parse_bool(key, value)?
            }
            "automation.include_signin" => {
                self.automation.include_signin = parse_bool(key, value)?
            }
            "automation.include_restart" => {
                self.automation.include_restart = parse_bool(key, value)?
            }
            "output_format" => {
                self.output_format = match value {
                    "human" => OutputFormat::Human,
                    "json" => OutputFormat::Json,
                    "quiet" => OutputFormat::Quiet,
                    other => anyhow::bail!("Unknown output format '{}'", other),
                }
            }
            other => anyhow::bail!("Unknown config key '{}'", other),
        }
        Ok(())
    }

    /// Check if an IDE should be skipped
    pub fn is_excluded(&self, name: &str, display_name: &str) -> bool {
        self.exclude_ides
            .iter()
            .any(|e| e.eq_ignore_ascii_case(name) || e.eq_ignore_ascii_case(display_name))
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => anyhow::bail!("'{}' expects true or false, got '{}'", key, value),
    }
}

/// Small persisted preferences kept apart from the user-edited config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub onboarding_shown: bool,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

impl Preferences {
    pub fn load() -> Result<Self> {
        Self::load_from(&Config::preferences_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read preferences: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse preferences: {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize preferences")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write preferences: {}", path.display()))
    }

    pub fn is_first_run(&self) -> bool {
        !self.onboarding_shown
    }

    /// Record that onboarding was shown and persist it
    pub fn mark_onboarding_shown(&mut self) -> Result<()> {
        self.onboarding_shown = true;
        self.save_to(&Config::preferences_path())
    }

    pub fn record_run(&mut self) -> Result<()> {
        self.last_run = Some(Utc::now());
        self.save_to(&Config::preferences_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.vendor_marker, "augment");
        assert!(config.backup_root.is_none());
        assert!(config.lock_jetbrains_ids);
        assert!(config.automation.include_restart);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "vendor_marker = \"copilot\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.vendor_marker, "copilot");
        assert!(config.lock_jetbrains_ids);
        assert!(config.automation.include_cleaning);
    }

    #[test]
    fn test_blank_vendor_marker_in_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        for contents in ["vendor_marker = \"\"\n", "vendor_marker = \"  \"\n"] {
            std::fs::write(&path, contents).unwrap();
            let err = Config::load_from(&path).unwrap_err();
            assert!(format!("{:#}", err).contains("vendor_marker must not be empty"));
        }

        std::fs::write(&path, "vendor_marker = \" copilot \"\n").unwrap();
        assert_eq!(Config::load_from(&path).unwrap().vendor_marker, "copilot");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = Config::default();
        config.set_value("exclude_ides", "cursor, PyCharm").unwrap();
        config.set_value("automation.include_restart", "false").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.exclude_ides, vec!["cursor", "PyCharm"]);
        assert!(!loaded.automation.include_restart);
        assert!(loaded.is_excluded("pycharm", "PyCharm"));
        assert!(!loaded.is_excluded("vscode", "VS Code"));
    }

    #[test]
    fn test_set_value_rejects_unknown_key() {
        let mut config = Config::default();
        assert!(config.set_value("nope", "1").is_err());
        assert!(config.set_value("lock_jetbrains_ids", "maybe").is_err());
        assert!(config.set_value("vendor_marker", "  ").is_err());
    }

    #[test]
    fn test_preferences_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.toml");
        assert!(Preferences::load_from(&path).unwrap().is_first_run());

        let prefs = Preferences {
            onboarding_shown: true,
            last_run: None,
        };
        prefs.save_to(&path).unwrap();
        assert!(!Preferences::load_from(&path).unwrap().is_first_run());
    }
}
