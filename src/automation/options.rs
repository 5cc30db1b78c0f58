use serde::{Deserialize, Serialize};

pub use crate::cleaner::storage::StorageOptions;

/// Which pipeline steps an automation run performs. Steps are independent:
/// turning off signout does not stop cleaning from touching a running IDE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationOptions {
    #[serde(default = "default_true")]
    pub include_signout: bool,
    #[serde(default = "default_true")]
    pub include_cleaning: bool,
    #[serde(default = "default_true")]
    pub include_signin: bool,
    #[serde(default = "default_true")]
    pub include_restart: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AutomationOptions {
    fn default() -> Self {
        Self {
            include_signout: true,
            include_cleaning: true,
            include_signin: true,
            include_restart: true,
        }
    }
}

impl AutomationOptions {
    pub fn enabled_count(&self) -> usize {
        [
            self.include_signout,
            self.include_cleaning,
            self.include_signin,
            self.include_restart,
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_everything() {
        let options = AutomationOptions::default();
        assert_eq!(options.enabled_count(), 4);
    }

    #[test]
    fn test_partial_table_keeps_defaults() {
        let options: AutomationOptions = toml::from_str("include_restart = false").unwrap();
        assert!(options.include_signout);
        assert!(!options.include_restart);
        assert_eq!(options.enabled_count(), 3);
    }
}
