//! Resolver configuration
//!
//! [`ResolverConfig`] holds tuning that normally lives in a configuration
//! file, [`ResolveOptions`] the per-invocation switches a front-end passes in.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, Result};

/// Base weights of the soft-preference tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Weights {
    /// Penalty of the best-ranked version in a package group
    pub base_update: u64,
    /// Added penalty per rank step away from the best version
    pub update_diff: u64,
    pub keep_installed: u64,
    /// Bonus for packages whose binary is already provided by the system
    pub sys_bin: u64,
    pub not_needed: u64,
    pub user_flag: u64,
    pub default_flag: u64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            base_update: 1,
            update_diff: 10,
            keep_installed: 2,
            sys_bin: 1,
            not_needed: 2,
            user_flag: 4,
            default_flag: 3,
        }
    }
}

impl Weights {
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("base-update", self.base_update),
            ("update-diff", self.update_diff),
            ("keep-installed", self.keep_installed),
            ("sys-bin", self.sys_bin),
            ("not-needed", self.not_needed),
            ("user-flag", self.user_flag),
            ("default-flag", self.default_flag),
        ];
        for (name, value) in named {
            if value == 0 {
                return Err(ResolveError::Config(format!("weight {} must be positive", name)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ResolverConfig {
    pub weights: Weights,
    /// Give up on finding an optimal solution after this many seconds
    pub timeout_secs: Option<u64>,
}

impl ResolverConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ResolverConfig = serde_json::from_str(json)?;
        config.weights.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Switches for a single resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ResolveOptions {
    /// Also reconsider flags of installed packages that are not being changed
    pub deep: bool,
    /// Prefer removing installed packages nothing needs
    pub depclean: bool,
    /// Prefer newer versions over keeping installed ones
    pub update: bool,
    /// Together with `deep`, re-evaluate default flags of installed packages
    pub newuse: bool,
    /// Reinstall every enabled package
    pub emptytree: bool,
    /// Do not reinstall selected packages that are already installed
    pub noreplace: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights() {
        let weights = Weights::default();
        assert_eq!(weights.update_diff, 10);
        assert_eq!(weights.user_flag, 4);
        assert!(weights.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ResolverConfig::from_json(r#"{"weights": {"not-needed": 7}, "timeout-secs": 30}"#).unwrap();
        assert_eq!(config.weights.not_needed, 7);
        assert_eq!(config.weights.keep_installed, 2);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_weight_is_rejected() {
        let result = ResolverConfig::from_json(r#"{"weights": {"user-flag": 0}}"#);
        assert!(matches!(result, Err(ResolveError::Config(_))));
    }

    #[test]
    fn test_options_from_json() {
        let options: ResolveOptions = serde_json::from_str(r#"{"deep": true, "newuse": true}"#).unwrap();
        assert!(options.deep && options.newuse);
        assert!(!options.depclean);
    }
}
