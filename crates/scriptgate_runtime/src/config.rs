//! Runner configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration a [`crate::ScriptRunner`] is built from
///
/// Read once at construction; the import allow-list and search paths are
/// fixed for the runner's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerConfig {
    /// Comma-separated module names scripts may import
    pub allowed_import_modules: Option<String>,
    /// Comma-separated directories searched for `<name>.py` modules
    pub additional_modules_paths: Option<String>,
    /// Maximum nesting of delegated shared queries
    pub max_delegation_depth: Option<u32>,
    /// Step budget per execution; unlimited when absent
    pub max_steps: Option<u64>,
}

impl RunnerConfig {
    /// Empty configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the import allow-list
    #[must_use]
    pub fn with_allowed_import_modules(mut self, modules: impl Into<String>) -> Self {
        self.allowed_import_modules = Some(modules.into());
        self
    }

    /// Set the module search paths
    #[must_use]
    pub fn with_additional_modules_paths(mut self, paths: impl Into<String>) -> Self {
        self.additional_modules_paths = Some(paths.into());
        self
    }

    /// Set the delegation depth limit
    #[must_use]
    pub fn with_max_delegation_depth(mut self, depth: u32) -> Self {
        self.max_delegation_depth = Some(depth);
        self
    }

    /// Set the step budget
    #[must_use]
    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    /// Load from a JSON file
    ///
    /// # Errors
    ///
    /// Returns an I/O error for unreadable files and `InvalidData` for
    /// malformed JSON
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_keys() {
        let config: RunnerConfig = serde_json::from_str(
            r#"{"allowedImportModules": "math, json", "additionalModulesPaths": "/opt/mods", "maxDelegationDepth": 2, "maxSteps": 1000}"#,
        )
        .unwrap();
        assert_eq!(config.allowed_import_modules.as_deref(), Some("math, json"));
        assert_eq!(config.additional_modules_paths.as_deref(), Some("/opt/mods"));
        assert_eq!(config.max_delegation_depth, Some(2));
        assert_eq!(config.max_steps, Some(1000));
    }

    #[test]
    fn test_missing_keys_default() {
        let config: RunnerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RunnerConfig::default());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.json");
        std::fs::write(&path, r#"{"maxSteps": 5}"#).unwrap();
        assert_eq!(RunnerConfig::from_file(&path).unwrap(), RunnerConfig::new().with_max_steps(5));
        std::fs::write(&path, "{").unwrap();
        assert_eq!(
            RunnerConfig::from_file(&path).unwrap_err().kind(),
            std::io::ErrorKind::InvalidData
        );
    }
}
