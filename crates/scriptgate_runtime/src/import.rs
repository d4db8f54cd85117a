//! Import allow-list and module resolution.
//!
//! A module name must be on the allow-list before anything is looked up.
//! Allowed names resolve once per gate: native modules first, then
//! `<path>/<name>.py` in each search path, compiled with the same
//! restrictions as any script. Resolved handles are cached for the gate's
//! lifetime and shared across executions.

use crate::config::RunnerConfig;
use crate::modules::{self, NativeModule};
use scriptgate_core::{GateResult, ScriptError};
use scriptgate_script::{CompiledScript, ScriptCompiler};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// A resolved module
#[derive(Debug)]
pub enum ModuleHandle {
    /// Built-in native module
    Native(&'static NativeModule),
    /// Script module loaded from a search path
    Script(CompiledScript),
}

impl ModuleHandle {
    /// Short label for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Native(_) => "native",
            Self::Script(_) => "script",
        }
    }
}

/// Import allow-list plus resolved-module cache
pub struct ImportGate {
    allowed: Vec<String>,
    paths: Vec<PathBuf>,
    compiler: ScriptCompiler,
    cache: RwLock<HashMap<String, Arc<ModuleHandle>>>,
}

/// Split a comma-separated list, trimming and dropping repeats
fn split_list(list: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}

fn denied(name: &str, reason: impl Into<String>) -> ScriptError {
    ScriptError::ImportDenied {
        module: name.to_string(),
        reason: reason.into(),
    }
}

impl ImportGate {
    /// Gate over comma-separated module names and search paths
    #[must_use]
    pub fn new(allowed_modules: &str, additional_paths: &str) -> Self {
        let allowed = split_list(allowed_modules);
        let paths: Vec<PathBuf> = split_list(additional_paths).into_iter().map(PathBuf::from).collect();
        debug!(allowed = allowed.len(), paths = paths.len(), "import gate configured");
        Self {
            allowed,
            paths,
            compiler: ScriptCompiler::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Gate from runner configuration
    #[must_use]
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(
            config.allowed_import_modules.as_deref().unwrap_or_default(),
            config.additional_modules_paths.as_deref().unwrap_or_default(),
        )
    }

    /// Allowed module names, in configuration order
    #[must_use]
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// Search paths, in configuration order
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Whether `name` is on the allow-list
    #[must_use]
    pub fn is_allowed(&self, name: &str) -> bool {
        self.allowed.iter().any(|m| m == name)
    }

    /// Names resolved so far, sorted
    #[must_use]
    pub fn cached(&self) -> Vec<String> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = cache.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve an import
    ///
    /// # Errors
    ///
    /// Returns `ImportDenied` when `name` is not allowed, cannot be found,
    /// or fails to load
    pub fn resolve(&self, name: &str) -> GateResult<Arc<ModuleHandle>> {
        if !self.is_allowed(name) {
            warn!(module = name, "import denied");
            return Err(denied(name, "is not configured as a supported import module"));
        }
        if let Some(handle) = self.cache.read().unwrap_or_else(PoisonError::into_inner).get(name) {
            debug!(module = name, "import cache hit");
            return Ok(Arc::clone(handle));
        }

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = cache.get(name) {
            return Ok(Arc::clone(handle));
        }
        let handle = Arc::new(self.load(name)?);
        debug!(module = name, kind = handle.kind(), "module resolved");
        cache.insert(name.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    fn load(&self, name: &str) -> GateResult<ModuleHandle> {
        if let Some(native) = modules::lookup(name) {
            return Ok(ModuleHandle::Native(native));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(denied(name, "not found"));
        }
        for dir in &self.paths {
            let candidate = dir.join(format!("{name}.py"));
            if candidate.is_file() {
                return self.load_file(name, &candidate);
            }
        }
        warn!(module = name, "allowed module not found");
        Err(denied(name, "not found"))
    }

    fn load_file(&self, name: &str, path: &Path) -> GateResult<ModuleHandle> {
        let source = std::fs::read_to_string(path)
            .map_err(|err| denied(name, format!("could not be read: {err}")))?;
        let compiled = self
            .compiler
            .compile(&source)
            .map_err(|err| denied(name, format!("failed to compile: {err}")))?;
        debug!(module = name, path = %path.display(), "script module compiled");
        Ok(ModuleHandle::Script(compiled))
    }
}

impl std::fmt::Debug for ImportGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportGate")
            .field("allowed", &self.allowed)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::repr;

    #[test]
    fn test_split_list_trims_and_dedupes() {
        assert_eq!(split_list(" math, json ,,math, re "), vec!["math", "json", "re"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_not_allowed_is_denied_even_when_native() {
        let gate = ImportGate::new("json", "");
        let err = gate.resolve("math").unwrap_err();
        assert_eq!(err.kind(), "ImportDenied");
        assert!(err.to_string().contains("math"));
        assert!(gate.cached().is_empty());
    }

    #[test]
    fn test_native_resolves_once() {
        let gate = ImportGate::new("math", "");
        let a = gate.resolve("math").unwrap();
        let b = gate.resolve("math").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.kind(), "native");
        assert_eq!(gate.cached(), vec!["math"]);
    }

    #[test]
    fn test_script_module_from_search_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("helpers.py"), "def double(x):\n    return x * 2\n").unwrap();
        let gate = ImportGate::new("helpers", &format!("{}, {}", dir.path().display(), dir.path().display()));
        assert_eq!(gate.paths().len(), 1);
        let handle = gate.resolve("helpers").unwrap();
        assert_eq!(handle.kind(), "script");
    }

    #[test]
    fn test_allowed_but_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let gate = ImportGate::new("ghost", &dir.path().display().to_string());
        let err = gate.resolve("ghost").unwrap_err();
        assert_eq!(err.kind(), "ImportDenied");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_module_that_fails_to_compile_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.py"), "x = _secret\n").unwrap();
        let gate = ImportGate::new("bad", &dir.path().display().to_string());
        let err = gate.resolve("bad").unwrap_err();
        assert!(err.to_string().contains("failed to compile"));
    }

    #[test]
    fn test_denied_import_is_catchable_as_import_error() {
        assert_eq!(
            repr("try:\n    import subprocess\n    r = 'loaded'\nexcept ImportError as e:\n    r = 'denied'"),
            "'denied'"
        );
    }
}
