//! # Worker registry
//!
//! Maps `(module, submodule)` tag pairs to [`Launch`] capabilities. The
//! supervisor resolves the pair read from the persisted document on every
//! (re)start; an unregistered pair is [`WorkerError::UnknownVariant`].

use std::collections::HashMap;
use std::sync::Arc;

use super::launcher::Launch;
use super::process::ProcessLauncher;
use super::variant::{Variant, VariantKey};
use crate::error::WorkerError;
use crate::modules;

/// Table of launchable variants.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    launchers: HashMap<VariantKey, Arc<dyn Launch>>,
}

impl WorkerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in variant, each run as a child process of
    /// the current binary. Settings are validated before spawning.
    pub fn with_defaults() -> Result<Self, WorkerError> {
        let exec = ProcessLauncher::self_exec()?;
        let mut registry = Self::new();
        for variant in Variant::ALL {
            let launcher = exec
                .clone()
                .with_check(move |subtree| modules::validate(variant, subtree));
            registry.insert(variant.key(), Arc::new(launcher));
        }
        Ok(registry)
    }

    /// Adds or replaces the launcher for `key`.
    pub fn insert(&mut self, key: VariantKey, launcher: Arc<dyn Launch>) {
        self.launchers.insert(key, launcher);
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn register(mut self, key: VariantKey, launcher: Arc<dyn Launch>) -> Self {
        self.insert(key, launcher);
        self
    }

    /// Finds the launcher for `key`.
    pub fn resolve(&self, key: &VariantKey) -> Result<Arc<dyn Launch>, WorkerError> {
        self.launchers
            .get(key)
            .cloned()
            .ok_or_else(|| WorkerError::UnknownVariant {
                module: key.module.clone(),
                submodule: key.submodule.clone(),
            })
    }

    /// Registered pairs, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.launchers.keys().map(ToString::to_string).collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::TaskLauncher;

    #[test]
    fn defaults_cover_builtins_only() {
        let registry = WorkerRegistry::with_defaults().unwrap();
        assert_eq!(registry.keys(), ["camera/yolo", "wifi/esp8266", "wifi/native"]);

        match registry.resolve(&VariantKey::new("camera", "unknown")) {
            Err(WorkerError::UnknownVariant { module, submodule }) => {
                assert_eq!((module.as_str(), submodule.as_str()), ("camera", "unknown"));
            }
            _ => panic!("expected UnknownVariant"),
        }
    }

    #[test]
    fn register_overrides_builtin() {
        let launcher = TaskLauncher::new(|_| Err(WorkerError::failed("unused")));
        let registry = WorkerRegistry::new()
            .register(Variant::ObjectDetector.key(), Arc::new(launcher));
        assert!(registry.resolve(&VariantKey::new("camera", "yolo")).is_ok());
        assert!(registry.resolve(&VariantKey::new("wifi", "native")).is_err());
    }
}
