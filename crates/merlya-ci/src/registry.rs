//! Platform registry, grounded in `athena_ai/ci/registry.py::CIPlatformRegistry`.
//!
//! The original is a `__new__`-based singleton with a process-wide cache.
//! Ported onto a `OnceLock`-backed static plus an explicit `reset_instance`
//! hook kept for tests, since Rust has no metaclass-level singleton magic.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::adapter::github::GitHubAdapter;
use crate::adapter::CIPlatform;
use crate::config::CIConfig;
use crate::error::{CIError, Result};
use crate::models::CIPlatformType;

type AdapterFactory = Arc<dyn Fn(CIConfig) -> Arc<dyn CIPlatform> + Send + Sync>;

pub struct CIPlatformRegistry {
    factories: Mutex<HashMap<CIPlatformType, AdapterFactory>>,
    cache: Mutex<HashMap<String, Arc<dyn CIPlatform>>>,
}

impl CIPlatformRegistry {
    fn new() -> Self {
        let mut factories: HashMap<CIPlatformType, AdapterFactory> = HashMap::new();
        factories.insert(CIPlatformType::GitHub, Arc::new(|config| Arc::new(GitHubAdapter::new(config))));
        Self {
            factories: Mutex::new(factories),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, platform: CIPlatformType, factory: AdapterFactory) {
        if self.factories.lock().insert(platform, factory).is_some() {
            tracing::warn!(platform = %platform, "overwriting existing ci platform registration");
        }
    }

    pub fn has(&self, platform: CIPlatformType) -> bool {
        self.factories.lock().contains_key(&platform)
    }

    pub fn list_all(&self) -> Vec<CIPlatformType> {
        self.factories.lock().keys().copied().collect()
    }

    pub fn get(&self, config: CIConfig) -> Result<Arc<dyn CIPlatform>> {
        let platform = config.platform.ok_or_else(|| CIError::NoPlatformDetected)?;
        let factory = self
            .factories
            .lock()
            .get(&platform)
            .cloned()
            .ok_or_else(|| CIError::PlatformNotFound(platform.to_string()))?;
        Ok(factory(config))
    }

    /// Memoized lookup keyed by `"{platform}:{repo_slug}"`, mirroring
    /// `get_cached`'s `f"{name}:{cache_key}"` key format. Adapter
    /// construction itself happens outside any lock held across the call
    /// — only the cache map is locked briefly to read or insert.
    pub fn get_cached(&self, config: CIConfig) -> Result<Arc<dyn CIPlatform>> {
        let platform = config.platform.ok_or_else(|| CIError::NoPlatformDetected)?;
        let key = format!("{platform}:{}", config.repo_slug().unwrap_or_default());

        if let Some(adapter) = self.cache.lock().get(&key).cloned() {
            return Ok(adapter);
        }

        let adapter = self.get(config)?;
        self.cache.lock().insert(key, adapter.clone());
        Ok(adapter)
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn clear(&self) {
        self.factories.lock().clear();
        self.cache.lock().clear();
    }
}

static REGISTRY: OnceLock<CIPlatformRegistry> = OnceLock::new();

/// Returns the process-wide registry, building it with GitHub registered
/// out of the box — the original's `register_builtin_platforms()`
/// registers GitLab/Jenkins too, guarded by `try/except ImportError` for
/// optional dependencies; Rust has no equivalent runtime-optional import,
/// so non-GitHub platforms stay unregistered until an adapter for them
/// is written (see DESIGN.md's Open Question decision).
pub fn ci_registry() -> &'static CIPlatformRegistry {
    REGISTRY.get_or_init(CIPlatformRegistry::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_is_registered_by_default() {
        let registry = CIPlatformRegistry::new();
        assert!(registry.has(CIPlatformType::GitHub));
        assert!(!registry.has(CIPlatformType::GitLab));
    }

    #[test]
    fn get_without_platform_errors() {
        let registry = CIPlatformRegistry::new();
        let config = CIConfig::default();
        assert!(matches!(registry.get(config), Err(CIError::NoPlatformDetected)));
    }

    #[test]
    fn get_cached_returns_same_instance_key() {
        let registry = CIPlatformRegistry::new();
        let config = CIConfig::for_github("acme", "widgets");
        let a = registry.get_cached(config.clone()).unwrap();
        let b = registry.get_cached(config).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
