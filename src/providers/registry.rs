//! Provider registry.
//!
//! Maps provider class names stored in `BugProvider` and `Repository` records
//! to constructors. The table is filled once at startup; resolving a name
//! either builds a complete provider or fails with `UnknownProvider`.

use std::collections::BTreeMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::ProviderError;

use super::bugtracker::BugTrackerProvider;
use super::repository::{
    GitSourceCodeProvider, HgSourceCodeProvider, RepositoryConfig, RepositoryProvider,
};

/// Builds a bug tracker from the provider record's primary key and host name.
pub type BugTrackerFactory =
    Arc<dyn Fn(i64, &str) -> Result<Arc<dyn BugTrackerProvider>, ProviderError> + Send + Sync>;

/// Builds a repository provider from its configuration.
pub type RepositoryFactory = Arc<
    dyn Fn(&RepositoryConfig) -> Result<Arc<dyn RepositoryProvider>, ProviderError> + Send + Sync,
>;

pub const GIT_PROVIDER: &str = "GITSourceCodeProvider";
pub const HG_PROVIDER: &str = "HGSourceCodeProvider";

/// Name-to-constructor table for both provider families.
///
/// Cloning shares the constructors.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    bug_trackers: BTreeMap<String, BugTrackerFactory>,
    repositories: BTreeMap<String, RepositoryFactory>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in repository providers.
    pub fn with_builtin_providers() -> Self {
        let mut registry = Self::new();
        registry
            .repositories
            .insert(GIT_PROVIDER.to_string(), Arc::new(build_git));
        registry
            .repositories
            .insert(HG_PROVIDER.to_string(), Arc::new(build_hg));
        registry
    }

    /// Registers a bug tracker implementation under `name`.
    pub fn register_bug_tracker<F>(&mut self, name: &str, factory: F) -> Result<(), ProviderError>
    where
        F: Fn(i64, &str) -> Result<Arc<dyn BugTrackerProvider>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        if self.bug_trackers.contains_key(name) {
            return Err(ProviderError::DuplicateProvider {
                kind: "bug tracker",
                name: name.to_string(),
            });
        }
        self.bug_trackers.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    /// Registers a repository implementation under `name`.
    pub fn register_repository<F>(&mut self, name: &str, factory: F) -> Result<(), ProviderError>
    where
        F: Fn(&RepositoryConfig) -> Result<Arc<dyn RepositoryProvider>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        if self.repositories.contains_key(name) {
            return Err(ProviderError::DuplicateProvider {
                kind: "repository",
                name: name.to_string(),
            });
        }
        self.repositories.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    pub fn resolve_bug_tracker(
        &self,
        name: &str,
        provider_id: i64,
        hostname: &str,
    ) -> Result<Arc<dyn BugTrackerProvider>, ProviderError> {
        let factory = self
            .bug_trackers
            .get(name)
            .ok_or_else(|| ProviderError::UnknownProvider {
                kind: "bug tracker",
                name: name.to_string(),
            })?;
        factory(provider_id, hostname)
    }

    pub fn resolve_repository(
        &self,
        name: &str,
        config: &RepositoryConfig,
    ) -> Result<Arc<dyn RepositoryProvider>, ProviderError> {
        let factory = self
            .repositories
            .get(name)
            .ok_or_else(|| ProviderError::UnknownProvider {
                kind: "repository",
                name: name.to_string(),
            })?;
        factory(config)
    }

    pub fn bug_tracker_names(&self) -> Vec<String> {
        self.bug_trackers.keys().cloned().collect()
    }

    pub fn repository_names(&self) -> Vec<String> {
        self.repositories.keys().cloned().collect()
    }
}

fn build_git(config: &RepositoryConfig) -> Result<Arc<dyn RepositoryProvider>, ProviderError> {
    Ok(Arc::new(GitSourceCodeProvider::new(config)?))
}

fn build_hg(config: &RepositoryConfig) -> Result<Arc<dyn RepositoryProvider>, ProviderError> {
    Ok(Arc::new(HgSourceCodeProvider::new(config)?))
}

// Process-wide registry, built-ins registered on first use
lazy_static! {
    static ref PROVIDER_REGISTRY: RwLock<ProviderRegistry> =
        RwLock::new(ProviderRegistry::with_builtin_providers());
}

/// Get a read-only reference to the global provider registry.
pub fn get_registry() -> RwLockReadGuard<'static, ProviderRegistry> {
    PROVIDER_REGISTRY.read()
}

/// Get a mutable reference to the global provider registry.
pub fn get_registry_mut() -> RwLockWriteGuard<'static, ProviderRegistry> {
    PROVIDER_REGISTRY.write()
}

/// Copy of the global registry, taken without keeping the lock.
///
/// Use this when resolved providers run long commands, so registrations are
/// not blocked behind them.
pub fn registry_snapshot() -> ProviderRegistry {
    PROVIDER_REGISTRY.read().clone()
}

#[cfg(test)]
pub(crate) fn registry_writable_within(timeout: std::time::Duration) -> bool {
    PROVIDER_REGISTRY.try_write_for(timeout).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysKnown;

    impl RepositoryProvider for AlwaysKnown {
        fn test_revision(&self, _revision: &str) -> Result<bool, ProviderError> {
            Ok(true)
        }

        fn update(&self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    #[test]
    fn test_builtin_names() {
        let registry = ProviderRegistry::with_builtin_providers();
        assert_eq!(
            registry.repository_names(),
            vec![GIT_PROVIDER.to_string(), HG_PROVIDER.to_string()]
        );
        assert!(registry.bug_tracker_names().is_empty());
    }

    #[test]
    fn test_unknown_names_fail() {
        let registry = ProviderRegistry::with_builtin_providers();
        let config = RepositoryConfig::new("/tmp");

        assert!(matches!(
            registry.resolve_repository("SVNSourceCodeProvider", &config),
            Err(ProviderError::UnknownProvider { kind: "repository", .. })
        ));
        assert!(matches!(
            registry.resolve_bug_tracker("BugzillaProvider", 1, "bugzilla.example.com"),
            Err(ProviderError::UnknownProvider { kind: "bug tracker", .. })
        ));
    }

    #[test]
    fn test_builtin_construction_errors_propagate() {
        let registry = ProviderRegistry::with_builtin_providers();
        let config = RepositoryConfig::new("/nonexistent/mirror");
        assert!(matches!(
            registry.resolve_repository(GIT_PROVIDER, &config),
            Err(ProviderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ProviderRegistry::new();
        registry
            .register_repository("AlwaysKnown", |_| Ok(Arc::new(AlwaysKnown)))
            .unwrap();

        let provider = registry
            .resolve_repository("AlwaysKnown", &RepositoryConfig::new("/anywhere"))
            .unwrap();
        assert!(provider.test_revision("abc123").unwrap());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ProviderRegistry::with_builtin_providers();
        let err = registry
            .register_repository(GIT_PROVIDER, |_| Ok(Arc::new(AlwaysKnown)))
            .unwrap_err();
        assert!(matches!(err, ProviderError::DuplicateProvider { .. }));
    }

    #[test]
    fn test_clone_outlives_lock() {
        let lock = RwLock::new(ProviderRegistry::with_builtin_providers());
        let snapshot = lock.read().clone();

        lock.write()
            .register_repository("AlwaysKnown", |_| Ok(Arc::new(AlwaysKnown)))
            .unwrap();

        assert_eq!(snapshot.repository_names().len(), 2);
        assert_eq!(lock.read().repository_names().len(), 3);
        assert!(matches!(
            snapshot.resolve_repository(GIT_PROVIDER, &RepositoryConfig::new("/nonexistent/mirror")),
            Err(ProviderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_global_registry_has_builtins() {
        assert!(get_registry()
            .repository_names()
            .contains(&GIT_PROVIDER.to_string()));
    }
}
