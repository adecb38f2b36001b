use std::sync::Arc;

use dashmap::DashMap;
use localstore_core::Result;
use tracing::debug;

use crate::{builder::StoreBuilder, file_store::FileStore};

/// Caller-owned cache of open stores keyed by name.
///
/// The first lookup for a name builds the store; later lookups share it.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: DashMap<String, Arc<FileStore>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the store registered under `name`, building it with the
    /// builder from `configure` on first use. A failed build caches nothing.
    ///
    /// The build runs without holding any map lock. If two callers race on
    /// the same name, the first insert wins and the other build is dropped.
    pub fn get_or_try_insert_with<F>(&self, name: &str, configure: F) -> Result<Arc<FileStore>>
    where
        F: FnOnce() -> StoreBuilder,
    {
        if let Some(store) = self.get(name) {
            return Ok(store);
        }

        let built = Arc::new(configure().build()?);
        let winner = self
            .stores
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(name, "registering store");
                Arc::clone(&built)
            });
        Ok(Arc::clone(winner.value()))
    }

    pub fn get(&self, name: &str) -> Option<Arc<FileStore>> {
        self.stores.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Forgets a store. Callers holding the `Arc` keep a working handle.
    pub fn remove(&self, name: &str) -> Option<Arc<FileStore>> {
        self.stores.remove(name).map(|(_, store)| store)
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use localstore_core::store::Store;

    use super::*;
    use crate::file_store::StorageKind;

    #[test]
    fn first_lookup_builds_and_later_lookups_share() {
        let root = tempfile::tempdir().expect("tempdir");
        let registry = StoreRegistry::new();
        let builder = || {
            StoreBuilder::new("prefs.ls", StorageKind::Plain).with_directory_path(root.path())
        };

        let first = registry
            .get_or_try_insert_with("prefs", builder)
            .expect("build");
        first.put("k", "v").expect("put");

        let second = registry
            .get_or_try_insert_with("prefs", || panic!("must not rebuild"))
            .expect("cached");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.get_string("k").as_deref(), Some("v"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn failed_build_is_not_cached() {
        let registry = StoreRegistry::new();
        let err = registry.get_or_try_insert_with("bad", || {
            StoreBuilder::new("", StorageKind::Plain)
        });
        assert!(err.is_err());
        assert!(registry.is_empty());
        assert!(registry.get("bad").is_none());
    }

    #[test]
    fn configure_may_call_back_into_registry() {
        let root = tempfile::tempdir().expect("tempdir");
        let registry = StoreRegistry::new();
        let builder =
            |name: &str| StoreBuilder::new(name, StorageKind::Plain).with_directory_path(root.path());

        let outer = registry
            .get_or_try_insert_with("outer", || {
                registry
                    .get_or_try_insert_with("inner", || builder("inner.ls"))
                    .expect("nested build");
                assert!(registry.get("outer").is_none());
                builder("outer.ls")
            })
            .expect("build");

        assert_eq!(outer.filename(), "outer.ls");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_forgets_store() {
        let root = tempfile::tempdir().expect("tempdir");
        let registry = StoreRegistry::new();
        registry
            .get_or_try_insert_with("a", || {
                StoreBuilder::new("a.ls", StorageKind::Plain).with_directory_path(root.path())
            })
            .expect("build");

        assert!(registry.remove("a").is_some());
        assert!(registry.get("a").is_none());
        assert!(registry.remove("a").is_none());
    }
}
