//! 按 contact point 命名空间的存储包装
//!
//! 实际键为 `{key}_{contactPoint}`。读取时若命名空间键不存在，回退到旧的无命名空间键，
//! 并将其迁移为命名空间键。

use std::sync::Arc;

use parking_lot::RwLock;

use super::SessionStorage;

pub struct NamespacedStorage {
    inner: Arc<dyn SessionStorage>,
    contact_point: RwLock<Option<String>>,
}

impl NamespacedStorage {
    pub fn new(inner: Arc<dyn SessionStorage>) -> Self {
        Self {
            inner,
            contact_point: RwLock::new(None),
        }
    }

    fn namespaced(&self, key: &str) -> Option<String> {
        self.contact_point
            .read()
            .as_ref()
            .map(|ns| format!("{key}_{ns}"))
    }
}

impl SessionStorage for NamespacedStorage {
    fn get(&self, key: &str) -> Option<String> {
        let namespaced = self.namespaced(key)?;
        if let Some(value) = self.inner.get(&namespaced) {
            return Some(value);
        }

        let legacy = self.inner.get(key)?;
        tracing::debug!(key, "Migrating legacy storage key into contact point namespace");
        self.inner.remove(key);
        self.inner.set(&namespaced, &legacy);
        Some(legacy)
    }

    fn set(&self, key: &str, value: &str) {
        match self.namespaced(key) {
            Some(namespaced) => self.inner.set(&namespaced, value),
            None => tracing::error!(key, "Can't set storage key before contact point is set"),
        }
    }

    fn remove(&self, key: &str) {
        match self.namespaced(key) {
            Some(namespaced) => self.inner.remove(&namespaced),
            None => tracing::error!(key, "Can't remove storage key before contact point is set"),
        }
    }

    fn scope(&self, contact_point: &str) {
        *self.contact_point.write() = Some(contact_point.to_string());
    }

    fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_unscoped_reads_nothing_and_refuses_writes() {
        let backing = Arc::new(MemoryStorage::new());
        backing.set("k", "legacy");
        let storage = NamespacedStorage::new(backing.clone());
        assert_eq!(storage.get("k"), None);
        storage.set("other", "v");
        assert_eq!(backing.keys(), vec!["k".to_string()]);
    }

    #[test]
    fn test_keys_are_suffixed() {
        let backing = Arc::new(MemoryStorage::new());
        let storage = NamespacedStorage::new(backing.clone());
        storage.scope("sales");
        storage.set("k", "v");
        assert_eq!(backing.get("k_sales").as_deref(), Some("v"));
        assert_eq!(storage.get("k").as_deref(), Some("v"));
        storage.remove("k");
        assert!(backing.keys().is_empty());
    }

    #[test]
    fn test_legacy_key_is_migrated() {
        let backing = Arc::new(MemoryStorage::new());
        backing.set("k", "legacy");
        let storage = NamespacedStorage::new(backing.clone());
        storage.scope("support");

        assert_eq!(storage.get("k").as_deref(), Some("legacy"));
        assert_eq!(backing.keys(), vec!["k_support".to_string()]);
    }

    #[test]
    fn test_contact_points_are_isolated() {
        let backing = Arc::new(MemoryStorage::new());
        let storage = NamespacedStorage::new(backing);
        storage.scope("a");
        storage.set("k", "for-a");
        storage.scope("b");
        assert_eq!(storage.get("k"), None);
    }
}
