//! In-memory attribute store.

use dashmap::DashMap;
use indexmap::IndexMap;

use crate::store::{AttrError, AttributeStore};

/// Keeps attributes in a concurrent map keyed by object name.
///
/// Nothing survives the process. Useful for tests and for scratch stores
/// whose backing objects are thrown away as well.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: DashMap<String, IndexMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
        }
    }

    /// Number of objects carrying at least one attribute.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if no object carries attributes.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl AttributeStore for MemoryStore {
    fn get(&self, object: &str, key: &str) -> Result<Vec<u8>, AttrError> {
        self.objects
            .get(object)
            .and_then(|attrs| attrs.get(key).cloned())
            .ok_or_else(|| AttrError::not_set(object, key))
    }

    fn set(&self, object: &str, key: &str, value: &[u8]) -> Result<(), AttrError> {
        self.objects
            .entry(object.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, object: &str, key: &str) -> Result<(), AttrError> {
        if let Some(mut attrs) = self.objects.get_mut(object) {
            attrs.shift_remove(key);
        }
        Ok(())
    }

    fn list(&self, object: &str) -> Result<Vec<String>, AttrError> {
        Ok(self
            .objects
            .get(object)
            .map(|attrs| attrs.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), AttrError> {
        if let Some((_, attrs)) = self.objects.remove(from) {
            self.objects.insert(to.to_string(), attrs);
        }
        Ok(())
    }

    fn purge(&self, object: &str) -> Result<(), AttrError> {
        self.objects.remove(object);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = MemoryStore::new();
        store.set("n1", "user.ocis.name", b"docs").unwrap();

        assert_eq!(store.get("n1", "user.ocis.name").unwrap(), b"docs");
        assert!(store.get("n1", "user.ocis.parentid").unwrap_err().is_not_set());

        store.remove("n1", "user.ocis.name").unwrap();
        assert!(store.get_optional("n1", "user.ocis.name").unwrap().is_none());
    }

    #[test]
    fn test_rename_moves_attributes() {
        let store = MemoryStore::new();
        store.set("n1", "user.ocis.name", b"docs").unwrap();
        store.rename("n1", "n1.T.2024-01-01T00:00:00Z").unwrap();

        assert!(store.get_optional("n1", "user.ocis.name").unwrap().is_none());
        assert_eq!(
            store
                .get_string("n1.T.2024-01-01T00:00:00Z", "user.ocis.name")
                .unwrap()
                .as_deref(),
            Some("docs")
        );
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let store = MemoryStore::new();
        store
            .set_many("n1", &[("b", b"1".as_slice()), ("a", b"2".as_slice())])
            .unwrap();
        assert_eq!(store.list("n1").unwrap(), vec!["b", "a"]);

        store.purge("n1").unwrap();
        assert!(store.is_empty());
    }
}
