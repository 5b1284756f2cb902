use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

/// Session-wide variable store shared by the decoder and every running script
///
/// Clones share the same map. Each `set` is atomic with respect to any `get`;
/// there is no multi-key atomicity.
#[derive(Debug, Clone, Default)]
pub struct GlobalVariables(Arc<RwLock<HashMap<String, String>>>);

impl GlobalVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let map = self.0.read().unwrap_or_else(PoisonError::into_inner);
        map.get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut map = self.0.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(key.into(), value.into());
    }

    pub fn exists(&self, key: &str) -> bool {
        let map = self.0.read().unwrap_or_else(PoisonError::into_inner);
        map.contains_key(key)
    }

    /// Copy of every variable, sorted by key
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let map = self.0.read().unwrap_or_else(PoisonError::into_inner);
        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
