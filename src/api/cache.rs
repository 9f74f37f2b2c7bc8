use serde_json::Value;
use std::collections::HashMap;

/// Documents fetched during one sync run, keyed by resource path.
///
/// Owned by the [`ApiClient`](super::ApiClient) so a new run starts empty.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: HashMap<String, Value>,
    hits: u64,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a document, counting the hit
    pub fn get(&mut self, key: &str) -> Option<&Value> {
        let found = self.entries.get(key);
        if found.is_some() {
            self.hits += 1;
        }
        found
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of lookups served without a network call
    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
    }
}
