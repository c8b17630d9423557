use crate::source::TopologySource;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

type Entries = HashMap<String, HashMap<String, String>>;

/// Enrichment values keyed by instance and object name, filled lazily from a
/// [`TopologySource`]. Entries live until explicitly invalidated; misses are
/// not remembered so an object bound later is picked up on the next cycle.
pub struct LookupCache {
    source: Arc<dyn TopologySource>,
    entries: Mutex<Entries>,
}

impl LookupCache {
    pub fn new(source: Arc<dyn TopologySource>) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, instance: &str, name: &str) -> Option<String> {
        self.entries().get(instance).and_then(|names| names.get(name)).cloned()
    }

    /// Cached value, or a query to the mapping source on a miss. The lock is
    /// never held across the query.
    pub async fn resolve(&self, instance: &str, name: &str) -> Option<String> {
        if let Some(value) = self.get(instance, name) {
            return Some(value);
        }

        let value = self.source.lookup(instance, name).await;
        match &value {
            Some(value) => {
                trace!(instance, object = name, %value, "lookup cache populated");
                self.entries()
                    .entry(instance.to_string())
                    .or_default()
                    .insert(name.to_string(), value.clone());
            }
            None => trace!(instance, object = name, "lookup source has no entry"),
        }
        value
    }

    pub fn invalidate(&self, instance: &str) {
        self.entries().remove(instance);
    }

    pub fn len(&self) -> usize {
        self.entries().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
