//! Routing key index
//!
//! Maps each routing key to the set of triggers subscribed to that stream.
//! The index is rebuilt from the registration store at startup.

use hookbridge_core::{RoutingKey, TriggerId};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// In-memory key -> trigger set index
#[derive(Default)]
pub struct RoutingKeyIndex {
    entries: RwLock<HashMap<RoutingKey, BTreeSet<TriggerId>>>,
}

impl RoutingKeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trigger at a key. Returns `true` if it is the first trigger there.
    pub fn insert(&self, key: RoutingKey, trigger_id: TriggerId) -> bool {
        let mut entries = self.entries.write();
        let triggers = entries.entry(key).or_default();
        let first = triggers.is_empty();
        triggers.insert(trigger_id);
        first
    }

    /// Remove a trigger from a key. Returns `true` if no triggers remain there.
    pub fn remove(&self, key: &RoutingKey, trigger_id: &TriggerId) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(triggers) => {
                triggers.remove(trigger_id);
                if triggers.is_empty() {
                    entries.remove(key);
                    true
                } else {
                    false
                }
            }
            None => true,
        }
    }

    /// Triggers subscribed at a key, in a stable order
    pub fn lookup(&self, key: &RoutingKey) -> Vec<TriggerId> {
        self.entries
            .read()
            .get(key)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &RoutingKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Replace the whole index
    pub fn rebuild(&self, subscriptions: impl IntoIterator<Item = (RoutingKey, TriggerId)>) {
        let mut rebuilt: HashMap<RoutingKey, BTreeSet<TriggerId>> = HashMap::new();
        for (key, trigger_id) in subscriptions {
            rebuilt.entry(key).or_default().insert(trigger_id);
        }
        *self.entries.write() = rebuilt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookbridge_core::ProviderId;

    fn key(repo: &str) -> RoutingKey {
        RoutingKey::builder(&ProviderId::new("github"))
            .component("repository")
            .component(repo)
            .events(&["push"])
            .build()
    }

    #[test]
    fn test_insert_and_remove() {
        let index = RoutingKeyIndex::new();
        let k = key("acme/widgets");

        assert!(index.insert(k.clone(), "t1".into()));
        assert!(!index.insert(k.clone(), "t2".into()));
        assert!(!index.insert(k.clone(), "t2".into()));
        assert_eq!(index.lookup(&k), vec![TriggerId::new("t1"), TriggerId::new("t2")]);

        assert!(!index.remove(&k, &"t1".into()));
        assert!(index.remove(&k, &"t2".into()));
        assert!(!index.contains(&k));
        assert!(index.lookup(&k).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_keys_are_independent() {
        let index = RoutingKeyIndex::new();
        index.insert(key("acme/a"), "t1".into());
        index.insert(key("acme/b"), "t2".into());

        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup(&key("acme/a")), vec![TriggerId::new("t1")]);
    }

    #[test]
    fn test_rebuild_replaces_contents() {
        let index = RoutingKeyIndex::new();
        index.insert(key("acme/old"), "t0".into());

        index.rebuild([
            (key("acme/a"), TriggerId::new("t1")),
            (key("acme/a"), TriggerId::new("t2")),
        ]);

        assert!(!index.contains(&key("acme/old")));
        assert_eq!(index.lookup(&key("acme/a")).len(), 2);
    }
}
