use std::collections::{BTreeMap, BTreeSet};

use crate::player::PlayerId;

/// One-to-one secondary index (name, session). At most one player per key.
#[derive(Debug, Default)]
pub struct UniqueIndex<K: Ord> {
    map: BTreeMap<K, PlayerId>,
}

impl<K: Ord + Clone> UniqueIndex<K> {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// Bind a key; fails with the current holder when the key is taken by
    /// someone else. Rebinding a player's own key is a no-op.
    pub fn insert(&mut self, key: K, id: PlayerId) -> Result<(), PlayerId> {
        match self.map.get(&key) {
            Some(&existing) if existing != id => Err(existing),
            _ => {
                self.map.insert(key, id);
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<PlayerId> {
        self.map.remove(key)
    }

    pub fn get(&self, key: &K) -> Option<PlayerId> {
        self.map.get(key).copied()
    }

    /// The shared remove-from-old/insert-into-new step behind every key
    /// change. `old == new` short-circuits without touching the map.
    pub fn reassign(
        &mut self,
        old: Option<&K>,
        new: Option<K>,
        id: PlayerId,
    ) -> Result<(), PlayerId> {
        if old == new.as_ref() {
            return Ok(());
        }
        if let Some(new_key) = &new {
            if let Some(&existing) = self.map.get(new_key) {
                if existing != id {
                    return Err(existing);
                }
            }
        }
        if let Some(old_key) = old {
            self.map.remove(old_key);
        }
        if let Some(new_key) = new {
            self.map.insert(new_key, id);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// One-to-many secondary index (cell, party, guild). Empty reverse sets are
/// deleted outright, never left dangling.
#[derive(Debug, Default)]
pub struct MultiIndex<K: Ord> {
    map: BTreeMap<K, BTreeSet<PlayerId>>,
}

impl<K: Ord + Clone> MultiIndex<K> {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: K, id: PlayerId) {
        self.map.entry(key).or_default().insert(id);
    }

    pub fn remove(&mut self, key: &K, id: PlayerId) {
        if let Some(set) = self.map.get_mut(key) {
            set.remove(&id);
            if set.is_empty() {
                self.map.remove(key);
            }
        }
    }

    /// `old == new` short-circuits; otherwise remove-from-old then
    /// insert-into-new inside one call.
    pub fn reassign(&mut self, old: Option<&K>, new: Option<K>, id: PlayerId) {
        if old == new.as_ref() {
            return;
        }
        if let Some(old_key) = old {
            self.remove(old_key, id);
        }
        if let Some(new_key) = new {
            self.insert(new_key, id);
        }
    }

    pub fn get(&self, key: &K) -> Vec<PlayerId> {
        self.map
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &BTreeSet<PlayerId>)> {
        self.map.iter()
    }

    pub fn key_count(&self) -> usize {
        self.map.len()
    }
}
