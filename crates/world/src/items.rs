use std::collections::BTreeMap;

use crate::types::{EntityId, ItemId, MapId, Position};

/// An item lying on the ground, waiting to be picked up or to decay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedItem {
    pub id: ItemId,
    pub template_id: u32,
    /// Opaque item payload (enchantments, stack count, durability);
    /// byte format owned by gameplay code.
    pub payload: Vec<u8>,
    pub map: MapId,
    pub position: Position,
    /// Loot lock: only this entity may pick the item up until the lock
    /// lapses. `EntityId(0)` means unlocked.
    pub owner: EntityId,
    pub dropped_at_ms: u64,
    pub expires_at_ms: u64,
    pub lock_until_ms: u64,
}

impl DroppedItem {
    pub fn expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    pub fn locked_against(&self, who: EntityId, now_ms: u64) -> bool {
        self.owner != EntityId(0) && self.owner != who && now_ms < self.lock_until_ms
    }
}

#[derive(Debug, Default)]
pub struct ItemRegistry {
    items: BTreeMap<ItemId, DroppedItem>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: DroppedItem) {
        self.items.insert(item.id, item);
    }

    pub fn remove(&mut self, id: ItemId) -> Option<DroppedItem> {
        self.items.remove(&id)
    }

    pub fn get(&self, id: ItemId) -> Option<&DroppedItem> {
        self.items.get(&id)
    }

    pub fn on_map(&self, map: MapId) -> Vec<DroppedItem> {
        self.items.values().filter(|i| i.map == map).cloned().collect()
    }

    /// Remove every expired item. Expiry makes an item *eligible*; actual
    /// removal only ever happens here, never mid-iteration elsewhere.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<DroppedItem> {
        let expired: Vec<ItemId> = self
            .items
            .values()
            .filter(|item| item.expired(now_ms))
            .map(|item| item.id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.items.remove(&id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64, dropped: u64, expires: u64) -> DroppedItem {
        DroppedItem {
            id: ItemId(id),
            template_id: 1,
            payload: Vec::new(),
            map: MapId(1),
            position: Position::new(0, 0),
            owner: EntityId(0),
            dropped_at_ms: dropped,
            expires_at_ms: expires,
            lock_until_ms: dropped,
        }
    }

    #[test]
    fn sweep_removes_only_expired() {
        let mut registry = ItemRegistry::new();
        registry.insert(item(1, 0, 100));
        registry.insert(item(2, 0, 200));
        registry.insert(item(3, 0, 300));

        let swept = registry.sweep(200);
        let ids: Vec<ItemId> = swept.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![ItemId(1), ItemId(2)]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(ItemId(3)).is_some());
    }

    #[test]
    fn expiry_is_eligibility_not_deletion() {
        let mut registry = ItemRegistry::new();
        registry.insert(item(1, 0, 100));

        // Past expiry but not yet swept: still present and removable.
        assert!(registry.get(ItemId(1)).unwrap().expired(150));
        assert!(registry.remove(ItemId(1)).is_some());
    }

    #[test]
    fn loot_lock_honors_owner_and_lapse() {
        let mut locked = item(1, 0, 10_000);
        locked.owner = EntityId(42);
        locked.lock_until_ms = 5_000;

        assert!(locked.locked_against(EntityId(7), 1_000));
        assert!(!locked.locked_against(EntityId(42), 1_000));
        // Lock lapsed.
        assert!(!locked.locked_against(EntityId(7), 5_000));
    }
}
