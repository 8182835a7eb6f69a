use std::collections::{BTreeMap, BTreeSet};

use crate::error::WorldError;
use crate::types::{EntityId, EntityKind, MapId, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellEntry {
    pub map: MapId,
    pub position: Position,
    pub kind: EntityKind,
}

/// Cell-occupancy index: entity → cell plus the reverse occupant sets.
///
/// Both maps mutate inside one critical section per operation, so a reader
/// that holds the index lock never observes an entity in zero or two cells.
#[derive(Debug, Default)]
pub struct CellIndex {
    entries: BTreeMap<EntityId, CellEntry>,
    occupants: BTreeMap<(MapId, Position), BTreeSet<EntityId>>,
}

impl CellIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        entity: EntityId,
        kind: EntityKind,
        map: MapId,
        position: Position,
    ) -> Result<(), WorldError> {
        if self.entries.contains_key(&entity) {
            return Err(WorldError::EntityAlreadyRegistered(entity));
        }
        self.entries.insert(
            entity,
            CellEntry {
                map,
                position,
                kind,
            },
        );
        self.occupants
            .entry((map, position))
            .or_default()
            .insert(entity);
        Ok(())
    }

    pub fn unregister(&mut self, entity: EntityId) -> Result<CellEntry, WorldError> {
        let entry = self
            .entries
            .remove(&entity)
            .ok_or(WorldError::EntityNotFound(entity))?;
        self.detach_occupant(entity, entry.map, entry.position);
        Ok(entry)
    }

    /// Move an entity between cells: remove-then-insert under the caller's
    /// lock. A stale `from` coordinate means the caller's view desynced from
    /// the index; the recorded position wins and the mismatch is logged.
    pub fn move_entity(
        &mut self,
        entity: EntityId,
        map: MapId,
        from: Position,
        to: Position,
    ) -> Result<(), WorldError> {
        let (recorded_map, recorded) = {
            let entry = self
                .entries
                .get(&entity)
                .ok_or(WorldError::EntityNotFound(entity))?;
            (entry.map, entry.position)
        };
        if recorded != from || recorded_map != map {
            tracing::error!(
                entity = %entity,
                expected_x = from.x,
                expected_y = from.y,
                actual_x = recorded.x,
                actual_y = recorded.y,
                "cell index desync on move; using recorded position"
            );
        }
        self.detach_occupant(entity, recorded_map, recorded);
        if let Some(entry) = self.entries.get_mut(&entity) {
            entry.map = map;
            entry.position = to;
        }
        self.occupants.entry((map, to)).or_default().insert(entity);
        Ok(())
    }

    fn detach_occupant(&mut self, entity: EntityId, map: MapId, position: Position) {
        if let Some(set) = self.occupants.get_mut(&(map, position)) {
            set.remove(&entity);
            if set.is_empty() {
                self.occupants.remove(&(map, position));
            }
        }
    }

    pub fn entry(&self, entity: EntityId) -> Option<CellEntry> {
        self.entries.get(&entity).copied()
    }

    pub fn occupants_at(&self, map: MapId, position: Position) -> Vec<EntityId> {
        self.occupants
            .get(&(map, position))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Scan the axis-aligned bounding box of cells within `radius` and filter
    /// by Euclidean distance. O(radius²) cells, fine for gameplay radii.
    pub fn scan_radius(
        &self,
        map: MapId,
        center: Position,
        radius: u32,
        mut keep: impl FnMut(EntityId, &CellEntry) -> bool,
    ) -> Vec<EntityId> {
        let r = radius as i32;
        let min = Position::new(center.x.saturating_sub(r), center.y.saturating_sub(r));
        let max = Position::new(center.x.saturating_add(r), center.y.saturating_add(r));
        let radius_sq = (radius as i64) * (radius as i64);

        let mut result = Vec::new();
        let range = (map, min)..=(map, Position::new(max.x, i32::MAX));
        for (&(_, pos), entities) in self.occupants.range(range) {
            if pos.x < min.x || pos.x > max.x || pos.y < min.y || pos.y > max.y {
                continue;
            }
            if center.distance_sq(pos) > radius_sq {
                continue;
            }
            for &entity in entities {
                let entry = &self.entries[&entity];
                if keep(entity, entry) {
                    result.push(entity);
                }
            }
        }
        result.sort();
        result
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of cells an entity currently occupies. Exists for invariant
    /// checks in tests; always 0 or 1 after any public operation.
    pub fn occupancy_count(&self, entity: EntityId) -> usize {
        self.occupants
            .values()
            .filter(|set| set.contains(&entity))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(n: u64) -> EntityId {
        EntityId(n)
    }

    #[test]
    fn register_then_query() {
        let mut index = CellIndex::new();
        index
            .register(player(1), EntityKind::Player, MapId(1), Position::new(3, 4))
            .unwrap();
        assert_eq!(index.occupants_at(MapId(1), Position::new(3, 4)), vec![player(1)]);
        assert_eq!(index.occupancy_count(player(1)), 1);
    }

    #[test]
    fn double_register_rejected() {
        let mut index = CellIndex::new();
        index
            .register(player(1), EntityKind::Player, MapId(1), Position::new(0, 0))
            .unwrap();
        assert_eq!(
            index.register(player(1), EntityKind::Player, MapId(1), Position::new(1, 1)),
            Err(WorldError::EntityAlreadyRegistered(player(1)))
        );
        assert_eq!(index.occupancy_count(player(1)), 1);
    }

    #[test]
    fn move_is_remove_then_insert() {
        let mut index = CellIndex::new();
        index
            .register(player(1), EntityKind::Player, MapId(1), Position::new(0, 0))
            .unwrap();
        index
            .move_entity(player(1), MapId(1), Position::new(0, 0), Position::new(5, 5))
            .unwrap();

        assert!(index.occupants_at(MapId(1), Position::new(0, 0)).is_empty());
        assert_eq!(index.occupants_at(MapId(1), Position::new(5, 5)), vec![player(1)]);
        assert_eq!(index.occupancy_count(player(1)), 1);
    }

    #[test]
    fn membership_invariant_over_sequences() {
        let mut index = CellIndex::new();
        index
            .register(player(1), EntityKind::Player, MapId(1), Position::new(0, 0))
            .unwrap();
        for step in 0..20 {
            index
                .move_entity(
                    player(1),
                    MapId(1),
                    Position::new(step, 0),
                    Position::new(step + 1, 0),
                )
                .unwrap();
            assert_eq!(index.occupancy_count(player(1)), 1);
        }
        index.unregister(player(1)).unwrap();
        assert_eq!(index.occupancy_count(player(1)), 0);
    }

    #[test]
    fn move_with_stale_from_uses_recorded() {
        let mut index = CellIndex::new();
        index
            .register(player(1), EntityKind::Player, MapId(1), Position::new(2, 2))
            .unwrap();
        // Caller thinks the entity is at (9, 9); the index knows better.
        index
            .move_entity(player(1), MapId(1), Position::new(9, 9), Position::new(3, 3))
            .unwrap();
        assert_eq!(index.occupancy_count(player(1)), 1);
        assert_eq!(index.occupants_at(MapId(1), Position::new(3, 3)), vec![player(1)]);
    }

    #[test]
    fn unregister_unknown_is_not_found() {
        let mut index = CellIndex::new();
        assert_eq!(
            index.unregister(player(9)),
            Err(WorldError::EntityNotFound(player(9)))
        );
    }

    #[test]
    fn scan_radius_filters_by_distance_and_kind() {
        let mut index = CellIndex::new();
        index
            .register(player(1), EntityKind::Player, MapId(1), Position::new(5, 5))
            .unwrap();
        index
            .register(player(2), EntityKind::Mob, MapId(1), Position::new(6, 5))
            .unwrap();
        // Corner of the AABB but outside the circle: distance √18 > 3.
        index
            .register(player(3), EntityKind::Player, MapId(1), Position::new(8, 8))
            .unwrap();
        // Different map entirely.
        index
            .register(player(4), EntityKind::Player, MapId(2), Position::new(5, 5))
            .unwrap();

        let all = index.scan_radius(MapId(1), Position::new(5, 5), 3, |_, _| true);
        assert_eq!(all, vec![player(1), player(2)]);

        let players_only = index.scan_radius(MapId(1), Position::new(5, 5), 3, |_, e| {
            e.kind == EntityKind::Player
        });
        assert_eq!(players_only, vec![player(1)]);
    }
}
