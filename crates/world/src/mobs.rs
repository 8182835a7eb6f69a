use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Direction, EntityId, MapId, Position};

/// Per-template defaults applied when a mob is created. Templates without a
/// registered profile fall back to `MobProfile::default()`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MobProfile {
    pub max_hp: i32,
    /// Stationary blockers (gate keepers, barricade NPCs) make their cell an
    /// invalid movement destination.
    pub blocks_movement: bool,
}

impl Default for MobProfile {
    fn default() -> Self {
        Self {
            max_hp: 100,
            blocks_movement: false,
        }
    }
}

/// A live, ephemeral mob. Never persisted; the respawn scheduler recreates
/// the population from spawn points.
#[derive(Debug, Clone)]
pub struct Mob {
    pub id: EntityId,
    pub template_id: u32,
    pub map: MapId,
    pub position: Position,
    pub direction: Direction,
    pub hp: i32,
    pub max_hp: i32,
    pub blocks_movement: bool,
}

/// Hook invoked for every live mob at the start of a world tick. The default
/// implementation does nothing; gameplay installs its own.
pub trait MobBehavior: Send {
    fn update(&mut self, mob: &mut Mob, delta_ms: u64);
}

pub struct IdleBehavior;

impl MobBehavior for IdleBehavior {
    fn update(&mut self, _mob: &mut Mob, _delta_ms: u64) {}
}

#[derive(Debug, Default)]
pub struct MobRegistry {
    mobs: BTreeMap<EntityId, Mob>,
}

impl MobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mob: Mob) {
        self.mobs.insert(mob.id, mob);
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Mob> {
        self.mobs.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Mob> {
        self.mobs.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Mob> {
        self.mobs.get_mut(&id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Mob> {
        self.mobs.values_mut()
    }

    pub fn on_map(&self, map: MapId) -> Vec<Mob> {
        self.mobs.values().filter(|m| m.map == map).cloned().collect()
    }

    pub fn count_matching(&self, map: MapId, template_id: u32) -> usize {
        self.mobs
            .values()
            .filter(|m| m.map == map && m.template_id == template_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.mobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mobs.is_empty()
    }
}

/// Static respawn descriptor plus its scheduling state.
#[derive(Debug, Clone)]
pub struct SpawnPoint {
    pub map: MapId,
    pub position: Position,
    pub template_id: u32,
    pub target_count: u32,
    pub respawn_secs: u64,
    pub last_spawn_ms: u64,
}

impl SpawnPoint {
    pub fn due(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_spawn_ms) >= self.respawn_secs * 1000
    }
}

/// Deterministic scatter pattern used when creating several mobs around one
/// origin: the origin itself, then a spiral over the surrounding rings.
pub const SCATTER_OFFSETS: [(i32, i32); 25] = [
    (0, 0),
    (1, 0),
    (0, 1),
    (-1, 0),
    (0, -1),
    (1, 1),
    (-1, 1),
    (-1, -1),
    (1, -1),
    (2, 0),
    (0, 2),
    (-2, 0),
    (0, -2),
    (2, 1),
    (1, 2),
    (-1, 2),
    (-2, 1),
    (-2, -1),
    (-1, -2),
    (1, -2),
    (2, -1),
    (2, 2),
    (-2, 2),
    (-2, -2),
    (2, -2),
];

pub fn scatter_position(origin: Position, index: usize) -> Position {
    let (dx, dy) = SCATTER_OFFSETS[index % SCATTER_OFFSETS.len()];
    Position::new(origin.x + dx, origin.y + dy)
}
