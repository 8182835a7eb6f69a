use serde::{Deserialize, Serialize};

/// World-resident entity identifier (player or mob).
///
/// Player IDs are assigned by the player directory counting up from 1; the
/// world allocates mob IDs starting at `MOB_ID_BASE` so the two sequences
/// can never collide.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct EntityId(pub u64);

/// First entity ID the world's mob allocator hands out.
pub const MOB_ID_BASE: u64 = 1 << 32;

impl EntityId {
    pub fn is_mob(self) -> bool {
        self.0 >= MOB_ID_BASE
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct MapId(pub u16);

impl std::fmt::Display for MapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ItemId(pub u64);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 2D integer cell coordinate within a map.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance; callers compare against radius².
    pub fn distance_sq(self, other: Position) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        dx * dx + dy * dy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Direction {
    North,
    East,
    #[default]
    South,
    West,
}

/// What kind of entity occupies a cell; filters `query_nearby`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Mob,
}

/// Filter for nearby-entity queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NearbyKind {
    Players,
    Mobs,
    All,
}

impl NearbyKind {
    pub fn matches(self, kind: EntityKind) -> bool {
        match self {
            NearbyKind::Players => kind == EntityKind::Player,
            NearbyKind::Mobs => kind == EntityKind::Mob,
            NearbyKind::All => true,
        }
    }
}
