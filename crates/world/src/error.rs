use crate::types::{EntityId, ItemId, MapId};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("map {0} not loaded")]
    MapNotFound(MapId),

    #[error("position ({x}, {y}) invalid on map {map}")]
    InvalidPosition { map: MapId, x: i32, y: i32 },

    #[error("entity {0} not registered")]
    EntityNotFound(EntityId),

    #[error("entity {0} already registered")]
    EntityAlreadyRegistered(EntityId),

    #[error("dropped item {0} not found")]
    ItemNotFound(ItemId),

    #[error("dropped item {item} loot-locked for entity {owner}")]
    LootLocked { item: ItemId, owner: EntityId },

    #[error("map data invalid: {0}")]
    MapParse(String),
}
