use net::channels::OFFLINE_SESSION;
use net::SessionId;
use persistence::CharacterSnapshot;
use world::{EntityId, MapId, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PlayerId(pub u64);

impl PlayerId {
    /// The matching world entity: player IDs double as entity IDs (the
    /// world's mob allocator starts far above the player range).
    pub fn entity(self) -> EntityId {
        EntityId(self.0)
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuildId(pub u32);

impl std::fmt::Display for GuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// In-flight trade negotiation. Transient: reset on every load, never
/// persisted mid-transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeState {
    pub partner: Option<PlayerId>,
    pub offered_items: Vec<u64>,
    pub accepted: bool,
    pub started_at_ms: u64,
}

impl TradeState {
    pub fn active(&self) -> bool {
        self.partner.is_some()
    }
}

/// Canonical in-memory player record. Queries hand out clones; the record
/// itself only mutates under the directory's table lock.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub account_id: u64,
    pub account_name: String,
    pub name: String,
    pub session: SessionId,
    pub online: bool,
    pub map: MapId,
    pub position: Position,
    pub party_leader: Option<PlayerId>,
    pub guild: Option<GuildId>,
    pub trade: TradeState,
    pub created_at_ms: u64,
    pub last_activity_ms: u64,
    pub save_count: u64,
    /// Opaque character payload (stats, inventory, equipment). Owned
    /// exclusively by this record; round-trips byte-exact through the store.
    pub character: Vec<u8>,
}

impl Player {
    pub fn snapshot(&self) -> CharacterSnapshot {
        CharacterSnapshot {
            name: self.name.clone(),
            map: self.map.0,
            x: self.position.x,
            y: self.position.y,
            data: self.character.clone(),
        }
    }

    pub fn go_offline(&mut self) -> SessionId {
        let old = self.session;
        self.online = false;
        self.session = OFFLINE_SESSION;
        old
    }
}
