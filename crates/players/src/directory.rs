use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use net::channels::OFFLINE_SESSION;
use net::SessionId;
use persistence::{CharacterSnapshot, PlayerStore};
use world::{EntityKind, MapId, Position, SpatialWorld};

use crate::error::DirectoryError;
use crate::events::{ErrorEvent, EventHub, PlayerEvent, SubscriptionId};
use crate::index::{MultiIndex, UniqueIndex};
use crate::player::{GuildId, Player, PlayerId, TradeState};

/// A pending trade offer lapses after this long without acceptance.
const TRADE_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub max_players: usize,
    /// Online players idle longer than this get disconnected by the sweep.
    pub inactivity_ms: u64,
    /// Fallback placement when a snapshot's position is no longer valid.
    pub spawn_map: MapId,
    pub spawn_position: Position,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            max_players: 1000,
            inactivity_ms: 600_000,
            spawn_map: MapId(1),
            spawn_position: Position::new(0, 0),
        }
    }
}

/// Canonical player table plus five secondary indices (name, session, cell,
/// party, guild), each behind its own lock.
///
/// Locking discipline: locks are held one at a time and never across store
/// I/O, world calls, or event dispatch. Every index change goes through the
/// shared `reassign` step of `UniqueIndex`/`MultiIndex`, so the
/// remove-old/insert-new sequence exists exactly once.
pub struct PlayerDirectory {
    config: DirectoryConfig,
    world: Arc<SpatialWorld>,
    store: Arc<dyn PlayerStore>,
    table: Mutex<BTreeMap<PlayerId, Player>>,
    next_id: AtomicU64,
    by_name: Mutex<UniqueIndex<String>>,
    by_session: Mutex<UniqueIndex<SessionId>>,
    by_cell: Mutex<MultiIndex<(MapId, Position)>>,
    by_party: Mutex<MultiIndex<PlayerId>>,
    by_guild: Mutex<MultiIndex<GuildId>>,
    events: EventHub,
}

fn wall_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl PlayerDirectory {
    pub fn new(
        config: DirectoryConfig,
        world: Arc<SpatialWorld>,
        store: Arc<dyn PlayerStore>,
    ) -> Self {
        Self {
            config,
            world,
            store,
            table: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            by_name: Mutex::new(UniqueIndex::new()),
            by_session: Mutex::new(UniqueIndex::new()),
            by_cell: Mutex::new(MultiIndex::new()),
            by_party: Mutex::new(MultiIndex::new()),
            by_guild: Mutex::new(MultiIndex::new()),
            events: EventHub::new(),
        }
    }

    // --- lifecycle ---

    /// Create a brand-new character and bring it online.
    pub fn create_player(
        &self,
        snapshot: CharacterSnapshot,
        account_id: u64,
        account_name: &str,
        session: SessionId,
    ) -> Result<PlayerId, DirectoryError> {
        let name = snapshot.name.clone();
        let id = self.admit(snapshot, account_id, account_name, session)?;
        tracing::info!(player = %id, %name, session = %session, "player created");
        self.events.emit(PlayerEvent::Created { player: id, name });
        if session != OFFLINE_SESSION {
            self.events.emit(PlayerEvent::Connected {
                player: id,
                session,
            });
        }
        self.events.dispatch();
        Ok(id)
    }

    /// Load an existing character, or reattach to a resident one.
    ///
    /// Last login wins: a resident player online under a different session is
    /// disconnected (and saved) first; only after that save completes does
    /// the new session take ownership. A resident offline player reconnects
    /// without touching the store.
    pub fn load_player(
        &self,
        name: &str,
        account_id: u64,
        account_name: &str,
        session: SessionId,
    ) -> Result<PlayerId, DirectoryError> {
        let resident = self
            .by_name
            .lock()
            .expect("name index poisoned")
            .get(&name.to_string());

        if let Some(id) = resident {
            let (online, old_session) = {
                let table = self.table.lock().expect("player table poisoned");
                let player = table.get(&id).ok_or(DirectoryError::NotFound(id))?;
                (player.online, player.session)
            };

            if online && old_session == session {
                return Ok(id);
            }
            if online {
                tracing::warn!(
                    player = %id,
                    name,
                    old_session = %old_session,
                    new_session = %session,
                    "session displaced by newer login"
                );
                self.events.emit(PlayerEvent::ForcedDisconnect {
                    player: id,
                    old_session,
                    new_session: session,
                });
                self.disconnect(id, true)?;
            }

            {
                let mut table = self.table.lock().expect("player table poisoned");
                if let Some(player) = table.get_mut(&id) {
                    player.account_id = account_id;
                    player.account_name = account_name.to_string();
                    player.trade = TradeState::default();
                }
            }
            self.connect(id, session)?;
            tracing::info!(player = %id, name, session = %session, "resident player reattached");
            return Ok(id);
        }

        // Not resident: read the snapshot from the store. No lock is held
        // across the I/O.
        let snapshot = match self.store.load(name) {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_not_found() => {
                return Err(DirectoryError::UnknownCharacter(name.to_string()))
            }
            Err(e) => {
                tracing::error!(name, error = %e, "character load failed");
                self.emit_error(None, "load_player", &e.to_string());
                return Err(e.into());
            }
        };
        if snapshot.name != name {
            return Err(DirectoryError::InvalidOperation(format!(
                "snapshot name '{}' does not match requested '{}'",
                snapshot.name, name
            )));
        }

        let id = self.admit(snapshot, account_id, account_name, session)?;
        tracing::info!(player = %id, name, session = %session, "player loaded");
        if session != OFFLINE_SESSION {
            self.events.emit(PlayerEvent::Connected {
                player: id,
                session,
            });
        }
        self.events.dispatch();
        Ok(id)
    }

    /// Shared admission path for create and load: reserve the name, place
    /// the entity in the world, bind the session, insert the record.
    /// Each step rolls the earlier ones back on failure.
    fn admit(
        &self,
        snapshot: CharacterSnapshot,
        account_id: u64,
        account_name: &str,
        session: SessionId,
    ) -> Result<PlayerId, DirectoryError> {
        let name = snapshot.name.clone();
        let id = PlayerId(self.next_id.fetch_add(1, Ordering::Relaxed));

        {
            let mut by_name = self.by_name.lock().expect("name index poisoned");
            if by_name.get(&name).is_some() {
                return Err(DirectoryError::NameTaken(name));
            }
            by_name
                .insert(name.clone(), id)
                .map_err(|_| DirectoryError::NameTaken(name.clone()))?;
        }

        let mut map = MapId(snapshot.map);
        let mut position = Position::new(snapshot.x, snapshot.y);
        if !self.world.is_valid_position(map, position.x, position.y) {
            map = self.config.spawn_map;
            position = self.config.spawn_position;
        }
        if let Err(e) =
            self.world
                .register_entity(id.entity(), EntityKind::Player, map, position.x, position.y)
        {
            self.by_name.lock().expect("name index poisoned").remove(&name);
            return Err(e.into());
        }

        let online = session != OFFLINE_SESSION;
        if online {
            let mut by_session = self.by_session.lock().expect("session index poisoned");
            if let Err(holder) = by_session.insert(session, id) {
                drop(by_session);
                self.rollback_admission(id, &name);
                return Err(DirectoryError::SessionBound {
                    session,
                    player: holder,
                });
            }
        }

        let now = wall_ms();
        let record = Player {
            id,
            account_id,
            account_name: account_name.to_string(),
            name: name.clone(),
            session: if online { session } else { OFFLINE_SESSION },
            online,
            map,
            position,
            party_leader: None,
            guild: None,
            trade: TradeState::default(),
            created_at_ms: now,
            last_activity_ms: now,
            save_count: 0,
            character: snapshot.data,
        };

        {
            let mut table = self.table.lock().expect("player table poisoned");
            if table.len() >= self.config.max_players {
                drop(table);
                self.rollback_admission(id, &name);
                if online {
                    self.by_session
                        .lock()
                        .expect("session index poisoned")
                        .remove(&session);
                }
                return Err(DirectoryError::CapacityExceeded(self.config.max_players));
            }
            table.insert(id, record);
        }

        self.by_cell
            .lock()
            .expect("cell index poisoned")
            .insert((map, position), id);
        Ok(id)
    }

    fn rollback_admission(&self, id: PlayerId, name: &str) {
        self.by_name
            .lock()
            .expect("name index poisoned")
            .remove(&name.to_string());
        if let Err(e) = self.world.unregister_entity(id.entity()) {
            tracing::error!(player = %id, error = %e, "rollback could not unregister entity");
        }
    }

    /// Persist one player. The snapshot is cloned under the table lock; the
    /// store write happens outside it so save I/O never blocks reads.
    pub fn save_player(&self, id: PlayerId) -> Result<(), DirectoryError> {
        let (name, snapshot) = {
            let table = self.table.lock().expect("player table poisoned");
            let player = table.get(&id).ok_or(DirectoryError::NotFound(id))?;
            (player.name.clone(), player.snapshot())
        };

        if let Err(e) = self.store.save(&name, &snapshot) {
            tracing::error!(player = %id, %name, error = %e, "character save failed");
            self.emit_error(Some(id), "save_player", &e.to_string());
            return Err(e.into());
        }

        let save_count = {
            let mut table = self.table.lock().expect("player table poisoned");
            match table.get_mut(&id) {
                Some(player) => {
                    player.save_count += 1;
                    player.save_count
                }
                None => 0,
            }
        };
        self.events.emit(PlayerEvent::Saved {
            player: id,
            save_count,
        });
        self.events.dispatch();
        Ok(())
    }

    /// Save every resident player. The ID list is snapshotted under the
    /// lock, then each save runs without it; saves are eventually-consistent
    /// with respect to concurrent mutation.
    pub fn save_all_players(&self) -> usize {
        let ids: Vec<PlayerId> = {
            let table = self.table.lock().expect("player table poisoned");
            table.keys().copied().collect()
        };
        let mut saved = 0;
        for id in ids {
            if self.save_player(id).is_ok() {
                saved += 1;
            }
        }
        if saved > 0 {
            tracing::info!(saved, "player save pass complete");
        }
        saved
    }

    /// Remove a player entirely. With `save_first`, a failed save aborts the
    /// removal so in-memory state is never silently dropped.
    pub fn remove_player(&self, id: PlayerId, save_first: bool) -> Result<(), DirectoryError> {
        if save_first {
            self.save_player(id)?;
        }

        let record = {
            let mut table = self.table.lock().expect("player table poisoned");
            table.remove(&id).ok_or(DirectoryError::NotFound(id))?
        };

        self.by_name
            .lock()
            .expect("name index poisoned")
            .remove(&record.name);
        if record.online {
            self.by_session
                .lock()
                .expect("session index poisoned")
                .remove(&record.session);
        }
        self.by_cell
            .lock()
            .expect("cell index poisoned")
            .remove(&(record.map, record.position), id);
        if let Some(leader) = record.party_leader {
            self.by_party
                .lock()
                .expect("party index poisoned")
                .remove(&leader, id);
        }
        if let Some(guild) = record.guild {
            self.by_guild
                .lock()
                .expect("guild index poisoned")
                .remove(&guild, id);
        }
        if let Err(e) = self.world.unregister_entity(id.entity()) {
            tracing::error!(player = %id, error = %e, "entity missing from world on removal");
        }

        tracing::info!(player = %id, name = %record.name, "player removed");
        self.events.emit(PlayerEvent::Destroyed { player: id });
        self.events.dispatch();
        Ok(())
    }

    // --- session state ---

    pub fn connect(&self, id: PlayerId, session: SessionId) -> Result<(), DirectoryError> {
        let old = {
            let table = self.table.lock().expect("player table poisoned");
            let player = table.get(&id).ok_or(DirectoryError::NotFound(id))?;
            if player.online && player.session == session {
                return Ok(());
            }
            player.online.then_some(player.session)
        };

        self.by_session
            .lock()
            .expect("session index poisoned")
            .reassign(old.as_ref(), Some(session), id)
            .map_err(|holder| DirectoryError::SessionBound {
                session,
                player: holder,
            })?;

        {
            let mut table = self.table.lock().expect("player table poisoned");
            if let Some(player) = table.get_mut(&id) {
                player.online = true;
                player.session = session;
                player.last_activity_ms = wall_ms();
            }
        }
        self.events.emit(PlayerEvent::Connected {
            player: id,
            session,
        });
        self.events.dispatch();
        Ok(())
    }

    /// Take a player offline. Disconnecting an already-offline player is a
    /// successful no-op and fires no duplicate event.
    pub fn disconnect(&self, id: PlayerId, save_first: bool) -> Result<(), DirectoryError> {
        {
            let table = self.table.lock().expect("player table poisoned");
            let player = table.get(&id).ok_or(DirectoryError::NotFound(id))?;
            if !player.online {
                return Ok(());
            }
        }

        if save_first {
            // save_player already logged any failure; the record stays
            // resident so nothing is lost, and the player still goes offline.
            let _ = self.save_player(id);
        }

        let old = {
            let mut table = self.table.lock().expect("player table poisoned");
            match table.get_mut(&id) {
                Some(player) if player.online => player.go_offline(),
                Some(_) => return Ok(()),
                None => return Err(DirectoryError::NotFound(id)),
            }
        };
        self.by_session
            .lock()
            .expect("session index poisoned")
            .remove(&old);

        tracing::info!(player = %id, session = %old, "player disconnected");
        self.events.emit(PlayerEvent::Disconnected { player: id });
        self.events.dispatch();
        Ok(())
    }

    // --- attribute updates ---

    /// Move a player to a new cell; canonical record, cell index and world
    /// registry all follow. `old == new` short-circuits.
    pub fn update_position(&self, id: PlayerId, x: i32, y: i32) -> Result<(), DirectoryError> {
        let new_position = Position::new(x, y);
        let (map, old_position) = {
            let table = self.table.lock().expect("player table poisoned");
            let player = table.get(&id).ok_or(DirectoryError::NotFound(id))?;
            (player.map, player.position)
        };
        if old_position == new_position {
            return Ok(());
        }

        self.world
            .move_entity(id.entity(), map, old_position.x, old_position.y, x, y)?;

        {
            let mut table = self.table.lock().expect("player table poisoned");
            if let Some(player) = table.get_mut(&id) {
                player.position = new_position;
                player.last_activity_ms = wall_ms();
            }
        }
        self.by_cell.lock().expect("cell index poisoned").reassign(
            Some(&(map, old_position)),
            Some((map, new_position)),
            id,
        );
        Ok(())
    }

    pub fn set_party(&self, id: PlayerId, leader: Option<PlayerId>) -> Result<(), DirectoryError> {
        let old = {
            let mut table = self.table.lock().expect("player table poisoned");
            let player = table.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
            if player.party_leader == leader {
                return Ok(());
            }
            std::mem::replace(&mut player.party_leader, leader)
        };
        self.by_party
            .lock()
            .expect("party index poisoned")
            .reassign(old.as_ref(), leader, id);
        Ok(())
    }

    pub fn set_guild(&self, id: PlayerId, guild: Option<GuildId>) -> Result<(), DirectoryError> {
        let old = {
            let mut table = self.table.lock().expect("player table poisoned");
            let player = table.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
            if player.guild == guild {
                return Ok(());
            }
            std::mem::replace(&mut player.guild, guild)
        };
        self.by_guild
            .lock()
            .expect("guild index poisoned")
            .reassign(old.as_ref(), guild, id);
        Ok(())
    }

    pub fn note_activity(&self, id: PlayerId) -> Result<(), DirectoryError> {
        let mut table = self.table.lock().expect("player table poisoned");
        let player = table.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
        player.last_activity_ms = wall_ms();
        Ok(())
    }

    // --- trade (transient, reset on load) ---

    pub fn begin_trade(
        &self,
        id: PlayerId,
        partner: PlayerId,
        now_ms: u64,
    ) -> Result<(), DirectoryError> {
        let mut table = self.table.lock().expect("player table poisoned");
        if !table.contains_key(&partner) {
            return Err(DirectoryError::NotFound(partner));
        }
        let player = table.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
        if player.trade.active() {
            return Err(DirectoryError::InvalidOperation(
                "trade already in progress".to_string(),
            ));
        }
        player.trade = TradeState {
            partner: Some(partner),
            offered_items: Vec::new(),
            accepted: false,
            started_at_ms: now_ms,
        };
        Ok(())
    }

    pub fn cancel_trade(&self, id: PlayerId) -> Result<(), DirectoryError> {
        let mut table = self.table.lock().expect("player table poisoned");
        let player = table.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
        player.trade = TradeState::default();
        Ok(())
    }

    /// Per-tick player upkeep, driven by the simulation loop for every
    /// connected player. Currently expires stale trade offers.
    pub fn tick_player(&self, id: PlayerId, now_ms: u64) -> Result<(), DirectoryError> {
        let mut table = self.table.lock().expect("player table poisoned");
        let player = table.get_mut(&id).ok_or(DirectoryError::NotFound(id))?;
        if player.trade.active()
            && now_ms.saturating_sub(player.trade.started_at_ms) >= TRADE_TIMEOUT_MS
        {
            tracing::debug!(player = %id, "trade offer timed out");
            player.trade = TradeState::default();
        }
        Ok(())
    }

    // --- maintenance ---

    /// Disconnect (with save) players idle past the inactivity threshold.
    /// Victims are collected first so the table lock is not held across the
    /// per-player disconnect work.
    pub fn check_inactivity(&self, now_ms: u64) -> usize {
        let victims: Vec<PlayerId> = {
            let table = self.table.lock().expect("player table poisoned");
            table
                .values()
                .filter(|p| {
                    p.online
                        && now_ms.saturating_sub(p.last_activity_ms) >= self.config.inactivity_ms
                })
                .map(|p| p.id)
                .collect()
        };

        let mut disconnected = 0;
        for id in victims {
            tracing::info!(player = %id, "disconnecting inactive player");
            if self.disconnect(id, true).is_ok() {
                disconnected += 1;
            }
        }
        disconnected
    }

    // --- queries (handles are clones; snapshot semantics are the caller's) ---

    pub fn player(&self, id: PlayerId) -> Option<Player> {
        self.table
            .lock()
            .expect("player table poisoned")
            .get(&id)
            .cloned()
    }

    pub fn player_by_session(&self, session: SessionId) -> Option<Player> {
        let id = self
            .by_session
            .lock()
            .expect("session index poisoned")
            .get(&session)?;
        self.player(id)
    }

    pub fn player_by_name(&self, name: &str) -> Option<Player> {
        let id = self
            .by_name
            .lock()
            .expect("name index poisoned")
            .get(&name.to_string())?;
        self.player(id)
    }

    pub fn players_in_area(
        &self,
        map: MapId,
        min: Position,
        max: Position,
    ) -> Vec<PlayerId> {
        let by_cell = self.by_cell.lock().expect("cell index poisoned");
        let mut result: Vec<PlayerId> = by_cell
            .iter()
            .filter(|((cell_map, pos), _)| {
                *cell_map == map
                    && pos.x >= min.x
                    && pos.x <= max.x
                    && pos.y >= min.y
                    && pos.y <= max.y
            })
            .flat_map(|(_, members)| members.iter().copied())
            .collect();
        result.sort();
        result
    }

    pub fn players_in_radius(&self, map: MapId, center: Position, radius: u32) -> Vec<PlayerId> {
        let radius_sq = (radius as i64) * (radius as i64);
        let by_cell = self.by_cell.lock().expect("cell index poisoned");
        let mut result: Vec<PlayerId> = by_cell
            .iter()
            .filter(|((cell_map, pos), _)| {
                *cell_map == map && center.distance_sq(*pos) <= radius_sq
            })
            .flat_map(|(_, members)| members.iter().copied())
            .collect();
        result.sort();
        result
    }

    pub fn players_in_party(&self, leader: PlayerId) -> Vec<PlayerId> {
        self.by_party
            .lock()
            .expect("party index poisoned")
            .get(&leader)
    }

    pub fn players_in_guild(&self, guild: GuildId) -> Vec<PlayerId> {
        self.by_guild
            .lock()
            .expect("guild index poisoned")
            .get(&guild)
    }

    pub fn all_players(&self) -> Vec<PlayerId> {
        self.table
            .lock()
            .expect("player table poisoned")
            .keys()
            .copied()
            .collect()
    }

    pub fn online_players(&self) -> Vec<PlayerId> {
        self.table
            .lock()
            .expect("player table poisoned")
            .values()
            .filter(|p| p.online)
            .map(|p| p.id)
            .collect()
    }

    pub fn player_count(&self) -> usize {
        self.table.lock().expect("player table poisoned").len()
    }

    pub fn online_count(&self) -> usize {
        self.table
            .lock()
            .expect("player table poisoned")
            .values()
            .filter(|p| p.online)
            .count()
    }

    // --- events ---

    pub fn register_event_callback(
        &self,
        callback: impl Fn(&PlayerEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(Arc::new(callback))
    }

    pub fn register_error_callback(
        &self,
        callback: impl Fn(&ErrorEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.events.subscribe_errors(Arc::new(callback))
    }

    pub fn unregister_callback(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn emit_error(&self, player: Option<PlayerId>, operation: &'static str, message: &str) {
        self.events.emit_error(ErrorEvent {
            player,
            operation,
            message: message.to_string(),
        });
        self.events.dispatch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::{MemoryStore, StoreError};
    use std::sync::atomic::AtomicUsize;
    use world::WorldConfig;

    const TEST_MAP: &str = "10 10\n..........\n..........\n..........\n..........\n..........\n..........\n..........\n..........\n..........\n..........";

    fn test_world() -> Arc<SpatialWorld> {
        let world = Arc::new(SpatialWorld::new(WorldConfig::default()));
        world.load_map(MapId(1), TEST_MAP).unwrap();
        world
    }

    fn directory_with(max_players: usize) -> (Arc<SpatialWorld>, Arc<MemoryStore>, PlayerDirectory) {
        let world = test_world();
        let store = Arc::new(MemoryStore::new());
        let directory = PlayerDirectory::new(
            DirectoryConfig {
                max_players,
                spawn_map: MapId(1),
                spawn_position: Position::new(5, 5),
                ..Default::default()
            },
            Arc::clone(&world),
            Arc::clone(&store) as Arc<dyn PlayerStore>,
        );
        (world, store, directory)
    }

    fn snapshot(name: &str) -> CharacterSnapshot {
        CharacterSnapshot {
            name: name.to_string(),
            map: 1,
            x: 2,
            y: 2,
            data: vec![0xAB, 0xCD, 0xEF],
        }
    }

    fn assert_consistent(directory: &PlayerDirectory) {
        let table_len = directory.table.lock().unwrap().len();
        let name_len = directory.by_name.lock().unwrap().len();
        assert_eq!(table_len, name_len, "name index desynced from table");
    }

    #[test]
    fn create_and_look_up() {
        let (_, _, directory) = directory_with(10);
        let id = directory
            .create_player(snapshot("Hero"), 1, "acct1", SessionId(10))
            .unwrap();

        assert_eq!(directory.player_by_name("Hero").unwrap().id, id);
        assert_eq!(directory.player_by_session(SessionId(10)).unwrap().id, id);
        assert_eq!(directory.online_players(), vec![id]);
        assert_consistent(&directory);
    }

    #[test]
    fn duplicate_name_is_conflict() {
        let (_, _, directory) = directory_with(10);
        directory
            .create_player(snapshot("Hero"), 1, "acct1", SessionId(10))
            .unwrap();
        let err = directory
            .create_player(snapshot("Hero"), 2, "acct2", SessionId(11))
            .unwrap_err();
        assert!(matches!(err, DirectoryError::NameTaken(_)));
        assert!(err.is_conflict());
        assert_eq!(directory.player_count(), 1);
        assert_consistent(&directory);
    }

    #[test]
    fn capacity_conflict_leaves_counts_unchanged() {
        let (world, _, directory) = directory_with(1);
        directory
            .create_player(snapshot("Hero"), 1, "acct1", SessionId(10))
            .unwrap();

        let err = directory
            .create_player(snapshot("Other"), 2, "acct2", SessionId(11))
            .unwrap_err();
        assert!(matches!(err, DirectoryError::CapacityExceeded(1)));
        assert_eq!(directory.player_count(), 1);
        assert_eq!(world.entity_count(), 1);
        assert_consistent(&directory);
    }

    #[test]
    fn create_places_entity_in_world() {
        let (world, _, directory) = directory_with(10);
        let id = directory
            .create_player(snapshot("Hero"), 1, "acct1", SessionId(10))
            .unwrap();
        assert_eq!(
            world.entity_position(id.entity()),
            Some((MapId(1), Position::new(2, 2)))
        );
    }

    #[test]
    fn invalid_snapshot_position_falls_back_to_spawn() {
        let (world, _, directory) = directory_with(10);
        let mut snap = snapshot("Hero");
        snap.x = 500;
        snap.y = 500;
        let id = directory
            .create_player(snap, 1, "acct1", SessionId(10))
            .unwrap();
        assert_eq!(
            world.entity_position(id.entity()),
            Some((MapId(1), Position::new(5, 5)))
        );
    }

    #[test]
    fn save_remove_load_roundtrips_bytes() {
        let (_, store, directory) = directory_with(10);
        let id = directory
            .create_player(snapshot("Hero"), 1, "acct1", SessionId(10))
            .unwrap();

        directory.save_player(id).unwrap();
        directory.remove_player(id, false).unwrap();
        assert_eq!(directory.player_count(), 0);

        let reloaded = directory
            .load_player("Hero", 1, "acct1", SessionId(20))
            .unwrap();
        let player = directory.player(reloaded).unwrap();
        assert_eq!(player.character, vec![0xAB, 0xCD, 0xEF]);
        assert_eq!(store.len(), 1);
        assert_consistent(&directory);
    }

    #[test]
    fn load_unknown_character_is_not_found() {
        let (_, _, directory) = directory_with(10);
        let err = directory
            .load_player("Ghost", 1, "acct1", SessionId(10))
            .unwrap_err();
        assert!(matches!(err, DirectoryError::UnknownCharacter(_)));
    }

    #[test]
    fn load_with_snapshot_name_mismatch_fails_hard() {
        let (_, store, directory) = directory_with(10);
        // A snapshot stored under the wrong key.
        store.save("Alias", &snapshot("Hero")).unwrap();
        let err = directory
            .load_player("Alias", 1, "acct1", SessionId(10))
            .unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidOperation(_)));
        assert_eq!(directory.player_count(), 0);
    }

    #[test]
    fn last_login_wins_rebinds_session() {
        let (_, store, directory) = directory_with(10);
        let forced: Arc<Mutex<Vec<(SessionId, SessionId)>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let sink = Arc::clone(&forced);
            directory.register_event_callback(move |event| {
                if let PlayerEvent::ForcedDisconnect {
                    old_session,
                    new_session,
                    ..
                } = event
                {
                    sink.lock().unwrap().push((*old_session, *new_session));
                }
            });
        }

        let id = directory
            .create_player(snapshot("Hero"), 1, "acct1", SessionId(10))
            .unwrap();
        directory.update_position(id, 3, 3).unwrap();

        let again = directory
            .load_player("Hero", 1, "acct1", SessionId(20))
            .unwrap();
        assert_eq!(again, id);

        let player = directory.player(id).unwrap();
        assert!(player.online);
        assert_eq!(player.session, SessionId(20));
        // The displaced session produced a warning signal...
        assert_eq!(*forced.lock().unwrap(), vec![(SessionId(10), SessionId(20))]);
        // ...its save completed before the rebind...
        assert_eq!(store.len(), 1);
        // ...and the position survived the handover.
        assert_eq!(
            directory.players_in_area(MapId(1), Position::new(0, 0), Position::new(9, 9)),
            vec![id]
        );
        assert_eq!(directory.player(id).unwrap().position, Position::new(3, 3));
        assert_consistent(&directory);
    }

    #[test]
    fn resident_offline_player_reconnects_without_store_read() {
        struct CountingStore {
            inner: MemoryStore,
            loads: AtomicUsize,
        }
        impl PlayerStore for CountingStore {
            fn load(&self, name: &str) -> Result<CharacterSnapshot, StoreError> {
                self.loads.fetch_add(1, Ordering::Relaxed);
                self.inner.load(name)
            }
            fn save(&self, name: &str, snapshot: &CharacterSnapshot) -> Result<(), StoreError> {
                self.inner.save(name, snapshot)
            }
        }

        let world = test_world();
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            loads: AtomicUsize::new(0),
        });
        let directory = PlayerDirectory::new(
            DirectoryConfig::default(),
            world,
            Arc::clone(&store) as Arc<dyn PlayerStore>,
        );

        let id = directory
            .create_player(snapshot("Hero"), 1, "acct1", SessionId(10))
            .unwrap();
        directory.disconnect(id, true).unwrap();
        assert!(!directory.player(id).unwrap().online);

        let again = directory
            .load_player("Hero", 1, "acct1", SessionId(11))
            .unwrap();
        assert_eq!(again, id);
        assert!(directory.player(id).unwrap().online);
        // Reconnect reused the resident record: zero store reads.
        assert_eq!(store.loads.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn disconnect_twice_is_idempotent() {
        let (_, _, directory) = directory_with(10);
        let events = Arc::new(AtomicUsize::new(0));
        {
            let sink = Arc::clone(&events);
            directory.register_event_callback(move |event| {
                if matches!(event, PlayerEvent::Disconnected { .. }) {
                    sink.fetch_add(1, Ordering::Relaxed);
                }
            });
        }

        let id = directory
            .create_player(snapshot("Hero"), 1, "acct1", SessionId(10))
            .unwrap();
        directory.disconnect(id, false).unwrap();
        directory.disconnect(id, false).unwrap();

        assert_eq!(events.load(Ordering::Relaxed), 1);
        assert!(directory.player_by_session(SessionId(10)).is_none());
    }

    #[test]
    fn remove_detaches_every_index() {
        let (world, _, directory) = directory_with(10);
        let leader = directory
            .create_player(snapshot("Leader"), 1, "acct1", SessionId(10))
            .unwrap();
        let id = directory
            .create_player(snapshot("Hero"), 2, "acct2", SessionId(11))
            .unwrap();
        directory.set_party(id, Some(leader)).unwrap();
        directory.set_guild(id, Some(GuildId(3))).unwrap();

        directory.remove_player(id, false).unwrap();

        assert!(directory.player(id).is_none());
        assert!(directory.player_by_name("Hero").is_none());
        assert!(directory.player_by_session(SessionId(11)).is_none());
        assert!(directory.players_in_party(leader).is_empty());
        assert!(directory.players_in_guild(GuildId(3)).is_empty());
        // Empty reverse sets are deleted outright.
        assert_eq!(directory.by_party.lock().unwrap().key_count(), 0);
        assert_eq!(directory.by_guild.lock().unwrap().key_count(), 0);
        assert_eq!(world.entity_position(id.entity()), None);
        assert_consistent(&directory);
    }

    #[test]
    fn update_position_maintains_cell_index() {
        let (_, _, directory) = directory_with(10);
        let id = directory
            .create_player(snapshot("Hero"), 1, "acct1", SessionId(10))
            .unwrap();

        directory.update_position(id, 7, 7).unwrap();
        assert_eq!(
            directory.players_in_radius(MapId(1), Position::new(7, 7), 0),
            vec![id]
        );
        assert!(directory
            .players_in_radius(MapId(1), Position::new(2, 2), 0)
            .is_empty());

        // Same-cell update short-circuits (stays consistent).
        directory.update_position(id, 7, 7).unwrap();
        assert_eq!(
            directory.players_in_radius(MapId(1), Position::new(7, 7), 0),
            vec![id]
        );
    }

    #[test]
    fn party_and_guild_reassignment() {
        let (_, _, directory) = directory_with(10);
        let a = directory
            .create_player(snapshot("A"), 1, "acct", SessionId(10))
            .unwrap();
        let b = directory
            .create_player(snapshot("B"), 1, "acct", SessionId(11))
            .unwrap();

        directory.set_party(a, Some(b)).unwrap();
        assert_eq!(directory.players_in_party(b), vec![a]);

        directory.set_party(a, Some(a)).unwrap();
        assert!(directory.players_in_party(b).is_empty());
        assert_eq!(directory.players_in_party(a), vec![a]);

        directory.set_party(a, None).unwrap();
        assert!(directory.players_in_party(a).is_empty());
    }

    #[test]
    fn inactivity_sweep_disconnects_and_saves() {
        let (_, store, directory) = directory_with(10);
        let id = directory
            .create_player(snapshot("Hero"), 1, "acct1", SessionId(10))
            .unwrap();
        // Backdate the activity stamp.
        directory
            .table
            .lock()
            .unwrap()
            .get_mut(&id)
            .unwrap()
            .last_activity_ms = 0;

        let disconnected = directory.check_inactivity(u64::MAX);
        assert_eq!(disconnected, 1);
        assert!(!directory.player(id).unwrap().online);
        assert_eq!(store.len(), 1);

        // A second sweep finds nobody.
        assert_eq!(directory.check_inactivity(u64::MAX), 0);
    }

    #[test]
    fn trade_resets_on_reload_and_times_out() {
        let (_, _, directory) = directory_with(10);
        let a = directory
            .create_player(snapshot("A"), 1, "acct", SessionId(10))
            .unwrap();
        let b = directory
            .create_player(snapshot("B"), 1, "acct", SessionId(11))
            .unwrap();

        directory.begin_trade(a, b, 1_000).unwrap();
        assert!(directory.player(a).unwrap().trade.active());

        // Reload clears the transient trade state.
        directory
            .load_player("A", 1, "acct", SessionId(12))
            .unwrap();
        assert!(!directory.player(a).unwrap().trade.active());

        // And a stale offer expires on tick.
        directory.begin_trade(a, b, 1_000).unwrap();
        directory.tick_player(a, 1_000 + TRADE_TIMEOUT_MS).unwrap();
        assert!(!directory.player(a).unwrap().trade.active());
    }

    #[test]
    fn create_then_load_event_order() {
        let (_, _, directory) = directory_with(10);
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let sink = Arc::clone(&seen);
            directory.register_event_callback(move |event| {
                sink.lock().unwrap().push(event.clone());
            });
        }

        directory
            .create_player(snapshot("Hero"), 1, "acct1", SessionId(10))
            .unwrap();
        let seen = seen.lock().unwrap();
        assert!(matches!(seen[0], PlayerEvent::Created { .. }));
        assert!(matches!(seen[1], PlayerEvent::Connected { .. }));
    }

    #[test]
    fn session_conflict_rolls_back_admission() {
        let (_, _, directory) = directory_with(10);
        directory
            .create_player(snapshot("Hero"), 1, "acct1", SessionId(10))
            .unwrap();
        let err = directory
            .create_player(snapshot("Other"), 2, "acct2", SessionId(10))
            .unwrap_err();
        assert!(matches!(err, DirectoryError::SessionBound { .. }));
        // The failed admission left nothing behind.
        assert_eq!(directory.player_count(), 1);
        assert!(directory.player_by_name("Other").is_none());
        assert_consistent(&directory);
    }
}
