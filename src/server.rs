use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use admission::AdmissionQueue;
use net::channels::{OutputRx, OutputTx, SessionEvent, SessionOutput};
use net::SessionId;
use observability::{LogRotation, NoopRotation, TickMetrics};
use persistence::{CharacterSnapshot, FileStore, StorageMaintenance};
use players::{DirectoryError, PlayerDirectory, PlayerEvent, PlayerId};
use world::{MapId, SpatialWorld, WorldError};

use crate::config::ServerConfig;
use crate::shutdown::{shutdown_pair, ShutdownController, ShutdownSignal};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("world error: {0}")]
    World(#[from] WorldError),

    #[error("bad map entry '{0}', expected '<map_id>:<path>'")]
    BadMapEntry(String),
}

fn wall_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The server core: one consumer thread draining the admission queue, one
/// simulation thread advancing world and player state at a fixed cadence.
/// The tokio intake loop (see `net`) produces into the queue from outside.
///
/// Autosave and inactivity sweeps are wall-clock comparisons checked once
/// per simulation tick; there are no separate maintenance timers to race
/// against the simulation state.
pub struct GameServer {
    config: ServerConfig,
    world: Arc<SpatialWorld>,
    players: Arc<PlayerDirectory>,
    queue: Arc<AdmissionQueue<SessionEvent>>,
    output_tx: OutputTx,
    output_rx: Option<OutputRx>,
    storage: Arc<dyn StorageMaintenance>,
    log_rotation: Arc<dyn LogRotation>,
    controller: ShutdownController,
    signal: ShutdownSignal,
    consumer: Option<JoinHandle<()>>,
    simulation: Option<JoinHandle<()>>,
    tick_counter: Arc<AtomicU64>,
    stopped: AtomicBool,
}

impl GameServer {
    /// Build every subsystem from configuration: world (with map files from
    /// `base_path`), file-backed store, directory, admission queue.
    pub fn initialize(config: ServerConfig) -> Result<Self, ServerError> {
        let world = Arc::new(SpatialWorld::new(config.to_world_config()));
        let base = std::path::Path::new(&config.base_path);
        for entry in &config.maps {
            let (id, path) = entry
                .split_once(':')
                .ok_or_else(|| ServerError::BadMapEntry(entry.clone()))?;
            let id: u16 = id
                .parse()
                .map_err(|_| ServerError::BadMapEntry(entry.clone()))?;
            let text = std::fs::read_to_string(base.join(path))?;
            world.load_map(MapId(id), &text)?;
        }

        let store = Arc::new(FileStore::new(&config.base_path));
        let players = Arc::new(PlayerDirectory::new(
            config.to_directory_config(),
            Arc::clone(&world),
            Arc::clone(&store) as _,
        ));

        Ok(Self::with_parts(
            config,
            world,
            players,
            store,
            Arc::new(NoopRotation),
        ))
    }

    /// Assemble a server from externally-built collaborators. Tests use this
    /// with an in-memory store.
    pub fn with_parts(
        config: ServerConfig,
        world: Arc<SpatialWorld>,
        players: Arc<PlayerDirectory>,
        storage: Arc<dyn StorageMaintenance>,
        log_rotation: Arc<dyn LogRotation>,
    ) -> Self {
        let queue = Arc::new(AdmissionQueue::new(config.to_queue_config()));
        let (output_tx, output_rx) = tokio::sync::mpsc::unbounded_channel();
        let (controller, signal) = shutdown_pair();

        // A displaced session learns it lost before its socket closes.
        {
            let output = output_tx.clone();
            players.register_event_callback(move |event| {
                if let PlayerEvent::ForcedDisconnect { old_session, .. } = event {
                    let _ = output.send(SessionOutput::closing(
                        *old_session,
                        "logged in from another location",
                    ));
                }
            });
        }

        Self {
            config,
            world,
            players,
            queue,
            output_tx,
            output_rx: Some(output_rx),
            storage,
            log_rotation,
            controller,
            signal,
            consumer: None,
            simulation: None,
            tick_counter: Arc::new(AtomicU64::new(0)),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn world(&self) -> Arc<SpatialWorld> {
        Arc::clone(&self.world)
    }

    pub fn players(&self) -> Arc<PlayerDirectory> {
        Arc::clone(&self.players)
    }

    pub fn queue(&self) -> Arc<AdmissionQueue<SessionEvent>> {
        Arc::clone(&self.queue)
    }

    pub fn output_tx(&self) -> OutputTx {
        self.output_tx.clone()
    }

    /// The output end for the router task; available exactly once.
    pub fn take_output_rx(&mut self) -> Option<OutputRx> {
        self.output_rx.take()
    }

    /// Shutdown flag for the intake loop.
    pub fn shutdown_watch(&self) -> tokio::sync::watch::Receiver<bool> {
        self.signal.clone().into_watch()
    }

    /// Spawn the consumer and simulation threads.
    pub fn start(&mut self) {
        if self.consumer.is_some() {
            return;
        }

        let consumer = {
            let queue = Arc::clone(&self.queue);
            let players = Arc::clone(&self.players);
            let world = Arc::clone(&self.world);
            let output_tx = self.output_tx.clone();
            let config = self.config.clone();
            std::thread::spawn(move || {
                run_consumer_loop(&queue, &players, &world, &output_tx, &config);
            })
        };
        self.consumer = Some(consumer);

        let simulation = {
            let world = Arc::clone(&self.world);
            let players = Arc::clone(&self.players);
            let output_tx = self.output_tx.clone();
            let config = self.config.clone();
            let signal = self.signal.clone();
            let counter = Arc::clone(&self.tick_counter);
            std::thread::spawn(move || {
                run_simulation_loop(&world, &players, &output_tx, &config, &signal, &counter);
            })
        };
        self.simulation = Some(simulation);
        tracing::info!(world = %self.config.world_name, "server started");
    }

    /// Advance the simulation by exactly one tick. Administrative surface;
    /// the simulation thread drives the same code path.
    pub fn process_tick(&self) -> TickMetrics {
        let tick_number = self.tick_counter.fetch_add(1, Ordering::Relaxed) + 1;
        simulation_tick(
            &self.world,
            &self.players,
            &self.output_tx,
            self.config.tick_ms.max(1),
            tick_number,
        )
    }

    /// Save everyone; a full pass also runs the storage-optimization and
    /// log-rotation collaborators.
    pub fn perform_maintenance(&self, full: bool) {
        let saved = self.players.save_all_players();
        tracing::info!(saved, full, "maintenance pass");
        if full {
            match self.storage.optimize() {
                Ok(cleaned) => tracing::info!(cleaned, "storage optimized"),
                Err(e) => tracing::error!(error = %e, "storage optimization failed"),
            }
            if let Err(e) = self.log_rotation.rotate() {
                tracing::error!(error = %e, "log rotation failed");
            }
        }
    }

    /// Idempotent shutdown: stop accepting, stop the simulation, drain the
    /// consumer, save everyone, release in reverse acquisition order.
    pub fn shutdown(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("shutdown: stopping intake and simulation");
        self.controller.trigger();
        if let Some(handle) = self.simulation.take() {
            let _ = handle.join();
        }
        self.queue.shutdown();
        if let Some(handle) = self.consumer.take() {
            let _ = handle.join();
        }
        let saved = self.players.save_all_players();
        tracing::info!(saved, "shutdown complete");
    }
}

impl Drop for GameServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// --- simulation loop ---

fn run_simulation_loop(
    world: &Arc<SpatialWorld>,
    players: &Arc<PlayerDirectory>,
    output_tx: &OutputTx,
    config: &ServerConfig,
    signal: &ShutdownSignal,
    counter: &Arc<AtomicU64>,
) {
    let tick_duration = Duration::from_millis(config.tick_ms.max(1));
    let autosave_interval = Duration::from_secs(config.save_interval_secs.max(1));
    let inactivity_interval = Duration::from_secs(config.inactivity_check_secs.max(1));
    let mut last_tick = Instant::now();
    let mut last_autosave = Instant::now();
    let mut last_inactivity = Instant::now();

    tracing::info!(tick_ms = config.tick_ms, "simulation loop running");

    while !signal.triggered() {
        let tick_start = Instant::now();
        let delta_ms = (tick_start.duration_since(last_tick).as_millis() as u64).max(1);
        last_tick = tick_start;

        let tick_number = counter.fetch_add(1, Ordering::Relaxed) + 1;
        let metrics = simulation_tick(world, players, output_tx, delta_ms, tick_number);
        metrics.log();

        // Maintenance rides the tick: plain wall-clock comparisons, no
        // timer threads to race the simulation state.
        if config.auto_save && last_autosave.elapsed() >= autosave_interval {
            last_autosave = Instant::now();
            players.save_all_players();
        }
        if last_inactivity.elapsed() >= inactivity_interval {
            last_inactivity = Instant::now();
            let disconnected = players.check_inactivity(wall_ms());
            if disconnected > 0 {
                tracing::info!(disconnected, "inactivity sweep");
            }
        }

        let elapsed = tick_start.elapsed();
        if elapsed < tick_duration {
            std::thread::sleep(tick_duration - elapsed);
        }
    }

    tracing::info!("simulation loop stopped");
}

/// One tick: world mutation first, then per-player updates. A failing player
/// handler is isolated (logged, that player force-disconnected) and never
/// interrupts the tick for everyone else.
fn simulation_tick(
    world: &Arc<SpatialWorld>,
    players: &Arc<PlayerDirectory>,
    output_tx: &OutputTx,
    delta_ms: u64,
    tick_number: u64,
) -> TickMetrics {
    let start = Instant::now();
    let report = world.tick(delta_ms);
    let now = world.now_ms();

    for id in players.online_players() {
        if let Err(e) = players.tick_player(id, now) {
            tracing::warn!(player = %id, error = %e, "player update failed, forcing disconnect");
            force_disconnect(players, output_tx, id, "internal error");
        }
    }

    TickMetrics {
        tick_number,
        duration_us: start.elapsed().as_micros(),
        players_online: players.online_count(),
        mobs_live: report.mobs_live,
        items_swept: report.items_swept,
        mobs_spawned: report.mobs_spawned,
    }
}

fn force_disconnect(
    players: &Arc<PlayerDirectory>,
    output_tx: &OutputTx,
    id: PlayerId,
    reason: &str,
) {
    if let Some(player) = players.player(id) {
        if player.online {
            let _ = output_tx.send(SessionOutput::closing(player.session, reason));
        }
    }
    let _ = players.disconnect(id, true);
}

// --- admission consumer ---

#[derive(Debug, Clone, Copy)]
enum Phase {
    AwaitingLogin,
    Playing(PlayerId),
}

fn run_consumer_loop(
    queue: &Arc<AdmissionQueue<SessionEvent>>,
    players: &Arc<PlayerDirectory>,
    world: &Arc<SpatialWorld>,
    output_tx: &OutputTx,
    config: &ServerConfig,
) {
    let mut sessions: BTreeMap<SessionId, Phase> = BTreeMap::new();
    tracing::info!("admission consumer running");

    while let Some(item) = queue.dequeue() {
        let waited = item.enqueued_at.elapsed();
        let start = Instant::now();
        let ok = handle_session_event(
            players,
            world,
            output_tx,
            config,
            &mut sessions,
            item.payload,
        );
        queue.record_processed(waited, start.elapsed(), ok);
    }

    tracing::info!("admission consumer stopped");
}

fn handle_session_event(
    players: &Arc<PlayerDirectory>,
    world: &Arc<SpatialWorld>,
    output_tx: &OutputTx,
    config: &ServerConfig,
    sessions: &mut BTreeMap<SessionId, Phase>,
    event: SessionEvent,
) -> bool {
    match event {
        SessionEvent::Connected { session_id } => {
            sessions.insert(session_id, Phase::AwaitingLogin);
            let _ = output_tx.send(SessionOutput::new(
                session_id,
                format!("welcome to {}. login <name> to begin", config.world_name),
            ));
            true
        }
        SessionEvent::Disconnected { session_id } => {
            if let Some(Phase::Playing(id)) = sessions.remove(&session_id) {
                // Only take the player offline if this session still owns it;
                // after a forced rebind the record belongs to the new session.
                let owns = players
                    .player(id)
                    .map(|p| p.session == session_id)
                    .unwrap_or(false);
                if owns {
                    if let Err(e) = players.disconnect(id, true) {
                        tracing::warn!(player = %id, error = %e, "disconnect on socket close failed");
                    }
                }
            }
            true
        }
        SessionEvent::Input { session_id, line } => match sessions.get(&session_id).copied() {
            None => {
                tracing::debug!(session = %session_id, "input from unknown session");
                true
            }
            Some(Phase::AwaitingLogin) => {
                handle_login(players, output_tx, config, sessions, session_id, &line)
            }
            Some(Phase::Playing(id)) => {
                handle_command(players, world, output_tx, sessions, session_id, id, &line)
            }
        },
    }
}

fn handle_login(
    players: &Arc<PlayerDirectory>,
    output_tx: &OutputTx,
    config: &ServerConfig,
    sessions: &mut BTreeMap<SessionId, Phase>,
    session_id: SessionId,
    line: &str,
) -> bool {
    let mut parts = line.split_whitespace();
    if parts.next() != Some("login") {
        let _ = output_tx.send(SessionOutput::new(session_id, "login first: login <name>"));
        return true;
    }
    let Some(name) = parts.next() else {
        let _ = output_tx.send(SessionOutput::new(session_id, "usage: login <name>"));
        return true;
    };

    // Account authentication is the external collaborator's job; sessions
    // arrive pre-authenticated, so account identity mirrors the character.
    let result = players
        .load_player(name, 0, name, session_id)
        .or_else(|e| match e {
            DirectoryError::UnknownCharacter(_) => players.create_player(
                CharacterSnapshot {
                    name: name.to_string(),
                    map: config.spawn_map,
                    x: config.spawn_x,
                    y: config.spawn_y,
                    data: Vec::new(),
                },
                0,
                name,
                session_id,
            ),
            other => Err(other),
        });

    match result {
        Ok(id) => {
            sessions.insert(session_id, Phase::Playing(id));
            let _ = output_tx.send(SessionOutput::new(
                session_id,
                format!("welcome, {}!", name),
            ));
            true
        }
        Err(e) if e.is_conflict() => {
            let _ = output_tx.send(SessionOutput::new(
                session_id,
                format!("login rejected: {}", e),
            ));
            true
        }
        Err(e) => {
            tracing::warn!(session = %session_id, name, error = %e, "login failed");
            let _ = output_tx.send(SessionOutput::closing(session_id, "login failed"));
            sessions.remove(&session_id);
            false
        }
    }
}

fn handle_command(
    players: &Arc<PlayerDirectory>,
    world: &Arc<SpatialWorld>,
    output_tx: &OutputTx,
    sessions: &mut BTreeMap<SessionId, Phase>,
    session_id: SessionId,
    id: PlayerId,
    line: &str,
) -> bool {
    let Some(player) = players.player(id) else {
        tracing::error!(player = %id, "playing session without a record");
        sessions.remove(&session_id);
        return false;
    };
    if player.session != session_id {
        // In-flight input from a session that has since been displaced.
        sessions.remove(&session_id);
        return true;
    }
    let _ = players.note_activity(id);

    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("move") => {
            let (Some(dx), Some(dy)) = (
                parts.next().and_then(|s| s.parse::<i32>().ok()),
                parts.next().and_then(|s| s.parse::<i32>().ok()),
            ) else {
                let _ = output_tx.send(SessionOutput::new(session_id, "usage: move <dx> <dy>"));
                return true;
            };
            let (to_x, to_y) = (player.position.x + dx, player.position.y + dy);
            if !world.is_valid_movement(
                player.map,
                player.position.x,
                player.position.y,
                to_x,
                to_y,
            ) {
                let _ = output_tx.send(SessionOutput::new(session_id, "blocked"));
                return true;
            }
            match players.update_position(id, to_x, to_y) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(player = %id, error = %e, "move handler failed, forcing disconnect");
                    sessions.remove(&session_id);
                    force_disconnect(players, output_tx, id, "internal error");
                    false
                }
            }
        }
        Some("say") => {
            let message = line.strip_prefix("say").map(str::trim).unwrap_or_default();
            if message.is_empty() {
                return true;
            }
            for nearby in players.players_in_radius(player.map, player.position, 10) {
                if let Some(listener) = players.player(nearby) {
                    if listener.online {
                        let _ = output_tx.send(SessionOutput::new(
                            listener.session,
                            format!("{}: {}", player.name, message),
                        ));
                    }
                }
            }
            true
        }
        Some("who") => {
            let _ = output_tx.send(SessionOutput::new(
                session_id,
                format!("players online: {}", players.online_count()),
            ));
            true
        }
        Some("ping") => {
            let _ = output_tx.send(SessionOutput::new(session_id, "pong"));
            true
        }
        Some("quit") => {
            let _ = output_tx.send(SessionOutput::closing(session_id, "goodbye"));
            sessions.remove(&session_id);
            if let Err(e) = players.disconnect(id, true) {
                tracing::warn!(player = %id, error = %e, "disconnect on quit failed");
            }
            true
        }
        _ => {
            let _ = output_tx.send(SessionOutput::new(session_id, "unknown command"));
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::MemoryStore;
    use players::DirectoryConfig;
    use world::WorldConfig;

    const TEST_MAP: &str = "8 8\n........\n........\n........\n........\n........\n........\n........\n........";

    fn test_server() -> GameServer {
        let config = ServerConfig {
            spawn_map: 1,
            spawn_x: 3,
            spawn_y: 3,
            tick_ms: 5,
            ..ServerConfig::default()
        };
        let world = Arc::new(SpatialWorld::new(WorldConfig::default()));
        world.load_map(MapId(1), TEST_MAP).unwrap();
        let store = Arc::new(MemoryStore::new());
        let players = Arc::new(PlayerDirectory::new(
            DirectoryConfig {
                spawn_map: MapId(1),
                spawn_position: world::Position::new(3, 3),
                ..Default::default()
            },
            Arc::clone(&world),
            Arc::clone(&store) as _,
        ));
        GameServer::with_parts(
            config,
            world,
            players,
            store,
            Arc::new(observability::NoopRotation),
        )
    }

    fn drive(server: &GameServer, sessions: &mut BTreeMap<SessionId, Phase>, event: SessionEvent) {
        handle_session_event(
            &server.players(),
            &server.world(),
            &server.output_tx(),
            &server.config,
            sessions,
            event,
        );
    }

    #[test]
    fn login_creates_then_reattaches() {
        let server = test_server();
        let mut sessions = BTreeMap::new();

        drive(&server, &mut sessions, SessionEvent::Connected {
            session_id: SessionId(1),
        });
        drive(&server, &mut sessions, SessionEvent::Input {
            session_id: SessionId(1),
            line: "login Hero".into(),
        });

        let players = server.players();
        assert_eq!(players.online_count(), 1);
        let hero = players.player_by_name("Hero").unwrap();
        assert_eq!(hero.session, SessionId(1));

        // Socket drops; player goes offline but stays resident.
        drive(&server, &mut sessions, SessionEvent::Disconnected {
            session_id: SessionId(1),
        });
        assert_eq!(players.online_count(), 0);
        assert_eq!(players.player_count(), 1);

        // A new session logs back into the resident record.
        drive(&server, &mut sessions, SessionEvent::Connected {
            session_id: SessionId(2),
        });
        drive(&server, &mut sessions, SessionEvent::Input {
            session_id: SessionId(2),
            line: "login Hero".into(),
        });
        assert_eq!(players.player_by_name("Hero").unwrap().session, SessionId(2));
    }

    #[test]
    fn stale_disconnect_does_not_kick_new_session() {
        let server = test_server();
        let mut sessions = BTreeMap::new();

        drive(&server, &mut sessions, SessionEvent::Connected {
            session_id: SessionId(1),
        });
        drive(&server, &mut sessions, SessionEvent::Input {
            session_id: SessionId(1),
            line: "login Hero".into(),
        });

        // Second login steals the character (last login wins).
        drive(&server, &mut sessions, SessionEvent::Connected {
            session_id: SessionId(2),
        });
        drive(&server, &mut sessions, SessionEvent::Input {
            session_id: SessionId(2),
            line: "login Hero".into(),
        });
        let players = server.players();
        assert_eq!(players.player_by_name("Hero").unwrap().session, SessionId(2));

        // The displaced socket's close must not take the new session down.
        drive(&server, &mut sessions, SessionEvent::Disconnected {
            session_id: SessionId(1),
        });
        let hero = players.player_by_name("Hero").unwrap();
        assert!(hero.online);
        assert_eq!(hero.session, SessionId(2));
    }

    #[test]
    fn move_command_updates_position_and_respects_walls() {
        let server = test_server();
        let mut sessions = BTreeMap::new();

        drive(&server, &mut sessions, SessionEvent::Connected {
            session_id: SessionId(1),
        });
        drive(&server, &mut sessions, SessionEvent::Input {
            session_id: SessionId(1),
            line: "login Hero".into(),
        });
        drive(&server, &mut sessions, SessionEvent::Input {
            session_id: SessionId(1),
            line: "move 1 0".into(),
        });

        let players = server.players();
        let hero = players.player_by_name("Hero").unwrap();
        assert_eq!(hero.position, world::Position::new(4, 3));

        // Off-map movement is refused and position unchanged.
        drive(&server, &mut sessions, SessionEvent::Input {
            session_id: SessionId(1),
            line: "move 100 0".into(),
        });
        assert_eq!(
            players.player_by_name("Hero").unwrap().position,
            world::Position::new(4, 3)
        );
    }

    #[test]
    fn process_tick_advances_world_clock() {
        let server = test_server();
        let before = server.world().now_ms();
        let metrics = server.process_tick();
        assert_eq!(metrics.tick_number, 1);
        assert!(server.world().now_ms() > before);
    }

    #[test]
    fn started_server_consumes_queue_and_shuts_down() {
        let mut server = test_server();
        server.start();

        let queue = server.queue();
        let (category, priority) = SessionEvent::Connected {
            session_id: SessionId(7),
        }
        .admission_class();
        queue
            .enqueue(
                SessionEvent::Connected {
                    session_id: SessionId(7),
                },
                category,
                priority,
            )
            .unwrap();
        let input = SessionEvent::Input {
            session_id: SessionId(7),
            line: "login Hero".into(),
        };
        let (category, priority) = input.admission_class();
        queue.enqueue(input, category, priority).unwrap();

        let players = server.players();
        for _ in 0..100 {
            if players.online_count() == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(players.online_count(), 1);
        assert!(queue.stats().total_processed >= 2);

        server.shutdown();
        server.shutdown(); // idempotent
    }

    #[test]
    fn maintenance_saves_players() {
        let server = test_server();
        let mut sessions = BTreeMap::new();
        drive(&server, &mut sessions, SessionEvent::Connected {
            session_id: SessionId(1),
        });
        drive(&server, &mut sessions, SessionEvent::Input {
            session_id: SessionId(1),
            line: "login Hero".into(),
        });

        server.perform_maintenance(true);
        assert_eq!(server.players().player_by_name("Hero").unwrap().save_count, 1);
    }
}
