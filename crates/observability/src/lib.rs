use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Soft budget for one simulation tick. The loop targets ~10ms scheduling
/// granularity; a tick that runs longer delays every connected player.
const TICK_BUDGET_US: u128 = 10_000;

#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub tick_number: u64,
    pub duration_us: u128,
    pub players_online: usize,
    pub mobs_live: usize,
    pub items_swept: usize,
    pub mobs_spawned: usize,
}

impl TickMetrics {
    pub fn log(&self) {
        if self.duration_us > TICK_BUDGET_US {
            tracing::warn!(
                tick = self.tick_number,
                duration_us = self.duration_us,
                players = self.players_online,
                mobs = self.mobs_live,
                "tick exceeded budget ({}us > {}us)",
                self.duration_us,
                TICK_BUDGET_US
            );
        } else if self.items_swept > 0 || self.mobs_spawned > 0 {
            tracing::debug!(
                tick = self.tick_number,
                duration_us = self.duration_us,
                players = self.players_online,
                swept = self.items_swept,
                spawned = self.mobs_spawned,
                "tick completed"
            );
        }
    }
}

/// Log-rotation collaborator invoked from full maintenance passes.
/// The server core only triggers rotation; the policy lives outside it.
pub trait LogRotation: Send + Sync {
    fn rotate(&self) -> std::io::Result<()>;
}

/// Default rotator: does nothing. Deployments that write to files install
/// their own implementation.
pub struct NoopRotation;

impl LogRotation for NoopRotation {
    fn rotate(&self) -> std::io::Result<()> {
        Ok(())
    }
}
