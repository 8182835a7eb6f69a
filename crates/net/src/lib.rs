pub mod channels;
pub mod limiter;
pub mod line;
pub mod output_router;
pub mod server;

pub use channels::{
    RegisterSession, RegisterTx, SessionEvent, SessionId, SessionOutput, SessionWrite,
    UnregisterTx,
};
pub use limiter::ConnectionLimiter;
pub use server::{run_intake_loop, IntakeConfig};
