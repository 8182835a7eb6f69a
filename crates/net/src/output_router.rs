use std::collections::HashMap;

use crate::channels::{OutputRx, RegisterRx, SessionId, SessionWrite, SessionWriteTx, UnregisterRx};

/// Routes `SessionOutput` messages to the correct per-session writer task.
/// An output flagged `disconnect` delivers its text, then closes the session.
pub async fn run_output_router(
    mut output_rx: OutputRx,
    mut register_rx: RegisterRx,
    mut unregister_rx: UnregisterRx,
) {
    let mut writers: HashMap<SessionId, SessionWriteTx> = HashMap::new();

    loop {
        tokio::select! {
            Some(reg) = register_rx.recv() => {
                tracing::debug!(session = %reg.session_id, "output router: session registered");
                writers.insert(reg.session_id, reg.write_tx);
            }
            Some(session_id) = unregister_rx.recv() => {
                tracing::debug!(session = %session_id, "output router: session unregistered");
                writers.remove(&session_id);
            }
            Some(output) = output_rx.recv() => {
                if let Some(tx) = writers.get(&output.session_id) {
                    if tx.send(SessionWrite::Text(output.text)).is_err() {
                        writers.remove(&output.session_id);
                    } else if output.disconnect {
                        let _ = tx.send(SessionWrite::Close);
                        writers.remove(&output.session_id);
                    }
                }
            }
            else => break,
        }
    }

    tracing::info!("output router stopped");
}
