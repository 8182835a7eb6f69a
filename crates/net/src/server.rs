use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use admission::AdmissionQueue;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::channels::{
    RegisterSession, RegisterTx, SessionEvent, SessionId, SessionWrite, SessionWriteRx,
    SessionWriteTx, UnregisterTx,
};
use crate::limiter::ConnectionLimiter;
use crate::line::LineBuffer;

/// `SessionId(0)` is the offline sentinel, so allocation starts at 1.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub addr: String,
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:4000".to_string(),
            max_connections: 1000,
            max_connections_per_ip: 5,
        }
    }
}

/// Accept connections until shutdown, spawning one task per session.
/// Inbound work enters the core only through the admission queue; the
/// consumer on the other side never sees a socket.
pub async fn run_intake_loop(
    config: IntakeConfig,
    queue: Arc<AdmissionQueue<SessionEvent>>,
    register_tx: RegisterTx,
    unregister_tx: UnregisterTx,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(&config.addr).await?;
    let limiter = ConnectionLimiter::new(config.max_connections, config.max_connections_per_ip);
    tracing::info!(addr = %config.addr, "intake listening");

    loop {
        let (stream, peer_addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("intake loop: shutdown requested, no longer accepting");
                    return Ok(());
                }
                continue;
            }
        };

        let admit_result = limiter
            .lock()
            .expect("connection limiter poisoned")
            .try_admit(peer_addr.ip());
        if let Err(rejection) = admit_result {
            tracing::warn!(%peer_addr, %rejection, "connection refused");
            let mut stream = stream;
            let _ = stream.write_all(b"server busy\n").await;
            continue;
        }

        let session_id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::info!(session = %session_id, %peer_addr, "connection accepted");

        let queue = Arc::clone(&queue);
        let register_tx = register_tx.clone();
        let unregister_tx = unregister_tx.clone();
        let limiter = Arc::clone(&limiter);

        tokio::spawn(async move {
            handle_session(stream, session_id, queue, register_tx, unregister_tx).await;
            limiter
                .lock()
                .expect("connection limiter poisoned")
                .release(peer_addr.ip());
        });
    }
}

fn enqueue_event(queue: &AdmissionQueue<SessionEvent>, event: SessionEvent) -> bool {
    let (category, priority) = event.admission_class();
    match queue.enqueue(event, category, priority) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "inbound event shed by admission queue");
            false
        }
    }
}

async fn handle_session(
    stream: tokio::net::TcpStream,
    session_id: SessionId,
    queue: Arc<AdmissionQueue<SessionEvent>>,
    register_tx: RegisterTx,
    unregister_tx: UnregisterTx,
) {
    let (mut reader, mut writer) = stream.into_split();

    let (write_tx, mut write_rx): (SessionWriteTx, SessionWriteRx) =
        tokio::sync::mpsc::unbounded_channel();

    let _ = register_tx.send(RegisterSession {
        session_id,
        write_tx: write_tx.clone(),
    });

    if !enqueue_event(&queue, SessionEvent::Connected { session_id }) {
        // Shed at the door: tell the client and bail before any reads.
        let _ = writer.write_all(b"server busy, try again later\n").await;
        let _ = unregister_tx.send(session_id);
        return;
    }

    let writer_handle = tokio::spawn(async move {
        while let Some(cmd) = write_rx.recv().await {
            match cmd {
                SessionWrite::Text(text) => {
                    let msg = format!("{}\n", text);
                    if writer.write_all(msg.as_bytes()).await.is_err() {
                        break;
                    }
                }
                SessionWrite::Close => {
                    let _ = writer.shutdown().await;
                    break;
                }
            }
        }
    });

    let mut line_buffer = LineBuffer::new();
    let mut buf = [0u8; 4096];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in line_buffer.feed(&buf[..n]) {
                    if !enqueue_event(&queue, SessionEvent::Input { session_id, line }) {
                        let _ = write_tx.send(SessionWrite::Text("server busy".into()));
                    }
                }
            }
            Err(_) => break,
        }
    }

    // Disconnects ride at Critical priority; a refusal here means the queue
    // hit its hard ceiling and the inactivity sweep will reap the player.
    enqueue_event(&queue, SessionEvent::Disconnected { session_id });
    let _ = unregister_tx.send(session_id);

    writer_handle.abort();
    tracing::info!(session = %session_id, "session ended");
}
