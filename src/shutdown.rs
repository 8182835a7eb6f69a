use tokio::sync::watch;

/// Held by the server; triggering it asks every loop to stop.
#[derive(Clone)]
pub struct ShutdownController(watch::Sender<bool>);

/// Cloned into each loop; polled by threads, awaited by tasks.
#[derive(Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

pub fn shutdown_pair() -> (ShutdownController, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownController(tx), ShutdownSignal(rx))
}

impl ShutdownController {
    /// Idempotent: triggering twice is harmless.
    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

impl ShutdownSignal {
    /// Non-blocking poll for the simulation and consumer threads.
    pub fn triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Async wait for tasks.
    pub async fn wait(&mut self) {
        while !*self.0.borrow() {
            if self.0.changed().await.is_err() {
                return; // controller dropped
            }
        }
    }

    /// The raw watch receiver, for the net crate's intake loop.
    pub fn into_watch(self) -> watch::Receiver<bool> {
        self.0
    }
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = sigint.recv() => { tracing::info!("received SIGINT"); }
            _ = sigterm.recv() => { tracing::info!("received SIGTERM"); }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
        tracing::info!("received Ctrl+C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_untriggered() {
        let (_controller, signal) = shutdown_pair();
        assert!(!signal.triggered());
    }

    #[test]
    fn trigger_is_visible_to_all_clones() {
        let (controller, signal) = shutdown_pair();
        let clone = signal.clone();
        controller.trigger();
        controller.trigger(); // idempotent
        assert!(signal.triggered());
        assert!(clone.triggered());
    }

    #[tokio::test]
    async fn async_wait_returns_after_trigger() {
        let (controller, mut signal) = shutdown_pair();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            controller.trigger();
        });
        signal.wait().await;
        assert!(signal.triggered());
    }
}
