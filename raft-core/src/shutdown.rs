use tokio::sync::broadcast;

/// Listens for a shutdown broadcast and latches it. Every long-lived task
/// holds one of these and polls `recv` inside its select loop.
#[derive(Debug)]
pub struct Shutdown {
    shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Waits for the shutdown notice, returning immediately once it has
    /// been observed before.
    pub async fn recv(&mut self) {
        if self.shutdown {
            return;
        }
        let _ = self.notify.recv().await;
        self.shutdown = true;
    }
}
