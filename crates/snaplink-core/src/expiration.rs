use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A queue of expired resolution-entry keys fed by a cache backend.
///
/// Backends push keys from a feeder task. [`close`](Self::close) tells the
/// feeder to stop and waits for it, so once it returns the backend has
/// released its subscription.
#[derive(Debug)]
pub struct ExpirationStream {
    keys: mpsc::Receiver<String>,
    stop: Option<oneshot::Sender<()>>,
    feeder: Option<JoinHandle<()>>,
}

impl ExpirationStream {
    /// Wraps a feeder task that pushes keys into `keys` and exits when `stop` fires.
    pub fn new(keys: mpsc::Receiver<String>, stop: oneshot::Sender<()>, feeder: JoinHandle<()>) -> Self {
        Self {
            keys,
            stop: Some(stop),
            feeder: Some(feeder),
        }
    }

    /// A stream fed directly through a channel, with no feeder task.
    pub fn from_channel(keys: mpsc::Receiver<String>) -> Self {
        Self {
            keys,
            stop: None,
            feeder: None,
        }
    }

    /// Waits for the next expired key.
    ///
    /// Returns `None` once the feeder has gone away.
    pub async fn next(&mut self) -> Option<String> {
        self.keys.recv().await
    }

    /// Stops the feeder and waits until it has unsubscribed.
    pub async fn close(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.keys.close();

        if let Some(feeder) = self.feeder.take() {
            match feeder.await {
                Ok(()) => debug!("expiration feeder stopped"),
                Err(e) => warn!(error = %e, "expiration feeder ended abnormally"),
            }
        }
    }
}

impl Drop for ExpirationStream {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
