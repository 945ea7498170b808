use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A spawned background protocol and the token that asks it to stop
pub(crate) struct Worker<T> {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> Worker<T> {
    pub fn spawn<F>(name: &'static str, cancel: CancellationToken, task: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        debug!(worker = name, "Spawning worker");
        Self {
            name,
            cancel,
            handle: tokio::spawn(task),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Wait for the worker to finish on its own
    pub async fn join(mut self) -> Option<T> {
        match (&mut self.handle).await {
            Ok(output) => Some(output),
            Err(e) => {
                warn!(worker = self.name, error = %e, "Worker ended abnormally");
                None
            }
        }
    }

    /// Wait at most `limit`; a worker still running afterwards is aborted and
    /// left behind.
    pub async fn join_within(mut self, limit: Duration) -> Option<T> {
        match tokio::time::timeout(limit, &mut self.handle).await {
            Ok(Ok(output)) => Some(output),
            Ok(Err(e)) => {
                warn!(worker = self.name, error = %e, "Worker ended abnormally");
                None
            }
            Err(_) => {
                warn!(
                    worker = self.name,
                    timeout_ms = limit.as_millis() as u64,
                    "Worker did not stop in time, abandoning it"
                );
                self.handle.abort();
                None
            }
        }
    }
}

impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
