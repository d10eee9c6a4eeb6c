use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Background task slot shared by the loops.
///
/// A stopped loop stays stopped: its token is cancelled for good.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    name: &'static str,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Lifecycle {
    pub(crate) fn new(name: &'static str, cancel: CancellationToken) -> Self {
        Self {
            name,
            cancel,
            task: Mutex::new(None),
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::warn!("{} already running", self.name);
            return;
        }
        *slot = Some(tokio::spawn(task));
    }

    /// Cancels the loop and waits for it to return.
    pub(crate) async fn stop(&self) {
        self.cancel.cancel();
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            tracing::error!("{} ended abnormally: {err}", self.name);
        }
    }
}
