// ABOUTME: Cooperative cancellation for in-flight deploys.
// ABOUTME: A latched watch channel; waits race it with tokio::select!.

use std::future::Future;
use tokio::sync::watch;

use super::DeployError;

/// Triggers cancellation of every linked [`Cancellation`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes whether the caller asked the deploy to stop.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// A linked handle and cancellation.
    pub fn new() -> (CancelHandle, Cancellation) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, Cancellation { rx })
    }

    /// A cancellation that never fires.
    pub fn never() -> Cancellation {
        let (handle, cancellation) = Self::new();
        // Dropping the sender leaves the value at `false` for good.
        drop(handle);
        cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; pends forever otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Cancellation {
    /// Drive `work` to completion unless cancellation fires first.
    ///
    /// On cancellation `work` is dropped mid-flight and
    /// [`DeployError::Cancelled`] is returned.
    pub async fn guard<F, T, E>(&self, work: F) -> Result<T, DeployError>
    where
        F: Future<Output = Result<T, E>>,
        DeployError: From<E>,
    {
        tokio::select! {
            result = work => result.map_err(DeployError::from),
            _ = self.cancelled() => Err(DeployError::Cancelled),
        }
    }
}
