//! Background execution of pipeline operations.
//!
//! One operation owns the project directory at a time. Operations run on the tokio
//! runtime so the driving front end stays responsive, report through the shared
//! [`StateManager`], and stop between items when cancellation is requested.

use crate::models::Operation;
use crate::state::StateManager;
use std::future::Future;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WorkerError {
    #[error("cannot start {requested}: {running} is still running")]
    Busy {
        requested: Operation,
        running: Operation,
    },
}

/// Cooperative cancellation flag, checked before each archive or file.
///
/// An invocation already handed to the external tool is never interrupted.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires, for one-off calls outside a worker.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Finishes the operation even if the task panics or is aborted.
struct FinishGuard(StateManager);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish_operation();
    }
}

/// Runs one pipeline operation at a time on a runtime handle.
pub struct PipelineWorker {
    runtime: Handle,
    state: StateManager,
    cancel_tx: watch::Sender<bool>,
}

impl PipelineWorker {
    pub fn new(runtime: Handle, state: StateManager) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            runtime,
            state,
            cancel_tx,
        }
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Signal to hand to the services this worker drives.
    pub fn cancel_signal(&self) -> CancelSignal {
        CancelSignal::new(self.cancel_tx.subscribe())
    }

    /// Start `task` as `operation` over `total` items.
    ///
    /// Refuses to start while another operation holds the project.
    pub fn spawn<F, T>(
        &self,
        operation: Operation,
        total: usize,
        task: F,
    ) -> Result<JoinHandle<T>, WorkerError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.state.begin_operation(operation, total).is_none() {
            let running = self
                .state
                .read(|state| state.operation)
                .unwrap_or(operation);
            tracing::warn!("Refusing to start {}: {} is running", operation, running);
            return Err(WorkerError::Busy {
                requested: operation,
                running,
            });
        }

        self.cancel_tx.send_replace(false);
        tracing::info!("Starting {} ({} items)", operation, total);

        let guard = FinishGuard(self.state.clone());
        Ok(self.runtime.spawn(async move {
            let _guard = guard;
            task.await
        }))
    }

    /// Ask the running operation to stop before its next item.
    ///
    /// Returns `false` when nothing is running.
    pub fn request_cancel(&self) -> bool {
        if !self.state.is_running() {
            return false;
        }
        tracing::info!("Cancellation requested; the current item will finish first");
        self.cancel_tx.send_replace(true);
        self.state.request_cancel();
        true
    }
}
