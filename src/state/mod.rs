// State management module
//
// StateManager wraps PipelineState with thread-safe access using Arc<RwLock<T>>
// and emits change events so a front end can follow long-running operations.

use crate::models::{ItemStatus, ModMetadata, Operation, PackagingStage, PipelineState};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Change events emitted when pipeline state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// An operation took ownership of the project directory
    OperationStarted { operation: Operation, total: usize },

    /// Progress or the item being worked on changed
    ProgressUpdated {
        current: usize,
        total: usize,
        current_item: Option<String>,
    },

    /// An archive or file finished
    ItemProcessed {
        item: String,
        status: ItemStatus,
        message: String,
    },

    /// The running operation released the project directory
    OperationFinished {
        operation: Option<Operation>,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        cancelled: bool,
    },

    /// Cancellation was requested; the current item still runs to completion
    CancelRequested,

    /// The packaging state machine moved
    PackagingStageChanged { stage: PackagingStage },

    /// State has been reset
    StateReset,
}

/// Thread-safe pipeline state with event emission
///
/// - [`read()`](Self::read) / [`snapshot()`](Self::snapshot) for reading
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to changes
///
/// Cloning is cheap and every clone observes the same state.
pub struct StateManager {
    state: Arc<RwLock<PipelineState>>,
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(PipelineState::default())),
            state_tx,
        }
    }

    // A panic while holding the lock leaves plain data behind; keep using it.
    fn read_guard(&self) -> RwLockReadGuard<'_, PipelineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, PipelineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cloned copy of the current state
    pub fn snapshot(&self) -> PipelineState {
        self.read_guard().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_running);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&PipelineState) -> R,
    {
        f(&self.read_guard())
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, diffs and broadcasts.
    /// Returns the events that were emitted.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut PipelineState),
    {
        let mut state = self.write_guard();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        self.emit_all(&changes);
        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn emit(&self, change: StateChange) -> StateChange {
        // No subscribers is fine
        let _ = self.state_tx.send(change.clone());
        change
    }

    fn emit_all(&self, changes: &[StateChange]) {
        for change in changes {
            let _ = self.state_tx.send(change.clone());
        }
    }

    fn detect_changes(old: &PipelineState, new: &PipelineState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.is_running != new.is_running {
            if new.is_running {
                if let Some(operation) = new.operation {
                    changes.push(StateChange::OperationStarted {
                        operation,
                        total: new.total,
                    });
                }
            } else {
                changes.push(StateChange::OperationFinished {
                    operation: new.operation.or(old.operation),
                    succeeded: new.succeeded.len(),
                    failed: new.failed.len(),
                    skipped: new.skipped.len(),
                    cancelled: new.cancel_requested,
                });
            }
        }

        if old.progress != new.progress
            || old.total != new.total
            || old.current_item != new.current_item
        {
            changes.push(StateChange::ProgressUpdated {
                current: new.progress,
                total: new.total,
                current_item: new.current_item.clone(),
            });
        }

        if !old.cancel_requested && new.cancel_requested {
            changes.push(StateChange::CancelRequested);
        }

        if old.packaging_stage != new.packaging_stage {
            changes.push(StateChange::PackagingStageChanged {
                stage: new.packaging_stage,
            });
        }

        changes
    }

    // Convenience methods for common state updates

    pub fn is_running(&self) -> bool {
        self.read(|state| state.is_running)
    }

    /// Claim the project for `operation`, or return `None` when another one is running.
    ///
    /// Check and claim happen under one write lock.
    pub fn begin_operation(&self, operation: Operation, total: usize) -> Option<Vec<StateChange>> {
        let mut state = self.write_guard();
        if state.is_running {
            return None;
        }
        let old_state = state.clone();

        state.reset_operation();
        state.operation = Some(operation);
        state.is_running = true;
        state.total = total;

        let changes = Self::detect_changes(&old_state, &state);
        self.emit_all(&changes);
        Some(changes)
    }

    /// Release the project after an operation
    pub fn finish_operation(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.is_running = false;
            state.current_item = None;
        })
    }

    /// Mark the item the pipeline is working on
    pub fn set_current_item(&self, item: impl Into<String>) -> Vec<StateChange> {
        let item = item.into();
        self.update(|state| state.current_item = Some(item))
    }

    /// Record the result of one archive or file
    pub fn add_item_result(
        &self,
        item: impl Into<String>,
        status: ItemStatus,
        message: impl Into<String>,
    ) -> Vec<StateChange> {
        let item = item.into();
        let mut changes = self.update(|state| state.add_result(item.clone(), status));

        changes.push(self.emit(StateChange::ItemProcessed {
            item,
            status,
            message: message.into(),
        }));
        changes
    }

    pub fn request_cancel(&self) -> Vec<StateChange> {
        self.update(|state| {
            if state.is_running {
                state.cancel_requested = true;
            }
        })
    }

    pub fn packaging_stage(&self) -> PackagingStage {
        self.read(|state| state.packaging_stage)
    }

    pub fn set_packaging_stage(&self, stage: PackagingStage) -> Vec<StateChange> {
        self.update(|state| state.packaging_stage = stage)
    }

    pub fn packaging_metadata(&self) -> Option<ModMetadata> {
        self.read(|state| state.packaging_metadata.clone())
    }

    /// Enter `FilesGenerated` together with the metadata the files were written for.
    pub fn mark_files_generated(&self, metadata: ModMetadata) -> Vec<StateChange> {
        self.update(|state| {
            state.packaging_stage = PackagingStage::FilesGenerated;
            state.packaging_metadata = Some(metadata);
        })
    }

    /// Reset operation data (progress and results), keeping the packaging stage
    pub fn reset_operation_state(&self) -> Vec<StateChange> {
        let mut changes = self.update(PipelineState::reset_operation);
        changes.push(self.emit(StateChange::StateReset));
        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
