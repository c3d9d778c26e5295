//! State tracking for one synchronization run

use crate::error::{Error, Result};
use crate::types::{SyncPhase, SyncState};

/// Tracks the state of a run and rejects out-of-order transitions
#[derive(Debug)]
pub(crate) struct SyncRun {
    state: SyncState,
}

impl SyncRun {
    pub(crate) fn new() -> Self {
        Self {
            state: SyncState::Uninitialized,
        }
    }

    pub(crate) fn state(&self) -> SyncState {
        self.state
    }

    /// Move to `next`. An illegal step means the orchestrator has a bug.
    pub(crate) fn advance(&mut self, next: SyncState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::Other(format!(
                "illegal synchronization state transition {} -> {}",
                self.state, next
            )));
        }

        tracing::debug!(from = %self.state, to = %next, "Synchronization state changed");
        self.state = next;
        Ok(())
    }

    /// Record that `phase` finished
    pub(crate) fn complete(&mut self, phase: SyncPhase) -> Result<()> {
        self.advance(phase.target_state())
    }

    /// Mark the run failed unless it already finished
    pub(crate) fn fail(&mut self) {
        if !self.state.is_terminal() {
            tracing::debug!(from = %self.state, "Synchronization failed");
            self.state = SyncState::Failed;
        }
    }
}
