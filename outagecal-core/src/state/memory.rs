use crate::error::OutageResult;
use crate::state::{StateStore, TrackedState};

/// State that lives only as long as the process. Used for dry runs and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    state: TrackedState,
    saves: usize,
}

impl MemoryStateStore {
    pub fn new(state: TrackedState) -> Self {
        MemoryStateStore { state, saves: 0 }
    }

    pub fn state(&self) -> &TrackedState {
        &self.state
    }

    /// Number of successful `save` calls.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> TrackedState {
        self.state.clone()
    }

    fn save(&mut self, state: &TrackedState) -> OutageResult<()> {
        self.state = state.clone();
        self.saves += 1;
        Ok(())
    }
}
