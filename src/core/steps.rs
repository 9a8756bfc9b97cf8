use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::models::{Step, StepStatus, StepView, FLOW_STEPS};

/// Ordered registry of pipeline steps and their current status.
///
/// Cloning is cheap and every clone shares the same state. Readers take a
/// snapshot; only the active run writes.
#[derive(Debug, Clone)]
pub struct StepTracker {
    steps: &'static [Step],
    state: Arc<RwLock<HashMap<&'static str, StepStatus>>>,
}

impl Default for StepTracker {
    fn default() -> Self {
        Self::new(FLOW_STEPS)
    }
}

impl StepTracker {
    pub fn new(steps: &'static [Step]) -> Self {
        let state = steps.iter().map(|s| (s.id, StepStatus::Pending)).collect();
        Self {
            steps,
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn reset(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        for step in self.steps {
            state.insert(step.id, StepStatus::Pending);
        }
    }

    /// Unknown ids are ignored.
    pub fn transition(&self, id: &str, status: StepStatus) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = state.get_mut(id) {
            tracing::debug!("step {}: {} -> {}", id, current, status);
            *current = status;
        }
    }

    pub fn status(&self, id: &str) -> Option<StepStatus> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.get(id).copied()
    }

    pub fn snapshot(&self) -> Vec<StepView> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        self.steps
            .iter()
            .map(|step| StepView {
                id: step.id,
                label: step.label,
                status: state.get(step.id).copied().unwrap_or(StepStatus::Pending),
            })
            .collect()
    }
}
