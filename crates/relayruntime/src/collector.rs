use relaycore::{StepId, StepResult};
use std::collections::HashMap;

/// Per-step outcomes of one run. A second result for the same step
/// replaces the first.
#[derive(Debug, Clone, Default)]
pub struct ResultCollector {
    results: HashMap<StepId, StepResult>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, id: impl Into<StepId>, result: StepResult) {
        self.results.insert(id.into(), result);
    }

    /// Ids of successful steps, sorted
    pub fn completed_steps(&self) -> Vec<StepId> {
        self.ids_where(true)
    }

    /// Ids of failed steps, sorted
    pub fn failed_steps(&self) -> Vec<StepId> {
        self.ids_where(false)
    }

    pub fn get(&self, id: &str) -> Option<&StepResult> {
        self.results.get(id)
    }

    /// Copy of every result
    pub fn all_results(&self) -> HashMap<StepId, StepResult> {
        self.results.clone()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    fn ids_where(&self, success: bool) -> Vec<StepId> {
        let mut ids: Vec<StepId> = self
            .results
            .iter()
            .filter(|(_, r)| r.success == success)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
