use relaycore::{Step, StepId};
use std::collections::HashSet;

/// Tracks which steps of one run are done, failed, or ready.
///
/// Steps are scanned in declaration order, which is also the tie-break when
/// several are ready at once.
#[derive(Debug, Clone)]
pub struct StepQueue {
    steps: Vec<Step>,
    completed: HashSet<StepId>,
    failed: HashSet<StepId>,
}

impl StepQueue {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            completed: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    /// First unfinished step whose dependencies have all completed
    pub fn next_ready_step(&self) -> Option<&Step> {
        self.steps.iter().find(|step| {
            !self.is_finished(&step.id)
                && step.depends_on.iter().all(|dep| self.completed.contains(dep))
        })
    }

    /// True when no step is ready. Blocked steps may still remain.
    pub fn is_empty(&self) -> bool {
        self.next_ready_step().is_none()
    }

    /// Steps neither completed nor failed, in declaration order
    pub fn remaining_steps(&self) -> Vec<&Step> {
        self.steps.iter().filter(|step| !self.is_finished(&step.id)).collect()
    }

    pub fn mark_completed(&mut self, id: &str) {
        self.failed.remove(id);
        self.completed.insert(id.to_string());
    }

    pub fn mark_failed(&mut self, id: &str) {
        self.completed.remove(id);
        self.failed.insert(id.to_string());
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.completed.contains(id)
    }

    pub fn is_failed(&self, id: &str) -> bool {
        self.failed.contains(id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    fn is_finished(&self, id: &str) -> bool {
        self.completed.contains(id) || self.failed.contains(id)
    }
}
