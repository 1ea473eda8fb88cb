use relaycore::{Component, StepError};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available components, keyed by name
pub struct ComponentRegistry {
    components: HashMap<String, Arc<dyn Component>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            components: HashMap::new(),
        }
    }

    /// Register a component under its own name, replacing any previous one
    pub fn register(&mut self, component: Arc<dyn Component>) {
        let name = component.name().to_string();
        tracing::info!("Registering component: {}", name);
        self.components.insert(name, component);
    }

    /// Look up a component. A missing name is a configuration error.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Component>, StepError> {
        self.components
            .get(name)
            .cloned()
            .ok_or_else(|| StepError::ComponentNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Get all registered component names, sorted
    pub fn list_components(&self) -> Vec<String> {
        let mut names: Vec<String> = self.components.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
