use crate::{RuntimeConfig, RuntimeError};
use relaycore::Workflow;
use std::path::Path;

/// Read a workflow definition from a JSON file
pub fn load_workflow(path: impl AsRef<Path>) -> Result<Workflow, RuntimeError> {
    let path = path.as_ref();
    tracing::debug!("Loading workflow from {}", path.display());
    let json = std::fs::read_to_string(path)?;
    parse_workflow(&json)
}

/// Parse a workflow definition and run its structural checks
pub fn parse_workflow(json: &str) -> Result<Workflow, RuntimeError> {
    let workflow: Workflow = serde_json::from_str(json)?;
    workflow.validate_definition()?;
    Ok(workflow)
}

/// Read engine configuration from a JSON file. Missing fields take their
/// defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<RuntimeConfig, RuntimeError> {
    let json = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&json)?)
}
