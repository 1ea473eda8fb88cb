//! Standard component library
//!
//! Collection of built-in components for common operations

mod debug;
mod http;
mod time;
mod transform;

pub use debug::EchoComponent;
pub use http::HttpComponent;
pub use time::DelayComponent;
pub use transform::JsonTransformComponent;
use relayruntime::ComponentRegistry;

use std::sync::Arc;

/// Register all standard components with a registry
pub fn register_all(registry: &mut ComponentRegistry) {
    registry.register(Arc::new(EchoComponent));
    registry.register(Arc::new(HttpComponent::new()));
    registry.register(Arc::new(JsonTransformComponent));
    registry.register(Arc::new(DelayComponent));
}
