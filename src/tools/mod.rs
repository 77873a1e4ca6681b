//! Tool families.
//!
//! Each family module exposes a `register` function that adds its tools to a
//! [`ToolRegistry`] under the family's group name.

pub mod appinsights;
pub mod bing;
pub mod communication;
pub mod cosmos;
pub mod cost;
pub mod entraid;
pub mod monitor;
pub mod rbac;
pub mod resourcegraph;
pub mod search;
pub mod storage;

use crate::azure_error::{handle_azure_error, AzureFailure};
use crate::error::ToolError;
use crate::registry::ToolRegistry;

/// Adapter for `map_err` that classifies a failure against `resource`.
pub(crate) fn failure(resource: &'static str) -> impl Fn(AzureFailure) -> ToolError {
    move |err| handle_azure_error(err, Some(resource))
}

/// Register every tool family.
pub fn register_all(registry: &mut ToolRegistry) {
    registry.register::<resourcegraph::ResourceGraphQueryTool>("resourcegraph", None);
    storage::register(registry);
    cosmos::register(registry);
    monitor::register(registry);
    appinsights::register(registry);
    entraid::register(registry);
    bing::register(registry);
    cost::register(registry);
    search::register(registry);
    communication::register(registry);
    rbac::register(registry);
}

#[cfg(test)]
pub(crate) fn raw(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_family_registers() {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry);
        assert_eq!(registry.len(), 101);
        assert_eq!(
            registry.list_groups(),
            vec![
                "appinsights",
                "bing",
                "communication",
                "cosmos",
                "cost",
                "entraid",
                "monitor",
                "rbac",
                "resourcegraph",
                "search",
                "storage",
            ]
        );
    }

    #[test]
    fn tool_names_carry_their_group_prefix() {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry);
        let names: HashSet<_> = registry.list_tool_names(None).into_iter().collect();
        assert_eq!(names.len(), 101);
        for name in registry.list_tool_names(None) {
            let group = &registry.definition(&name).unwrap().group;
            assert!(name.starts_with(group.as_str()), "{name} not in {group}");
        }
    }

    #[test]
    fn schemas_are_objects() {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry);
        for (name, schema) in registry.get_tool_schemas() {
            assert_eq!(schema["inputSchema"]["type"], "object", "{name}");
        }
    }
}
