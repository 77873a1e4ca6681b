//! Name-keyed table of tool constructors.
//!
//! Built once at startup by [`crate::tools::register_all`]. Every lookup
//! constructs a fresh tool value; tools carry no state between calls.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};

use crate::tool::{AzureTool, DynTool};

pub type ToolConstructor = fn() -> Box<dyn DynTool>;

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub constructor: ToolConstructor,
    pub group: String,
    pub subgroup: Option<String>,
}

fn construct<T: AzureTool + Default + 'static>() -> Box<dyn DynTool> {
    Box::new(T::default())
}

#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under its declared name. A later registration with the
    /// same name replaces the earlier one.
    pub fn register<T>(&mut self, group: &str, subgroup: Option<&str>)
    where
        T: AzureTool + Default + 'static,
    {
        let name = AzureTool::name(&T::default()).to_string();
        tracing::debug!(tool = %name, group, "registered tool");
        self.tools.insert(
            name,
            ToolDefinition {
                constructor: construct::<T>,
                group: group.to_string(),
                subgroup: subgroup.map(str::to_string),
            },
        );
    }

    pub fn get_tool(&self, name: &str) -> Option<Box<dyn DynTool>> {
        self.tools.get(name).map(|def| (def.constructor)())
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    /// Fresh instances of every tool, optionally restricted to one group.
    pub fn list_tools(&self, group: Option<&str>) -> Vec<Box<dyn DynTool>> {
        self.definitions(group)
            .map(|(_, def)| (def.constructor)())
            .collect()
    }

    /// Sorted tool names, optionally restricted to one group.
    pub fn list_tool_names(&self, group: Option<&str>) -> Vec<String> {
        self.definitions(group).map(|(name, _)| name.clone()).collect()
    }

    pub fn list_groups(&self) -> Vec<String> {
        self.tools
            .values()
            .map(|def| def.group.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// `{name: {name, description, inputSchema, metadata}}` for every tool.
    pub fn get_tool_schemas(&self) -> Map<String, Value> {
        self.list_tools(None)
            .into_iter()
            .map(|tool| {
                let schema = json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "inputSchema": tool.input_schema(),
                    "metadata": tool.metadata().to_dict(),
                });
                (tool.name().to_string(), schema)
            })
            .collect()
    }

    /// Drop definitions whose group is not accepted by `keep`.
    pub fn retain_groups(&mut self, keep: impl Fn(&str) -> bool) {
        self.tools.retain(|_, def| keep(&def.group));
    }

    pub fn clear(&mut self) {
        self.tools.clear();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn definitions<'a>(
        &'a self,
        group: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a String, &'a ToolDefinition)> + 'a {
        self.tools
            .iter()
            .filter(move |(_, def)| group.map_or(true, |g| def.group == g))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::tests::EchoTool;

    fn registry_with_echo(group: &str) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register::<EchoTool>(group, Some("echo"));
        registry
    }

    #[test]
    fn register_and_get_tool() {
        let registry = registry_with_echo("test");
        let tool = registry.get_tool("test_echo_run").unwrap();
        assert_eq!(tool.name(), "test_echo_run");
        assert_eq!(
            registry.definition("test_echo_run").unwrap().subgroup.as_deref(),
            Some("echo")
        );
    }

    #[test]
    fn unknown_tool_is_absent() {
        let registry = ToolRegistry::new();
        assert!(registry.get_tool("nonexistent").is_none());
    }

    #[test]
    fn list_tools_filters_by_group() {
        let registry = registry_with_echo("group_a");
        assert_eq!(registry.list_tools(None).len(), 1);
        assert_eq!(registry.list_tools(Some("group_a")).len(), 1);
        assert!(registry.list_tools(Some("group_b")).is_empty());
    }

    #[test]
    fn names_and_groups_are_listed() {
        let registry = registry_with_echo("test");
        assert_eq!(registry.list_tool_names(None), vec!["test_echo_run"]);
        assert_eq!(registry.list_groups(), vec!["test"]);
    }

    #[test]
    fn re_registration_overwrites() {
        let mut registry = registry_with_echo("first");
        registry.register::<EchoTool>("second", None);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.definition("test_echo_run").unwrap().group, "second");
    }

    #[test]
    fn contains_len_and_clear() {
        let mut registry = ToolRegistry::new();
        assert_eq!(registry.len(), 0);
        registry.register::<EchoTool>("test", None);
        assert!(registry.contains("test_echo_run"));
        assert!(!registry.contains("nonexistent"));
        assert_eq!(registry.len(), 1);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn schemas_export_every_tool() {
        let registry = registry_with_echo("test");
        let schemas = registry.get_tool_schemas();
        let echo = &schemas["test_echo_run"];
        assert_eq!(echo["name"], "test_echo_run");
        assert_eq!(echo["inputSchema"]["type"], "object");
        assert_eq!(echo["metadata"]["readOnly"]["value"], true);
    }

    #[test]
    fn retain_groups_drops_disabled_groups() {
        let mut registry = registry_with_echo("storage");
        registry.retain_groups(|g| g == "cosmos");
        assert!(registry.is_empty());
    }
}
