use std::sync::Arc;
use std::time::Instant;

use rmcp::{
    model::{
        CallToolRequestParams, CallToolResult, Content, ErrorData, Implementation, JsonObject,
        ListToolsResult, PaginatedRequestParams, ProtocolVersion, ServerCapabilities, ServerInfo,
        Tool, ToolAnnotations,
    },
    service::RequestContext,
    RoleServer, ServerHandler,
};
use serde_json::Value;

use crate::context::AzureContext;
use crate::error::ToolError;
use crate::registry::ToolRegistry;
use crate::tool::DynTool;

/// MCP server that exposes every registered Azure tool.
///
/// Tool listing and dispatch go through the registry, so the advertised tool
/// set always matches what `call_tool` can run.
#[derive(Clone)]
pub struct AzureMcpServer {
    ctx: AzureContext,
    registry: Arc<ToolRegistry>,
}

fn describe(tool: &dyn DynTool) -> Tool {
    let schema = match tool.input_schema() {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    };
    let meta = tool.metadata();
    let mut described = Tool::new(tool.name(), tool.description(), Arc::new(schema));
    described.annotations = Some(ToolAnnotations {
        read_only_hint: Some(meta.read_only),
        destructive_hint: Some(meta.destructive),
        idempotent_hint: Some(meta.idempotent),
        open_world_hint: Some(true),
        ..Default::default()
    });
    described
}

fn error_result(err: &ToolError) -> CallToolResult {
    CallToolResult::error(vec![Content::text(err.to_dict().to_string())])
}

impl AzureMcpServer {
    pub fn new(ctx: AzureContext, registry: ToolRegistry) -> Self {
        Self {
            ctx,
            registry: Arc::new(registry),
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.registry
            .list_tools(None)
            .iter()
            .map(|tool| describe(tool.as_ref()))
            .collect()
    }

    /// Run one tool. Tool failures come back as error results carrying the
    /// serialized [`ToolError`]; only an unknown tool name is a protocol error.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, ErrorData> {
        let tool = self
            .registry
            .get_tool(name)
            .ok_or_else(|| ErrorData::invalid_params(format!("Unknown tool: {name}"), None))?;

        let started = Instant::now();
        let outcome = tool.run(&self.ctx, arguments.unwrap_or_default()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                tracing::info!(tool = name, elapsed_ms, "tool call succeeded");
                let text = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(err) => {
                tracing::warn!(
                    tool = name,
                    elapsed_ms,
                    kind = err.kind_name(),
                    error = %err,
                    "tool call failed"
                );
                Ok(error_result(&err))
            }
        }
    }
}

impl ServerHandler for AzureMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "azure-mcp-server".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Tools for Azure resources, named {family}_{resource}_{action}. \
                 Families: resourcegraph, storage, cosmos, monitor, appinsights, \
                 entraid, bing, cost, search, communication and rbac. Subscriptions \
                 may be given by ID or display name. Check each tool's annotations \
                 before calling write or delete operations."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.dispatch(&request.name, request.arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::tests::EchoTool;
    use serde_json::json;

    fn server() -> AzureMcpServer {
        let mut registry = ToolRegistry::new();
        registry.register::<EchoTool>("test", None);
        AzureMcpServer::new(AzureContext::for_tests(), registry)
    }

    fn text(result: &CallToolResult) -> String {
        result.content[0]
            .as_text()
            .map(|t| t.text.clone())
            .unwrap_or_default()
    }

    #[test]
    fn server_info_advertises_tools() {
        let info = server().get_info();
        assert_eq!(info.server_info.name, "azure-mcp-server");
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn tools_carry_schema_and_annotations() {
        let tools = server().tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "test_echo_run");
        assert_eq!(tools[0].input_schema["type"], "object");
        let annotations = tools[0].annotations.as_ref().unwrap();
        assert_eq!(annotations.read_only_hint, Some(true));
        assert_eq!(annotations.destructive_hint, Some(false));
    }

    #[test]
    fn every_registered_tool_is_listed() {
        let mut registry = ToolRegistry::new();
        crate::tools::register_all(&mut registry);
        let expected = registry.len();
        let server = AzureMcpServer::new(AzureContext::for_tests(), registry);
        assert_eq!(server.tools().len(), expected);
    }

    #[tokio::test]
    async fn successful_call_returns_text() {
        let args = json!({ "value": "hi", "repeat": 2 }).as_object().cloned();
        let result = server().dispatch("test_echo_run", args).await.unwrap();
        assert_ne!(result.is_error, Some(true));
        assert!(text(&result).contains("hihi"));
    }

    #[tokio::test]
    async fn validation_failure_is_an_error_result() {
        let result = server().dispatch("test_echo_run", None).await.unwrap();
        assert_eq!(result.is_error, Some(true));
        let payload: Value = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(payload["error"], "ValidationError");
        assert_eq!(payload["field"], "value");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_protocol_error() {
        assert!(server().dispatch("nope", None).await.is_err());
    }
}
