use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use super::failure;
use crate::context::AzureContext;
use crate::error::ToolResult;
use crate::service::AzureService;
use crate::tool::{AzureTool, ToolMetadata};

/// Options for `resourcegraph_query`.
#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ResourceGraphQueryOptions {
    /// Kusto Query Language (KQL) query to execute against Azure Resource Graph.
    #[validate(length(min = 1))]
    pub query: String,
    /// Subscription IDs to query. Empty queries every accessible subscription.
    #[serde(default)]
    pub subscriptions: Vec<String>,
    /// Management group IDs to query. Takes precedence over subscriptions.
    #[serde(default)]
    pub management_groups: Vec<String>,
    /// Number of rows to skip for pagination.
    #[serde(default)]
    pub skip: u32,
    /// Maximum number of rows to return (1-1000).
    #[serde(default = "default_top")]
    #[validate(range(min = 1, max = 1000))]
    pub top: u32,
}

fn default_top() -> u32 {
    100
}

#[derive(Debug, Default)]
pub struct ResourceGraphQueryTool;

#[async_trait]
impl AzureTool for ResourceGraphQueryTool {
    type Options = ResourceGraphQueryOptions;

    fn name(&self) -> &'static str {
        "resourcegraph_query"
    }

    fn description(&self) -> &'static str {
        "Execute a KQL query against Azure Resource Graph to search and analyze \
         resources across subscriptions or management groups. Returns the matching \
         rows plus paging metadata (count, total_records, skip_token)."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        AzureService::new(ctx)
            .execute_resource_graph_query(
                &options.query,
                &options.subscriptions,
                &options.management_groups,
                options.skip,
                options.top,
            )
            .await
            .map_err(failure("Resource Graph"))
    }
}
