//! Cosmos DB accounts, databases, containers and items.
//!
//! Account discovery goes through Resource Graph.  Everything else talks to
//! the account data plane through `azure_data_cosmos`.

mod service;

use async_trait::async_trait;
use azure_data_cosmos::Query;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use validator::Validate;

pub use service::{partition_key_from, ContainerRef, CosmosService, MAX_ITEMS_CAP};

use super::failure;
use crate::context::AzureContext;
use crate::error::{ToolError, ToolResult};
use crate::registry::ToolRegistry;
use crate::service::AzureService;
use crate::tool::{AzureTool, ToolMetadata};

pub(crate) fn register(registry: &mut ToolRegistry) {
    registry.register::<CosmosAccountListTool>("cosmos", Some("account"));
    registry.register::<CosmosDatabaseListTool>("cosmos", Some("database"));
    registry.register::<CosmosContainerListTool>("cosmos", Some("container"));
    registry.register::<CosmosItemQueryTool>("cosmos", Some("item"));
    registry.register::<CosmosItemGetTool>("cosmos", Some("item"));
    registry.register::<CosmosItemUpsertTool>("cosmos", Some("item"));
    registry.register::<CosmosItemDeleteTool>("cosmos", Some("item"));
}

fn cosmos(ctx: &AzureContext) -> CosmosService {
    CosmosService::new(AzureService::new(ctx))
}

/// Resolve endpoint and database against the configured defaults.
fn container_ref(
    ctx: &AzureContext,
    endpoint: Option<&str>,
    database: Option<&str>,
    container: &str,
) -> ToolResult<ContainerRef> {
    Ok(ContainerRef {
        endpoint: ctx.config.cosmos_endpoint(endpoint)?,
        database: ctx.config.cosmos_database(database)?,
        container: container.to_string(),
    })
}

fn default_account_limit() -> u32 {
    50
}

fn default_max_items() -> u32 {
    100
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    #[default]
    Summary,
    Full,
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CosmosAccountListOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group to filter by. Leave empty for all resource groups.
    #[serde(default)]
    pub resource_group: String,
    /// 'summary' returns key fields only; 'full' returns the complete resource.
    #[serde(default)]
    pub detail_level: DetailLevel,
    /// Maximum number of accounts to return (1-200).
    #[serde(default = "default_account_limit")]
    #[validate(range(min = 1, max = 200))]
    pub limit: u32,
}

#[derive(Debug, Default)]
pub struct CosmosAccountListTool;

#[async_trait]
impl AzureTool for CosmosAccountListTool {
    type Options = CosmosAccountListOptions;

    fn name(&self) -> &'static str {
        "cosmos_account_list"
    }

    fn description(&self) -> &'static str {
        "List Azure Cosmos DB accounts in a subscription. Returns the document \
         endpoint needed by the other cosmos tools, plus consistency level, \
         locations and capacity mode."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        cosmos(ctx)
            .list_accounts(
                &options.subscription,
                &options.resource_group,
                options.detail_level == DetailLevel::Full,
                options.limit,
            )
            .await
            .map(Value::Array)
            .map_err(failure("Cosmos DB Accounts"))
    }
}

// ---------------------------------------------------------------------------
// Databases and containers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CosmosDatabaseListOptions {
    /// Cosmos DB account endpoint, e.g. 'https://myaccount.documents.azure.com:443/'.
    /// Defaults to COSMOS_ENDPOINT.
    #[serde(default)]
    pub account_endpoint: Option<String>,
}

#[derive(Debug, Default)]
pub struct CosmosDatabaseListTool;

#[async_trait]
impl AzureTool for CosmosDatabaseListTool {
    type Options = CosmosDatabaseListOptions;

    fn name(&self) -> &'static str {
        "cosmos_database_list"
    }

    fn description(&self) -> &'static str {
        "List databases in an Azure Cosmos DB account. Use cosmos_account_list to \
         find the account endpoint."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let endpoint = ctx
            .config
            .cosmos_endpoint(options.account_endpoint.as_deref())?;
        cosmos(ctx)
            .list_databases(&endpoint)
            .await
            .map(Value::Array)
            .map_err(failure("Cosmos DB Databases"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CosmosContainerListOptions {
    /// Cosmos DB account endpoint. Defaults to COSMOS_ENDPOINT.
    #[serde(default)]
    pub account_endpoint: Option<String>,
    /// Database name. Defaults to COSMOS_DEFAULT_DATABASE.
    #[serde(default)]
    pub database_name: Option<String>,
}

#[derive(Debug, Default)]
pub struct CosmosContainerListTool;

#[async_trait]
impl AzureTool for CosmosContainerListTool {
    type Options = CosmosContainerListOptions;

    fn name(&self) -> &'static str {
        "cosmos_container_list"
    }

    fn description(&self) -> &'static str {
        "List containers in a Cosmos DB database with their partition key paths, \
         indexing policy and default TTL."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let endpoint = ctx
            .config
            .cosmos_endpoint(options.account_endpoint.as_deref())?;
        let database = ctx
            .config
            .cosmos_database(options.database_name.as_deref())?;
        cosmos(ctx)
            .list_containers(&endpoint, &database)
            .await
            .map(Value::Array)
            .map_err(failure("Cosmos DB Containers"))
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// A named query parameter, e.g. `{"name": "@status", "value": "active"}`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryParameter {
    /// Parameter name including the leading '@'.
    pub name: String,
    /// Parameter value.
    pub value: Value,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CosmosItemQueryOptions {
    /// Cosmos DB account endpoint. Defaults to COSMOS_ENDPOINT.
    #[serde(default)]
    pub account_endpoint: Option<String>,
    /// Database name. Defaults to COSMOS_DEFAULT_DATABASE.
    #[serde(default)]
    pub database_name: Option<String>,
    /// Container name. Obtain from cosmos_container_list.
    #[validate(length(min = 1))]
    pub container_name: String,
    /// SQL query, e.g. 'SELECT * FROM c WHERE c.status = @status'.
    #[validate(length(min = 1))]
    pub query: String,
    /// Values for the @placeholders in the query.
    #[serde(default)]
    pub parameters: Vec<QueryParameter>,
    /// Partition key value to scope the query. Omit for a cross-partition query.
    #[serde(default)]
    pub partition_key: Value,
    /// Maximum number of items to return (1-5000).
    #[serde(default = "default_max_items")]
    #[validate(range(min = 1, max = 5000))]
    pub max_items: u32,
}

/// Attach `parameters` to `sql`. Names must start with '@'.
pub fn build_query(sql: &str, parameters: &[QueryParameter]) -> ToolResult<Query> {
    let mut query = Query::from(sql.to_string());
    for param in parameters {
        if !param.name.starts_with('@') {
            return Err(ToolError::validation_field(
                format!("Query parameter '{}' must start with '@'", param.name),
                "parameters",
            ));
        }
        query = query
            .with_parameter(param.name.clone(), param.value.clone())
            .map_err(|err| {
                ToolError::validation_field(
                    format!("Invalid value for parameter '{}': {err}", param.name),
                    "parameters",
                )
            })?;
    }
    Ok(query)
}

#[derive(Debug, Default)]
pub struct CosmosItemQueryTool;

#[async_trait]
impl AzureTool for CosmosItemQueryTool {
    type Options = CosmosItemQueryOptions;

    fn name(&self) -> &'static str {
        "cosmos_item_query"
    }

    fn description(&self) -> &'static str {
        "Query items in a Cosmos DB container using SQL syntax. Use @name \
         placeholders with the parameters option instead of string concatenation."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let target = container_ref(
            ctx,
            options.account_endpoint.as_deref(),
            options.database_name.as_deref(),
            &options.container_name,
        )?;
        let query = build_query(&options.query, &options.parameters)?;
        let partition_key = partition_key_from(&options.partition_key)?;

        let items = cosmos(ctx)
            .query_items(&target, query, partition_key, options.max_items)
            .await
            .map_err(failure("Cosmos DB Items"))?;
        Ok(json!({
            "items": items,
            "count": items.len(),
        }))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CosmosItemGetOptions {
    /// Cosmos DB account endpoint. Defaults to COSMOS_ENDPOINT.
    #[serde(default)]
    pub account_endpoint: Option<String>,
    /// Database name. Defaults to COSMOS_DEFAULT_DATABASE.
    #[serde(default)]
    pub database_name: Option<String>,
    /// Container name.
    #[validate(length(min = 1))]
    pub container_name: String,
    /// The item's 'id'.
    #[validate(length(min = 1))]
    pub item_id: String,
    /// Partition key value of the item (string or integer).
    pub partition_key: Value,
}

#[derive(Debug, Default)]
pub struct CosmosItemGetTool;

#[async_trait]
impl AzureTool for CosmosItemGetTool {
    type Options = CosmosItemGetOptions;

    fn name(&self) -> &'static str {
        "cosmos_item_get"
    }

    fn description(&self) -> &'static str {
        "Read a single Cosmos DB item by id and partition key. Cheaper than a \
         query when both values are known."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let target = container_ref(
            ctx,
            options.account_endpoint.as_deref(),
            options.database_name.as_deref(),
            &options.container_name,
        )?;
        let partition_key = partition_key_from(&options.partition_key)?;
        cosmos(ctx)
            .get_item(&target, &options.item_id, partition_key)
            .await
            .map_err(failure("Cosmos DB Item"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CosmosItemUpsertOptions {
    /// Cosmos DB account endpoint. Defaults to COSMOS_ENDPOINT.
    #[serde(default)]
    pub account_endpoint: Option<String>,
    /// Database name. Defaults to COSMOS_DEFAULT_DATABASE.
    #[serde(default)]
    pub database_name: Option<String>,
    /// Container name.
    #[validate(length(min = 1))]
    pub container_name: String,
    /// The item to create or replace. Must include an 'id' field and the
    /// container's partition key field.
    pub item: Map<String, Value>,
    /// Value of the item's partition key field (string or integer).
    pub partition_key: Value,
}

#[derive(Debug, Default)]
pub struct CosmosItemUpsertTool;

#[async_trait]
impl AzureTool for CosmosItemUpsertTool {
    type Options = CosmosItemUpsertOptions;

    fn name(&self) -> &'static str {
        "cosmos_item_upsert"
    }

    fn description(&self) -> &'static str {
        "Create or replace an item in a Cosmos DB container. An existing item with \
         the same id and partition key is overwritten. WARNING: modifies data."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::DESTRUCTIVE
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        if !options.item.get("id").is_some_and(Value::is_string) {
            return Err(ToolError::validation_field(
                "item must include a string 'id' field",
                "item",
            ));
        }
        let target = container_ref(
            ctx,
            options.account_endpoint.as_deref(),
            options.database_name.as_deref(),
            &options.container_name,
        )?;
        let partition_key = partition_key_from(&options.partition_key)?;
        cosmos(ctx)
            .upsert_item(&target, partition_key, Value::Object(options.item))
            .await
            .map_err(failure("Cosmos DB Item"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CosmosItemDeleteOptions {
    /// Cosmos DB account endpoint. Defaults to COSMOS_ENDPOINT.
    #[serde(default)]
    pub account_endpoint: Option<String>,
    /// Database name. Defaults to COSMOS_DEFAULT_DATABASE.
    #[serde(default)]
    pub database_name: Option<String>,
    /// Container name.
    #[validate(length(min = 1))]
    pub container_name: String,
    /// The 'id' of the item to delete.
    #[validate(length(min = 1))]
    pub item_id: String,
    /// Partition key value of the item (string or integer).
    pub partition_key: Value,
}

#[derive(Debug, Default)]
pub struct CosmosItemDeleteTool;

#[async_trait]
impl AzureTool for CosmosItemDeleteTool {
    type Options = CosmosItemDeleteOptions;

    fn name(&self) -> &'static str {
        "cosmos_item_delete"
    }

    fn description(&self) -> &'static str {
        "Permanently delete an item from a Cosmos DB container by id and partition \
         key. WARNING: this cannot be undone."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::DESTRUCTIVE
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let target = container_ref(
            ctx,
            options.account_endpoint.as_deref(),
            options.database_name.as_deref(),
            &options.container_name,
        )?;
        let partition_key = partition_key_from(&options.partition_key)?;
        cosmos(ctx)
            .delete_item(&target, &options.item_id, partition_key)
            .await
            .map_err(failure("Cosmos DB Item"))?;
        Ok(json!({
            "deleted": true,
            "item_id": options.item_id,
            "partition_key": options.partition_key,
        }))
    }
}
