//! Storage accounts, blobs, queues and tables.

mod service;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

pub use service::{BlobEncoding, StorageService};

use super::failure;
use crate::context::AzureContext;
use crate::error::ToolResult;
use crate::registry::ToolRegistry;
use crate::service::AzureService;
use crate::tool::{AzureTool, ToolMetadata};
use service::{validate_account_name, BlobUpload};

pub(crate) fn register(registry: &mut ToolRegistry) {
    registry.register::<StorageAccountListTool>("storage", Some("account"));
    registry.register::<StorageAccountGetTool>("storage", Some("account"));
    registry.register::<StorageContainerListTool>("storage", Some("container"));
    registry.register::<StorageBlobListTool>("storage", Some("blob"));
    registry.register::<StorageBlobReadTool>("storage", Some("blob"));
    registry.register::<StorageBlobWriteTool>("storage", Some("blob"));
    registry.register::<StorageBlobDeleteTool>("storage", Some("blob"));
    registry.register::<StorageQueueListTool>("storage", Some("queue"));
    registry.register::<StorageTableQueryTool>("storage", Some("table"));
}

fn storage(ctx: &AzureContext) -> StorageService {
    StorageService::new(AzureService::new(ctx))
}

fn default_max_results() -> u32 {
    100
}

fn default_max_size() -> u64 {
    10 * 1024 * 1024
}

fn default_overwrite() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct StorageAccountListOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group to filter by. Leave empty for all resource groups.
    #[serde(default)]
    pub resource_group: String,
}

#[derive(Debug, Default)]
pub struct StorageAccountListTool;

#[async_trait]
impl AzureTool for StorageAccountListTool {
    type Options = StorageAccountListOptions;

    fn name(&self) -> &'static str {
        "storage_account_list"
    }

    fn description(&self) -> &'static str {
        "List Azure Storage accounts in a subscription. Returns name, location, kind, \
         SKU, access tier and primary endpoints. Optionally filter by resource group."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        storage(ctx)
            .list_accounts(&options.subscription, Some(&options.resource_group))
            .await
            .map(Value::Array)
            .map_err(failure("Storage Accounts"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct StorageAccountGetOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Name of the storage account.
    #[validate(custom(function = "validate_account_name"))]
    pub account_name: String,
    /// Resource group containing the account (optional, narrows the lookup).
    #[serde(default)]
    pub resource_group: String,
}

#[derive(Debug, Default)]
pub struct StorageAccountGetTool;

#[async_trait]
impl AzureTool for StorageAccountGetTool {
    type Options = StorageAccountGetOptions;

    fn name(&self) -> &'static str {
        "storage_account_get"
    }

    fn description(&self) -> &'static str {
        "Get details of an Azure Storage account: SKU, endpoints, network rules, \
         encryption, TLS and public access settings."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        storage(ctx)
            .get_account(
                &options.subscription,
                &options.account_name,
                Some(&options.resource_group),
            )
            .await
            .map_err(failure("Storage Account"))
    }
}

// ---------------------------------------------------------------------------
// Containers and blobs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct StorageContainerListOptions {
    /// Name of the storage account.
    #[validate(custom(function = "validate_account_name"))]
    pub account_name: String,
    /// Prefix to filter container names.
    #[serde(default)]
    pub prefix: String,
    /// Maximum number of containers to return (1-1000).
    #[serde(default = "default_max_results")]
    #[validate(range(min = 1, max = 1000))]
    pub max_results: u32,
}

#[derive(Debug, Default)]
pub struct StorageContainerListTool;

#[async_trait]
impl AzureTool for StorageContainerListTool {
    type Options = StorageContainerListOptions;

    fn name(&self) -> &'static str {
        "storage_container_list"
    }

    fn description(&self) -> &'static str {
        "List blob containers in an Azure Storage account with lease state, public \
         access level and metadata."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        storage(ctx)
            .list_containers(&options.account_name, &options.prefix, options.max_results)
            .await
            .map(Value::Array)
            .map_err(failure("Storage Containers"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct StorageBlobListOptions {
    /// Name of the storage account.
    #[validate(custom(function = "validate_account_name"))]
    pub account_name: String,
    /// Name of the container to list blobs from.
    #[validate(length(min = 1))]
    pub container_name: String,
    /// Prefix to filter blob names. Leave empty for all blobs.
    #[serde(default)]
    pub prefix: String,
    /// Maximum number of blobs to return (1-1000).
    #[serde(default = "default_max_results")]
    #[validate(range(min = 1, max = 1000))]
    pub max_results: u32,
    /// Whether to include blob metadata in results.
    #[serde(default)]
    pub include_metadata: bool,
}

#[derive(Debug, Default)]
pub struct StorageBlobListTool;

#[async_trait]
impl AzureTool for StorageBlobListTool {
    type Options = StorageBlobListOptions;

    fn name(&self) -> &'static str {
        "storage_blob_list"
    }

    fn description(&self) -> &'static str {
        "List blobs in an Azure Storage container. Returns blob names, sizes, content \
         types and last modified times. Can be filtered by prefix and optionally \
         include metadata."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        storage(ctx)
            .list_blobs(
                &options.account_name,
                &options.container_name,
                &options.prefix,
                options.max_results,
                options.include_metadata,
            )
            .await
            .map(Value::Array)
            .map_err(failure("Storage Blobs"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct StorageBlobReadOptions {
    /// Name of the storage account.
    #[validate(custom(function = "validate_account_name"))]
    pub account_name: String,
    /// Name of the container.
    #[validate(length(min = 1))]
    pub container_name: String,
    /// Name of the blob to read.
    #[validate(length(min = 1))]
    pub blob_name: String,
    /// Encoding for content. `auto` detects text vs binary and returns base64
    /// for binary. Use `base64` to force base64.
    #[serde(default)]
    pub encoding: BlobEncoding,
    /// Maximum blob size to read in bytes. Default 10MB, max 50MB.
    #[serde(default = "default_max_size")]
    #[validate(range(min = 1, max = 52428800))]
    pub max_size_bytes: u64,
}

#[derive(Debug, Default)]
pub struct StorageBlobReadTool;

#[async_trait]
impl AzureTool for StorageBlobReadTool {
    type Options = StorageBlobReadOptions;

    fn name(&self) -> &'static str {
        "storage_blob_read"
    }

    fn description(&self) -> &'static str {
        "Read the content of a blob. Text is returned as-is, binary content as \
         base64. Blobs larger than max_size_bytes are rejected."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        storage(ctx)
            .read_blob(
                &options.account_name,
                &options.container_name,
                &options.blob_name,
                options.encoding,
                options.max_size_bytes,
            )
            .await
            .map_err(failure("Storage Blob"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct StorageBlobWriteOptions {
    /// Name of the storage account.
    #[validate(custom(function = "validate_account_name"))]
    pub account_name: String,
    /// Name of the container.
    #[validate(length(min = 1))]
    pub container_name: String,
    /// Name of the blob to write.
    #[validate(length(min = 1))]
    pub blob_name: String,
    /// Content to write: text, or base64 when `encoding` is `base64`.
    pub content: String,
    /// MIME type of the content.
    #[serde(default)]
    pub content_type: String,
    /// Encoding of `content`.
    #[serde(default = "utf8")]
    pub encoding: BlobEncoding,
    /// Overwrite an existing blob.
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
}

fn utf8() -> BlobEncoding {
    BlobEncoding::Utf8
}

#[derive(Debug, Default)]
pub struct StorageBlobWriteTool;

#[async_trait]
impl AzureTool for StorageBlobWriteTool {
    type Options = StorageBlobWriteOptions;

    fn name(&self) -> &'static str {
        "storage_blob_write"
    }

    fn description(&self) -> &'static str {
        "Write content to a block blob. Text or base64 content is accepted. \
         Existing blobs are overwritten unless overwrite is false."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::DESTRUCTIVE
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let data = options.encoding.encode(&options.content)?;
        storage(ctx)
            .write_blob(BlobUpload {
                account: &options.account_name,
                container: &options.container_name,
                blob: &options.blob_name,
                data,
                content_type: Some(&options.content_type),
                overwrite: options.overwrite,
            })
            .await
            .map_err(failure("Storage Blob"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct StorageBlobDeleteOptions {
    /// Name of the storage account.
    #[validate(custom(function = "validate_account_name"))]
    pub account_name: String,
    /// Name of the container.
    #[validate(length(min = 1))]
    pub container_name: String,
    /// Name of the blob to delete.
    #[validate(length(min = 1))]
    pub blob_name: String,
}

#[derive(Debug, Default)]
pub struct StorageBlobDeleteTool;

#[async_trait]
impl AzureTool for StorageBlobDeleteTool {
    type Options = StorageBlobDeleteOptions;

    fn name(&self) -> &'static str {
        "storage_blob_delete"
    }

    fn description(&self) -> &'static str {
        "Delete a blob from an Azure Storage container, including its snapshots. \
         This cannot be undone unless soft-delete is enabled on the account."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::DESTRUCTIVE
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        storage(ctx)
            .delete_blob(
                &options.account_name,
                &options.container_name,
                &options.blob_name,
            )
            .await
            .map_err(failure("Storage Blob"))
    }
}

// ---------------------------------------------------------------------------
// Queues and tables
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct StorageQueueListOptions {
    /// Name of the storage account.
    #[validate(custom(function = "validate_account_name"))]
    pub account_name: String,
    /// Prefix to filter queue names.
    #[serde(default)]
    pub prefix: String,
    /// Maximum number of queues to return (1-1000).
    #[serde(default = "default_max_results")]
    #[validate(range(min = 1, max = 1000))]
    pub max_results: u32,
}

#[derive(Debug, Default)]
pub struct StorageQueueListTool;

#[async_trait]
impl AzureTool for StorageQueueListTool {
    type Options = StorageQueueListOptions;

    fn name(&self) -> &'static str {
        "storage_queue_list"
    }

    fn description(&self) -> &'static str {
        "List queues in an Azure Storage account with their metadata."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        storage(ctx)
            .list_queues(&options.account_name, &options.prefix, options.max_results)
            .await
            .map(Value::Array)
            .map_err(failure("Storage Queues"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct StorageTableQueryOptions {
    /// Name of the storage account.
    #[validate(custom(function = "validate_account_name"))]
    pub account_name: String,
    /// Name of the table to query.
    #[validate(length(min = 1))]
    pub table_name: String,
    /// OData filter, e.g. `PartitionKey eq 'pk1'`. Leave empty for all entities.
    #[serde(default)]
    pub filter_query: String,
    /// Comma-separated list of properties to return.
    #[serde(default)]
    pub select: String,
    /// Maximum number of entities to return (1-1000).
    #[serde(default = "default_max_results")]
    #[validate(range(min = 1, max = 1000))]
    pub max_results: u32,
}

#[derive(Debug, Default)]
pub struct StorageTableQueryTool;

#[async_trait]
impl AzureTool for StorageTableQueryTool {
    type Options = StorageTableQueryOptions;

    fn name(&self) -> &'static str {
        "storage_table_query"
    }

    fn description(&self) -> &'static str {
        "Query entities from an Azure Storage table using an OData filter, with \
         optional property selection."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        storage(ctx)
            .query_table(
                &options.account_name,
                &options.table_name,
                &options.filter_query,
                &options.select,
                options.max_results,
            )
            .await
            .map(Value::Array)
            .map_err(failure("Storage Table"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::parse_options;
    use crate::tools::raw;
    use serde_json::json;

    #[test]
    fn account_name_must_be_a_plain_label() {
        for bad in ["evil.example#x", "UpperCase", "ab", "has-dash"] {
            let err = parse_options::<StorageContainerListOptions>(raw(json!({
                "account_name": bad,
            })))
            .unwrap_err();
            assert_eq!(err.to_dict()["field"], "account_name", "{bad}");
        }
    }

    #[test]
    fn blob_read_defaults() {
        let opts: StorageBlobReadOptions = parse_options(raw(json!({
            "account_name": "myaccount",
            "container_name": "logs",
            "blob_name": "app.log",
        })))
        .unwrap();
        assert_eq!(opts.encoding, BlobEncoding::Auto);
        assert_eq!(opts.max_size_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn blob_read_rejects_unknown_encoding() {
        let err = parse_options::<StorageBlobReadOptions>(raw(json!({
            "account_name": "myaccount",
            "container_name": "logs",
            "blob_name": "app.log",
            "encoding": "utf-16",
        })))
        .unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
    }

    #[test]
    fn blob_write_defaults_to_utf8_overwrite() {
        let opts: StorageBlobWriteOptions = parse_options(raw(json!({
            "account_name": "myaccount",
            "container_name": "logs",
            "blob_name": "note.txt",
            "content": "hello",
        })))
        .unwrap();
        assert_eq!(opts.encoding, BlobEncoding::Utf8);
        assert!(opts.overwrite);
    }

    #[test]
    fn max_results_is_bounded() {
        assert!(parse_options::<StorageBlobListOptions>(raw(json!({
            "account_name": "myaccount",
            "container_name": "logs",
            "max_results": 0,
        })))
        .is_err());
    }

    #[tokio::test]
    async fn invalid_base64_fails_before_any_request() {
        let ctx = AzureContext::for_tests();
        let err = StorageBlobWriteTool
            .execute(
                &ctx,
                parse_options(raw(json!({
                    "account_name": "myaccount",
                    "container_name": "logs",
                    "blob_name": "b.bin",
                    "content": "***",
                    "encoding": "base64",
                })))
                .unwrap(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
    }

    #[test]
    fn write_and_delete_are_flagged_destructive() {
        assert!(AzureTool::metadata(&StorageBlobDeleteTool).destructive);
        assert!(AzureTool::metadata(&StorageBlobWriteTool).destructive);
        assert!(AzureTool::metadata(&StorageBlobListTool).read_only);
    }
}
