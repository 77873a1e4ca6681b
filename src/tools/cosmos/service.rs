use std::sync::Arc;

use azure_core::credentials::TokenCredential;
use azure_data_cosmos::{CosmosClient, PartitionKey, Query};
use futures::TryStreamExt;
use serde_json::{json, Value};

use crate::azure_error::AzureResult;
use crate::error::ToolError;
use crate::service::{escape_kql, AzureService};

/// Hard cap on items returned by one query.
pub const MAX_ITEMS_CAP: u32 = 5_000;

const SUMMARY_PROJECTION: &str = " | project id, name, location, resourceGroup, subscriptionId, \
     kind, tags, documentEndpoint = properties.documentEndpoint, \
     consistencyLevel = properties.consistencyPolicy.defaultConsistencyLevel, \
     provisioningState = properties.provisioningState, \
     enableFreeTier = properties.enableFreeTier, capacityMode = properties.capacity.mode, \
     writeLocations = properties.writeLocations, readLocations = properties.readLocations";

/// Which container an item operation targets.
#[derive(Debug, Clone)]
pub struct ContainerRef {
    pub endpoint: String,
    pub database: String,
    pub container: String,
}

/// Convert a JSON partition key value into the SDK type.
///
/// `null` selects a cross-partition operation for queries.
pub fn partition_key_from(value: &Value) -> Result<PartitionKey, ToolError> {
    match value {
        Value::Null => Ok(PartitionKey::EMPTY),
        Value::String(s) => Ok(PartitionKey::from(s.clone())),
        Value::Number(n) => n.as_i64().map(PartitionKey::from).ok_or_else(|| {
            ToolError::validation_field(
                "Numeric partition keys must be integers",
                "partition_key",
            )
        }),
        _ => Err(ToolError::validation_field(
            "partition_key must be a string or an integer",
            "partition_key",
        )),
    }
}

pub struct CosmosService {
    base: AzureService,
}

impl CosmosService {
    pub fn new(base: AzureService) -> Self {
        Self { base }
    }

    /// Key auth when the endpoint is the configured account and `COSMOS_KEY`
    /// is set; the credential chain otherwise.
    fn client(&self, endpoint: &str) -> AzureResult<CosmosClient> {
        let ctx = self.base.context();
        let configured_key = ctx
            .config
            .cosmos
            .as_ref()
            .filter(|c| c.endpoint.trim_end_matches('/') == endpoint.trim_end_matches('/'))
            .and_then(|c| c.key.clone());

        let client = match configured_key {
            Some(key) => CosmosClient::with_key(endpoint, key, None)?,
            None => {
                let credential: Arc<dyn TokenCredential> = ctx.credentials.get_credential(None);
                CosmosClient::new(endpoint, credential, None)?
            }
        };
        Ok(client)
    }

    pub async fn list_accounts(
        &self,
        subscription: &str,
        resource_group: &str,
        full: bool,
        limit: u32,
    ) -> AzureResult<Vec<Value>> {
        let sub_id = self.base.resolve_subscription(subscription, None).await?;
        let mut query =
            String::from("resources | where type =~ 'microsoft.documentdb/databaseaccounts'");
        if !resource_group.is_empty() {
            query.push_str(&format!(
                " | where resourceGroup =~ '{}'",
                escape_kql(resource_group)
            ));
        }
        if !full {
            query.push_str(SUMMARY_PROJECTION);
        }
        query.push_str(&format!(" | limit {limit}"));

        let result = self
            .base
            .execute_resource_graph_query(&query, &[sub_id], &[], 0, limit)
            .await?;
        Ok(result["data"].as_array().cloned().unwrap_or_default())
    }

    pub async fn list_databases(&self, endpoint: &str) -> AzureResult<Vec<Value>> {
        let client = self.client(endpoint)?;
        let mut pager = client.query_databases(Query::from("SELECT * FROM c"), None)?;

        let mut databases = Vec::new();
        while let Some(db) = pager.try_next().await? {
            let raw = serde_json::to_value(&db).unwrap_or(Value::Null);
            databases.push(json!({
                "id": db.id,
                "self": raw["_self"],
                "etag": raw["_etag"],
                "last_modified": raw["_ts"],
            }));
        }
        Ok(databases)
    }

    pub async fn list_containers(&self, endpoint: &str, database: &str) -> AzureResult<Vec<Value>> {
        let client = self.client(endpoint)?;
        let db = client.database_client(database);
        let mut pager = db.query_containers(Query::from("SELECT * FROM c"), None)?;

        let mut containers = Vec::new();
        while let Some(container) = pager.try_next().await? {
            let raw = serde_json::to_value(&container).unwrap_or(Value::Null);
            containers.push(json!({
                "id": container.id.to_string(),
                "etag": raw["_etag"],
                "partition_key": raw["partitionKey"]["paths"],
                "indexing_policy": raw["indexingPolicy"],
                "default_ttl": raw["defaultTtl"],
                "unique_key_policy": raw["uniqueKeyPolicy"],
            }));
        }
        Ok(containers)
    }

    /// Run a SQL-API query. A `PartitionKey::EMPTY` key queries across partitions.
    pub async fn query_items(
        &self,
        target: &ContainerRef,
        query: Query,
        partition_key: PartitionKey,
        max_items: u32,
    ) -> AzureResult<Vec<Value>> {
        let max_items = max_items.min(MAX_ITEMS_CAP) as usize;
        let client = self.client(&target.endpoint)?;
        let container = client
            .database_client(&target.database)
            .container_client(&target.container);

        let mut pager = container.query_items::<Value>(query, partition_key, None)?;
        let mut items = Vec::new();
        while let Some(item) = pager.try_next().await? {
            items.push(item);
            if items.len() >= max_items {
                break;
            }
        }
        Ok(items)
    }

    /// Point read by id and partition key. A missing item surfaces as the
    /// SDK's 404, which maps to `NotFoundError`.
    pub async fn get_item(
        &self,
        target: &ContainerRef,
        item_id: &str,
        partition_key: PartitionKey,
    ) -> AzureResult<Value> {
        let client = self.client(&target.endpoint)?;
        let container = client
            .database_client(&target.database)
            .container_client(&target.container);
        let response = container
            .read_item::<Value>(partition_key, item_id, None)
            .await?;
        Ok(response.into_model()?)
    }

    pub async fn upsert_item(
        &self,
        target: &ContainerRef,
        partition_key: PartitionKey,
        item: Value,
    ) -> AzureResult<Value> {
        let client = self.client(&target.endpoint)?;
        let container = client
            .database_client(&target.database)
            .container_client(&target.container);
        container
            .upsert_item(partition_key, item.clone(), None)
            .await?;
        Ok(item)
    }

    pub async fn delete_item(
        &self,
        target: &ContainerRef,
        item_id: &str,
        partition_key: PartitionKey,
    ) -> AzureResult<()> {
        let client = self.client(&target.endpoint)?;
        let container = client
            .database_client(&target.database)
            .container_client(&target.container);
        container.delete_item(partition_key, item_id, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure_error::handle_azure_error;

    #[test]
    fn partition_keys_accept_strings_and_integers() {
        assert!(partition_key_from(&json!("tenant-1")).is_ok());
        assert!(partition_key_from(&json!(42)).is_ok());
        assert!(partition_key_from(&Value::Null).is_ok());
    }

    #[test]
    fn unsupported_partition_keys_are_validation_errors() {
        let err = partition_key_from(&json!(1.5)).unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
        let err = partition_key_from(&json!({ "a": 1 })).unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
    }

    #[test]
    fn null_partition_key_is_the_empty_key() {
        assert_eq!(partition_key_from(&Value::Null).unwrap(), PartitionKey::EMPTY);
        assert_ne!(partition_key_from(&json!("")).unwrap(), PartitionKey::EMPTY);
    }

    #[test]
    fn missing_item_is_not_found() {
        let sdk = azure_core::Error::with_message(
            azure_core::error::ErrorKind::HttpResponse {
                status: azure_core::http::StatusCode::NotFound,
                error_code: Some("NotFound".into()),
                raw_response: None,
            },
            "Entity with the specified id does not exist in the system.",
        );
        let err = handle_azure_error(sdk, Some("Cosmos DB Item"));
        assert_eq!(err.kind_name(), "NotFoundError");
        assert!(err.message.starts_with("Cosmos DB Item not found"));
    }
}
