//! Azure AI Search: services, indexes, document queries and document
//! management over the data-plane REST API.

use async_trait::async_trait;
use reqwest::Method;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use validator::Validate;

use super::failure;
use crate::azure_error::AzureResult;
use crate::context::AzureContext;
use crate::error::{ToolError, ToolResult};
use crate::registry::ToolRegistry;
use crate::service::{endpoint_url, escape_kql, AzureService};
use crate::tool::{AzureTool, ToolMetadata};

const SEARCH_SCOPE: &str = "https://search.azure.com/.default";
const SEARCH_API_VERSION: &str = "2024-07-01";

pub(crate) fn register(registry: &mut ToolRegistry) {
    registry.register::<SearchServiceListTool>("search", Some("service"));
    registry.register::<SearchServiceGetTool>("search", Some("service"));
    registry.register::<SearchIndexListTool>("search", Some("index"));
    registry.register::<SearchIndexGetTool>("search", Some("index"));
    registry.register::<SearchIndexStatsTool>("search", Some("index"));
    registry.register::<SearchQueryTool>("search", Some("query"));
    registry.register::<SearchDocumentGetTool>("search", Some("query"));
    registry.register::<SearchSuggestTool>("search", Some("suggest"));
    registry.register::<SearchAutocompleteTool>("search", Some("suggest"));
    registry.register::<SearchDocumentUploadTool>("search", Some("document"));
    registry.register::<SearchDocumentMergeTool>("search", Some("document"));
    registry.register::<SearchDocumentDeleteTool>("search", Some("document"));
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn count_of(value: &Value) -> usize {
    value.as_array().map_or(0, Vec::len)
}

fn index_summary(index: &Value) -> Value {
    json!({
        "name": index["name"],
        "fields_count": count_of(&index["fields"]),
        "suggesters_count": count_of(&index["suggesters"]),
        "scoring_profiles_count": count_of(&index["scoringProfiles"]),
        "analyzers_count": count_of(&index["analyzers"]),
        "semantic_search": !index["semantic"].is_null(),
        "vector_search": !index["vectorSearch"].is_null(),
    })
}

fn service_query(name: Option<&str>, resource_group: &str) -> String {
    let mut query = String::from("resources | where type =~ 'microsoft.search/searchservices'");
    if let Some(name) = name {
        query.push_str(&format!(" | where name =~ '{}'", escape_kql(name)));
    }
    if !resource_group.is_empty() {
        query.push_str(&format!(
            " | where resourceGroup =~ '{}'",
            escape_kql(resource_group)
        ));
    }
    query.push_str(
        " | project name, id, resourceGroup, location, subscriptionId, sku = sku.name, \
         endpoint = strcat('https://', name, '.search.windows.net'), \
         replicaCount = properties.replicaCount, partitionCount = properties.partitionCount, \
         hostingMode = properties.hostingMode, \
         publicNetworkAccess = properties.publicNetworkAccess, \
         status = properties.status, provisioningState = properties.provisioningState",
    );
    if name.is_some() {
        query.push_str(
            ", networkRuleSet = properties.networkRuleSet, \
             encryptionWithCmk = properties.encryptionWithCmk, \
             disableLocalAuth = properties.disableLocalAuth, \
             authOptions = properties.authOptions",
        );
    }
    query
}

fn shape_field(field: &Value) -> Value {
    let mut shaped = json!({
        "name": field["name"],
        "type": field["type"],
        "searchable": field["searchable"],
        "filterable": field["filterable"],
        "sortable": field["sortable"],
        "facetable": field["facetable"],
        "key": field["key"],
        "retrievable": field["retrievable"].as_bool().unwrap_or(true),
    });
    for (from, to) in [
        ("analyzer", "analyzer"),
        ("searchAnalyzer", "search_analyzer"),
        ("indexAnalyzer", "index_analyzer"),
        ("dimensions", "vector_search_dimensions"),
        ("vectorSearchProfile", "vector_search_profile"),
    ] {
        if let Some(value) = field.get(from).filter(|v| !v.is_null()) {
            shaped[to] = value.clone();
        }
    }
    shaped
}

/// Index definition trimmed to what helps write queries against it.
fn index_detail(index: &Value) -> Value {
    let list = |key: &str| index[key].as_array().map(Vec::as_slice).unwrap_or_default();
    let mut detail = json!({
        "name": index["name"],
        "fields": list("fields").iter().map(shape_field).collect::<Vec<_>>(),
        "suggesters": list("suggesters")
            .iter()
            .map(|s| json!({ "name": s["name"], "source_fields": s["sourceFields"] }))
            .collect::<Vec<_>>(),
        "scoring_profiles": list("scoringProfiles")
            .iter()
            .map(|p| json!({
                "name": p["name"],
                "text_weights": p["text"]["weights"],
                "functions_count": count_of(&p["functions"]),
            }))
            .collect::<Vec<_>>(),
        "default_scoring_profile": index["defaultScoringProfile"],
        "cors_options": if index["corsOptions"].is_object() {
            json!({
                "allowed_origins": index["corsOptions"]["allowedOrigins"],
                "max_age_in_seconds": index["corsOptions"]["maxAgeInSeconds"],
            })
        } else {
            Value::Null
        },
    });
    let semantic = &index["semantic"];
    if semantic.is_object() {
        detail["semantic_search"] = json!({
            "default_configuration_name": semantic["defaultConfiguration"],
            "configurations_count": count_of(&semantic["configurations"]),
        });
    }
    let vector = &index["vectorSearch"];
    if vector.is_object() {
        detail["vector_search"] = json!({
            "algorithms_count": count_of(&vector["algorithms"]),
            "profiles_count": count_of(&vector["profiles"]),
            "vectorizers_count": count_of(&vector["vectorizers"]),
        });
    }
    detail
}

fn index_stats(stats: &Value) -> Value {
    let storage = stats["storageSize"].as_u64().unwrap_or(0);
    json!({
        "document_count": stats["documentCount"],
        "storage_size_bytes": storage,
        "storage_size_mb": (storage as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        "vector_index_size_bytes": stats["vectorIndexSize"],
    })
}

/// Counts per key from an index batch reply; errors only when something failed.
pub fn batch_outcome(raw: &Value) -> Value {
    let results = raw["value"].as_array().map(Vec::as_slice).unwrap_or_default();
    let failed: Vec<Value> = results
        .iter()
        .filter(|r| !r["status"].as_bool().unwrap_or(false))
        .map(|r| {
            json!({
                "key": r["key"],
                "error_message": r["errorMessage"],
                "status_code": r["statusCode"],
            })
        })
        .collect();
    let mut outcome = json!({
        "total": results.len(),
        "succeeded": results.len() - failed.len(),
        "failed": failed.len(),
    });
    if !failed.is_empty() {
        outcome["errors"] = Value::Array(failed);
    }
    outcome
}

/// Tag every document with the batch action.
fn batch_body(action: &str, documents: &[Map<String, Value>]) -> Value {
    let value: Vec<Value> = documents
        .iter()
        .map(|doc| {
            let mut doc = doc.clone();
            doc.insert("@search.action".into(), json!(action));
            Value::Object(doc)
        })
        .collect();
    json!({ "value": value })
}

/// Rename the `@search.*` annotations on a result document.
fn clean_document(mut doc: Value) -> Value {
    if let Some(obj) = doc.as_object_mut() {
        if let Some(score) = obj.remove("@search.score") {
            obj.insert("_search_score".into(), score);
        }
        if let Some(highlights) = obj.remove("@search.highlights") {
            obj.insert("_highlights".into(), highlights);
        }
        obj.retain(|k, _| !k.starts_with("@search."));
    }
    doc
}

pub struct SearchService {
    base: AzureService,
}

impl SearchService {
    pub fn new(base: AzureService) -> Self {
        Self { base }
    }

    fn data_url(endpoint: &str, segments: &[&str]) -> Result<url::Url, ToolError> {
        endpoint_url(endpoint, segments, SEARCH_API_VERSION)
    }

    async fn get_json(&self, url: url::Url) -> AzureResult<Value> {
        self.base
            .request_json(Method::GET, url.as_str(), SEARCH_SCOPE, None)
            .await
    }

    async fn post_json(&self, url: url::Url, body: &Value) -> AzureResult<Value> {
        self.base
            .request_json(Method::POST, url.as_str(), SEARCH_SCOPE, Some(body))
            .await
    }

    pub async fn list_services(
        &self,
        subscription: &str,
        resource_group: &str,
        top: u32,
    ) -> AzureResult<Vec<Value>> {
        let sub_id = self.base.resolve_subscription(subscription, None).await?;
        let mut query = service_query(None, resource_group);
        query.push_str(&format!(" | order by name asc | take {top}"));

        let result = self
            .base
            .execute_resource_graph_query(&query, &[sub_id], &[], 0, top)
            .await?;
        Ok(result["data"].as_array().cloned().unwrap_or_default())
    }

    pub async fn get_service(
        &self,
        subscription: &str,
        resource_group: &str,
        service_name: &str,
    ) -> AzureResult<Value> {
        let sub_id = self.base.resolve_subscription(subscription, None).await?;
        let query = service_query(Some(service_name), resource_group);
        let result = self
            .base
            .execute_resource_graph_query(&query, &[sub_id], &[], 0, 1)
            .await?;
        result["data"]
            .as_array()
            .and_then(|rows| rows.first())
            .cloned()
            .ok_or_else(|| {
                ToolError::not_found(format!("Search service '{service_name}' not found")).into()
            })
    }

    pub async fn list_indexes(&self, endpoint: &str) -> AzureResult<Vec<Value>> {
        let result = self.get_json(Self::data_url(endpoint, &["indexes"])?).await?;
        Ok(result["value"]
            .as_array()
            .map(|indexes| indexes.iter().map(index_summary).collect())
            .unwrap_or_default())
    }

    pub async fn get_index(&self, endpoint: &str, index_name: &str) -> AzureResult<Value> {
        let index = self
            .get_json(Self::data_url(endpoint, &["indexes", index_name])?)
            .await?;
        Ok(index_detail(&index))
    }

    pub async fn index_statistics(&self, endpoint: &str, index_name: &str) -> AzureResult<Value> {
        let stats = self
            .get_json(Self::data_url(endpoint, &["indexes", index_name, "stats"])?)
            .await?;
        Ok(index_stats(&stats))
    }

    pub async fn get_document(
        &self,
        target: &IndexTarget,
        key: &str,
        select: &str,
    ) -> AzureResult<Value> {
        let mut url = Self::data_url(&target.endpoint, &["indexes", &target.index_name, "docs", key])?;
        let select = split_csv(select).join(",");
        if !select.is_empty() {
            url.query_pairs_mut().append_pair("$select", &select);
        }
        self.get_json(url).await
    }

    pub async fn suggest(&self, options: &SearchSuggestOptions) -> AzureResult<Vec<Value>> {
        let target = &options.target;
        let url = Self::data_url(
            &target.endpoint,
            &["indexes", &target.index_name, "docs", "suggest"],
        )?;
        let result = self.post_json(url, &options.request_body()).await?;
        Ok(result["value"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|s| {
                let mut document = s.as_object().cloned().unwrap_or_default();
                let text = document.remove("@search.text").unwrap_or(Value::Null);
                json!({ "text": text, "document": document })
            })
            .collect())
    }

    pub async fn autocomplete(&self, options: &SearchAutocompleteOptions) -> AzureResult<Vec<Value>> {
        let target = &options.target;
        let url = Self::data_url(
            &target.endpoint,
            &["indexes", &target.index_name, "docs", "autocomplete"],
        )?;
        let result = self.post_json(url, &options.request_body()).await?;
        Ok(result["value"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|c| json!({ "text": c["text"], "query_plus_text": c["queryPlusText"] }))
            .collect())
    }

    /// Run one index batch. Per-document failures are reported, not raised.
    pub async fn index_documents(
        &self,
        target: &IndexTarget,
        action: &str,
        documents: &[Map<String, Value>],
    ) -> AzureResult<Value> {
        let url = Self::data_url(
            &target.endpoint,
            &["indexes", &target.index_name, "docs", "index"],
        )?;
        let result = self.post_json(url, &batch_body(action, documents)).await?;
        Ok(batch_outcome(&result))
    }

    pub async fn query(&self, options: &SearchQueryOptions) -> AzureResult<Value> {
        let url = Self::data_url(
            &options.endpoint,
            &["indexes", &options.index_name, "docs", "search"],
        )?;
        let body = options.request_body();
        let result = self.post_json(url, &body).await?;

        let documents: Vec<Value> = result["value"]
            .as_array()
            .map(|docs| docs.iter().cloned().map(clean_document).collect())
            .unwrap_or_default();

        let mut response = json!({
            "count": documents.len(),
            "documents": documents,
        });
        if options.include_total_count {
            response["total_count"] = result["@odata.count"].clone();
        }
        if let Some(facets) = result["@search.facets"].as_object() {
            let facets: Map<String, Value> = facets
                .iter()
                .map(|(name, buckets)| {
                    let buckets: Vec<Value> = buckets
                        .as_array()
                        .map(|items| {
                            items
                                .iter()
                                .map(|b| json!({ "value": b["value"], "count": b["count"] }))
                                .collect()
                        })
                        .unwrap_or_default();
                    (name.clone(), Value::Array(buckets))
                })
                .collect();
            response["facets"] = Value::Object(facets);
        }
        Ok(response)
    }
}

fn search(ctx: &AzureContext) -> SearchService {
    SearchService::new(AzureService::new(ctx))
}

fn default_service_top() -> u32 {
    100
}

fn default_query_top() -> u32 {
    50
}

fn default_search_text() -> String {
    "*".to_string()
}

// ---------------------------------------------------------------------------
// Services and indexes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct SearchServiceListOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group to filter by. Leave empty for all resource groups.
    #[serde(default)]
    pub resource_group: String,
    /// Maximum number of services to return (1-1000).
    #[serde(default = "default_service_top")]
    #[validate(range(min = 1, max = 1000))]
    pub top: u32,
}

#[derive(Debug, Default)]
pub struct SearchServiceListTool;

#[async_trait]
impl AzureTool for SearchServiceListTool {
    type Options = SearchServiceListOptions;

    fn name(&self) -> &'static str {
        "search_service_list"
    }

    fn description(&self) -> &'static str {
        "List Azure AI Search services in a subscription with their endpoints, \
         SKU, replica and partition counts."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        search(ctx)
            .list_services(&options.subscription, &options.resource_group, options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Search Services"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct SearchServiceGetOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Name of the search service.
    #[validate(length(min = 1))]
    pub service_name: String,
    /// Resource group of the service. Leave empty to search all.
    #[serde(default)]
    pub resource_group: String,
}

#[derive(Debug, Default)]
pub struct SearchServiceGetTool;

#[async_trait]
impl AzureTool for SearchServiceGetTool {
    type Options = SearchServiceGetOptions;

    fn name(&self) -> &'static str {
        "search_service_get"
    }

    fn description(&self) -> &'static str {
        "Get one Azure AI Search service with its endpoint, capacity, network \
         rules and authentication options."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        search(ctx)
            .get_service(
                &options.subscription,
                &options.resource_group,
                &options.service_name,
            )
            .await
            .map_err(failure("Search Service"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct SearchIndexListOptions {
    /// Search service endpoint, e.g. 'https://myservice.search.windows.net'.
    #[validate(url)]
    pub endpoint: String,
}

#[derive(Debug, Default)]
pub struct SearchIndexListTool;

#[async_trait]
impl AzureTool for SearchIndexListTool {
    type Options = SearchIndexListOptions;

    fn name(&self) -> &'static str {
        "search_index_list"
    }

    fn description(&self) -> &'static str {
        "List the indexes of an Azure AI Search service with field counts and \
         whether semantic or vector search is configured."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        search(ctx)
            .list_indexes(&options.endpoint)
            .await
            .map(Value::Array)
            .map_err(failure("Search Indexes"))
    }
}

/// A search index on a service.
#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct IndexTarget {
    /// Search service endpoint, e.g. 'https://myservice.search.windows.net'.
    #[validate(url)]
    pub endpoint: String,
    /// Index name. Obtain from search_index_list.
    #[validate(length(min = 1))]
    pub index_name: String,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct SearchIndexGetOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub target: IndexTarget,
}

#[derive(Debug, Default)]
pub struct SearchIndexGetTool;

#[async_trait]
impl AzureTool for SearchIndexGetTool {
    type Options = SearchIndexGetOptions;

    fn name(&self) -> &'static str {
        "search_index_get"
    }

    fn description(&self) -> &'static str {
        "Get an index schema: fields and their attributes, suggesters, scoring \
         profiles and semantic or vector configuration."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        search(ctx)
            .get_index(&options.target.endpoint, &options.target.index_name)
            .await
            .map_err(failure("Search Index"))
    }
}

#[derive(Debug, Default)]
pub struct SearchIndexStatsTool;

#[async_trait]
impl AzureTool for SearchIndexStatsTool {
    type Options = SearchIndexGetOptions;

    fn name(&self) -> &'static str {
        "search_index_stats"
    }

    fn description(&self) -> &'static str {
        "Get the document count and storage size of an index."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        search(ctx)
            .index_statistics(&options.target.endpoint, &options.target.index_name)
            .await
            .map_err(failure("Search Index"))
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    #[default]
    Simple,
    /// Lucene syntax.
    Full,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Any,
    All,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct SearchQueryOptions {
    /// Search service endpoint. Obtain from search_service_list.
    #[validate(url)]
    pub endpoint: String,
    /// Index to query. Obtain from search_index_list.
    #[validate(length(min = 1))]
    pub index_name: String,
    /// Query text. '*' matches every document.
    #[serde(default = "default_search_text")]
    pub search_text: String,
    /// OData filter, e.g. "category eq 'Electronics' and price gt 100".
    #[serde(default)]
    pub filter: String,
    /// Comma-separated fields to return. Empty returns all retrievable fields.
    #[serde(default)]
    pub select: String,
    /// Comma-separated sort clauses, e.g. 'rating desc, price asc'.
    #[serde(default)]
    pub order_by: String,
    /// Maximum number of documents to return (1-1000).
    #[serde(default = "default_query_top")]
    #[validate(range(min = 1, max = 1000))]
    pub top: u32,
    /// Number of results to skip.
    #[serde(default)]
    pub skip: u32,
    /// Include the total number of matches.
    #[serde(default)]
    pub include_total_count: bool,
    /// Comma-separated fields to search in. Empty searches all searchable fields.
    #[serde(default)]
    pub search_fields: String,
    /// Comma-separated fields to highlight. Highlights are returned in _highlights.
    #[serde(default)]
    pub highlight_fields: String,
    /// Fields to facet on, e.g. ['category', 'brand,count:5'].
    #[serde(default)]
    pub facets: Vec<String>,
    #[serde(default)]
    pub query_type: QueryType,
    #[serde(default)]
    pub search_mode: SearchMode,
}

impl SearchQueryOptions {
    pub fn request_body(&self) -> Value {
        let mut body = json!({
            "search": self.search_text,
            "top": self.top,
            "skip": self.skip,
            "count": self.include_total_count,
            "queryType": self.query_type,
            "searchMode": self.search_mode,
        });
        let mut put = |key: &str, value: &str| {
            if !value.is_empty() {
                body[key] = json!(value);
            }
        };
        put("filter", &self.filter);
        put("highlight", &self.highlight_fields);
        // The REST API takes comma-separated lists; normalise spacing.
        put("select", &split_csv(&self.select).join(","));
        put("orderby", &split_csv(&self.order_by).join(","));
        put("searchFields", &split_csv(&self.search_fields).join(","));
        if !self.facets.is_empty() {
            body["facets"] = json!(self.facets);
        }
        body
    }
}

#[derive(Debug, Default)]
pub struct SearchQueryTool;

#[async_trait]
impl AzureTool for SearchQueryTool {
    type Options = SearchQueryOptions;

    fn name(&self) -> &'static str {
        "search_query"
    }

    fn description(&self) -> &'static str {
        "Search documents in an Azure AI Search index. Supports OData filters, \
         sorting, paging, highlighting and facets, with simple or Lucene syntax."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        search(ctx)
            .query(&options)
            .await
            .map_err(failure("Search Index"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct SearchDocumentGetOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub target: IndexTarget,
    /// Value of the index's key field.
    #[validate(length(min = 1))]
    pub key: String,
    /// Comma-separated fields to return. Empty returns all retrievable fields.
    #[serde(default)]
    pub select: String,
}

#[derive(Debug, Default)]
pub struct SearchDocumentGetTool;

#[async_trait]
impl AzureTool for SearchDocumentGetTool {
    type Options = SearchDocumentGetOptions;

    fn name(&self) -> &'static str {
        "search_document_get"
    }

    fn description(&self) -> &'static str {
        "Fetch one document from an index by its key."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        search(ctx)
            .get_document(&options.target, &options.key, &options.select)
            .await
            .map_err(failure("Search Document"))
    }
}

fn default_suggest_top() -> u32 {
    5
}

/// Options shared by suggestions and autocomplete.
#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct SuggesterQuery {
    /// Partial text typed so far (1-100 characters).
    #[validate(length(min = 1, max = 100))]
    pub search_text: String,
    /// Suggester defined on the index. Find it with search_index_get.
    #[validate(length(min = 1))]
    pub suggester_name: String,
    /// OData filter narrowing the candidate documents.
    #[serde(default)]
    pub filter: String,
    /// Maximum results (1-100).
    #[serde(default = "default_suggest_top")]
    #[validate(range(min = 1, max = 100))]
    pub top: u32,
    /// Tolerate typos at some cost in latency.
    #[serde(default)]
    pub use_fuzzy_matching: bool,
    #[serde(default)]
    pub highlight_pre_tag: String,
    #[serde(default)]
    pub highlight_post_tag: String,
}

impl SuggesterQuery {
    fn request_body(&self) -> Value {
        let mut body = json!({
            "search": self.search_text,
            "suggesterName": self.suggester_name,
            "top": self.top,
            "fuzzy": self.use_fuzzy_matching,
        });
        for (key, value) in [
            ("filter", &self.filter),
            ("highlightPreTag", &self.highlight_pre_tag),
            ("highlightPostTag", &self.highlight_post_tag),
        ] {
            if !value.is_empty() {
                body[key] = json!(value);
            }
        }
        body
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct SearchSuggestOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub target: IndexTarget,
    #[serde(flatten)]
    #[validate(nested)]
    pub query: SuggesterQuery,
    /// Comma-separated fields to return with each suggestion.
    #[serde(default)]
    pub select: String,
}

impl SearchSuggestOptions {
    pub fn request_body(&self) -> Value {
        let mut body = self.query.request_body();
        let select = split_csv(&self.select).join(",");
        if !select.is_empty() {
            body["select"] = json!(select);
        }
        body
    }
}

#[derive(Debug, Default)]
pub struct SearchSuggestTool;

#[async_trait]
impl AzureTool for SearchSuggestTool {
    type Options = SearchSuggestOptions;

    fn name(&self) -> &'static str {
        "search_suggest"
    }

    fn description(&self) -> &'static str {
        "Suggest matching documents for partially typed text using an index \
         suggester, for search-as-you-type."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        search(ctx)
            .suggest(&options)
            .await
            .map(Value::Array)
            .map_err(failure("Search Index"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum AutocompleteMode {
    /// Complete the last term.
    #[default]
    OneTerm,
    /// Complete the last two terms.
    TwoTerms,
    /// Complete the last term with the preceding terms as context.
    OneTermWithContext,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct SearchAutocompleteOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub target: IndexTarget,
    #[serde(flatten)]
    #[validate(nested)]
    pub query: SuggesterQuery,
    #[serde(default)]
    pub mode: AutocompleteMode,
}

impl SearchAutocompleteOptions {
    pub fn request_body(&self) -> Value {
        let mut body = self.query.request_body();
        body["autocompleteMode"] = json!(self.mode);
        body
    }
}

#[derive(Debug, Default)]
pub struct SearchAutocompleteTool;

#[async_trait]
impl AzureTool for SearchAutocompleteTool {
    type Options = SearchAutocompleteOptions;

    fn name(&self) -> &'static str {
        "search_autocomplete"
    }

    fn description(&self) -> &'static str {
        "Complete partially typed terms from the index vocabulary using a \
         suggester."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        search(ctx)
            .autocomplete(&options)
            .await
            .map(Value::Array)
            .map_err(failure("Search Index"))
    }
}

// ---------------------------------------------------------------------------
// Document management
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct SearchDocumentBatchOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub target: IndexTarget,
    /// Documents to send (1-1000). Each must include the index's key field.
    #[validate(length(min = 1, max = 1000))]
    pub documents: Vec<Map<String, Value>>,
}

async fn run_batch(
    ctx: &AzureContext,
    options: &SearchDocumentBatchOptions,
    action: &str,
) -> ToolResult<Value> {
    tracing::info!(
        index = %options.target.index_name,
        action,
        documents = options.documents.len(),
        "indexing documents"
    );
    search(ctx)
        .index_documents(&options.target, action, &options.documents)
        .await
        .map_err(failure("Search Index"))
}

#[derive(Debug, Default)]
pub struct SearchDocumentUploadTool;

#[async_trait]
impl AzureTool for SearchDocumentUploadTool {
    type Options = SearchDocumentBatchOptions;

    fn name(&self) -> &'static str {
        "search_document_upload"
    }

    fn description(&self) -> &'static str {
        "Upload documents to an index. Documents whose key already exists are \
         replaced. Returns succeeded and failed counts."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::IDEMPOTENT_WRITE
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        run_batch(ctx, &options, "upload").await
    }
}

#[derive(Debug, Default)]
pub struct SearchDocumentMergeTool;

#[async_trait]
impl AzureTool for SearchDocumentMergeTool {
    type Options = SearchDocumentBatchOptions;

    fn name(&self) -> &'static str {
        "search_document_merge"
    }

    fn description(&self) -> &'static str {
        "Update fields of existing documents. Only the given fields change; a \
         document whose key does not exist fails."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::IDEMPOTENT_WRITE
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        run_batch(ctx, &options, "merge").await
    }
}

#[derive(Debug, Default)]
pub struct SearchDocumentDeleteTool;

#[async_trait]
impl AzureTool for SearchDocumentDeleteTool {
    type Options = SearchDocumentBatchOptions;

    fn name(&self) -> &'static str {
        "search_document_delete"
    }

    fn description(&self) -> &'static str {
        "Delete documents from an index by key. Each document only needs its key \
         field. WARNING: deleted documents cannot be recovered."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::DESTRUCTIVE
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        run_batch(ctx, &options, "delete").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::parse_options;
    use crate::tools::raw;

    fn query_options(extra: Value) -> SearchQueryOptions {
        let mut base = json!({
            "endpoint": "https://svc.search.windows.net",
            "index_name": "hotels",
        });
        if let (Some(obj), Value::Object(more)) = (base.as_object_mut(), extra) {
            obj.extend(more);
        }
        parse_options(raw(base)).unwrap()
    }

    #[test]
    fn default_body_matches_everything() {
        let body = query_options(json!({})).request_body();
        assert_eq!(body["search"], "*");
        assert_eq!(body["top"], 50);
        assert_eq!(body["queryType"], "simple");
        assert_eq!(body["searchMode"], "any");
        assert!(body.get("filter").is_none());
        assert!(body.get("facets").is_none());
    }

    #[test]
    fn csv_fields_are_normalised() {
        let body = query_options(json!({
            "select": "name, rating ,",
            "order_by": "rating desc,  price asc",
            "filter": "rating ge 4",
            "facets": ["category"],
            "query_type": "full",
        }))
        .request_body();
        assert_eq!(body["select"], "name,rating");
        assert_eq!(body["orderby"], "rating desc,price asc");
        assert_eq!(body["filter"], "rating ge 4");
        assert_eq!(body["facets"], json!(["category"]));
        assert_eq!(body["queryType"], "full");
    }

    #[test]
    fn endpoint_must_be_a_url() {
        let err = parse_options::<SearchIndexListOptions>(raw(json!({ "endpoint": "svc" })))
            .unwrap_err();
        assert_eq!(err.to_dict()["field"], "endpoint");
    }

    #[test]
    fn index_names_are_single_segments() {
        let url = SearchService::data_url(
            "https://svc.search.windows.net",
            &["indexes", "hotels/../../servicestats", "docs", "search"],
        )
        .unwrap();
        assert_eq!(
            url.path(),
            "/indexes/hotels%2F..%2F..%2Fservicestats/docs/search"
        );
        assert_eq!(url.query(), Some("api-version=2024-07-01"));
    }

    #[test]
    fn batch_documents_carry_the_action() {
        let opts: SearchDocumentBatchOptions = parse_options(raw(json!({
            "endpoint": "https://svc.search.windows.net",
            "index_name": "hotels",
            "documents": [{ "id": "1", "rating": 5 }],
        })))
        .unwrap();
        let body = batch_body("merge", &opts.documents);
        assert_eq!(body["value"][0]["@search.action"], "merge");
        assert_eq!(body["value"][0]["rating"], 5);
    }

    #[test]
    fn empty_batches_are_rejected() {
        let err = parse_options::<SearchDocumentBatchOptions>(raw(json!({
            "endpoint": "https://svc.search.windows.net",
            "index_name": "hotels",
            "documents": [],
        })))
        .unwrap_err();
        assert_eq!(err.to_dict()["field"], "documents");
    }

    #[test]
    fn batch_outcome_lists_only_failures() {
        let outcome = batch_outcome(&json!({ "value": [
            { "key": "1", "status": true, "statusCode": 201 },
            { "key": "2", "status": false, "statusCode": 404, "errorMessage": "Document not found." },
        ]}));
        assert_eq!(outcome["total"], 2);
        assert_eq!(outcome["succeeded"], 1);
        assert_eq!(outcome["errors"][0]["key"], "2");

        let clean = batch_outcome(&json!({ "value": [{ "key": "1", "status": true }] }));
        assert!(clean.get("errors").is_none());
    }

    #[test]
    fn delete_is_destructive() {
        assert!(AzureTool::metadata(&SearchDocumentDeleteTool).destructive);
        assert!(!AzureTool::metadata(&SearchDocumentUploadTool).destructive);
    }

    #[test]
    fn autocomplete_body_uses_rest_names() {
        let opts: SearchAutocompleteOptions = parse_options(raw(json!({
            "endpoint": "https://svc.search.windows.net",
            "index_name": "hotels",
            "search_text": "sea",
            "suggester_name": "sg",
            "mode": "twoTerms",
            "use_fuzzy_matching": true,
        })))
        .unwrap();
        let body = opts.request_body();
        assert_eq!(body["autocompleteMode"], "twoTerms");
        assert_eq!(body["suggesterName"], "sg");
        assert_eq!(body["fuzzy"], true);
        assert!(body.get("filter").is_none());
    }

    #[test]
    fn suggest_text_is_bounded() {
        let err = parse_options::<SearchSuggestOptions>(raw(json!({
            "endpoint": "https://svc.search.windows.net",
            "index_name": "hotels",
            "search_text": "x".repeat(101),
            "suggester_name": "sg",
        })))
        .unwrap_err();
        assert_eq!(err.to_dict()["field"], "search_text");
    }

    #[test]
    fn index_detail_keeps_query_relevant_parts() {
        let detail = index_detail(&json!({
            "name": "hotels",
            "fields": [
                { "name": "id", "type": "Edm.String", "key": true, "searchable": false },
                { "name": "embedding", "type": "Collection(Edm.Single)", "dimensions": 1536,
                  "vectorSearchProfile": "hnsw" },
            ],
            "suggesters": [{ "name": "sg", "sourceFields": ["name"] }],
            "vectorSearch": { "algorithms": [{}], "profiles": [{}] },
        }));
        assert_eq!(detail["fields"][0]["key"], true);
        assert_eq!(detail["fields"][0]["retrievable"], true);
        assert_eq!(detail["fields"][1]["vector_search_dimensions"], 1536);
        assert_eq!(detail["suggesters"][0]["source_fields"][0], "name");
        assert_eq!(detail["vector_search"]["profiles_count"], 1);
        assert!(detail.get("semantic_search").is_none());
        assert!(detail["cors_options"].is_null());
    }

    #[test]
    fn stats_report_megabytes() {
        let stats = index_stats(&json!({ "documentCount": 10, "storageSize": 3 * 1024 * 1024 / 2 }));
        assert_eq!(stats["storage_size_mb"], 1.5);
    }

    #[test]
    fn documents_lose_search_annotations() {
        let doc = clean_document(json!({
            "id": "1",
            "@search.score": 2.5,
            "@search.highlights": { "name": ["<em>sea</em> view"] },
            "@search.rerankerScore": 1.0,
        }));
        assert_eq!(doc["_search_score"], 2.5);
        assert!(doc["_highlights"]["name"].is_array());
        assert!(doc.get("@search.rerankerScore").is_none());
    }

    #[test]
    fn index_summary_counts_components() {
        let summary = index_summary(&json!({
            "name": "hotels",
            "fields": [{}, {}, {}],
            "vectorSearch": { "profiles": [] },
        }));
        assert_eq!(summary["fields_count"], 3);
        assert_eq!(summary["suggesters_count"], 0);
        assert_eq!(summary["vector_search"], true);
        assert_eq!(summary["semantic_search"], false);
    }
}
