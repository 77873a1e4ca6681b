//! Helpers shared by every tool family: token acquisition, authenticated
//! JSON requests with paging, subscription resolution and Resource Graph.

use std::time::Duration;

use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Map, Value};
use url::Url;
use uuid::Uuid;

use crate::azure_error::{AzureFailure, AzureResult};
use crate::context::AzureContext;
use crate::error::ToolError;

/// TTL for subscription name to ID resolution and the subscription list.
pub const SUBSCRIPTION_CACHE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";
const RESOURCE_GRAPH_API_VERSION: &str = "2021-03-01";

/// Stop following continuation links after this many pages.
const MAX_PAGES: usize = 100;

/// Authenticated access to Azure REST endpoints on behalf of one tool call.
#[derive(Debug, Clone)]
pub struct AzureService {
    ctx: AzureContext,
}

impl AzureService {
    pub fn new(ctx: &AzureContext) -> Self {
        Self { ctx: ctx.clone() }
    }

    pub fn context(&self) -> &AzureContext {
        &self.ctx
    }

    /// `.default` scope of the configured Resource Manager endpoint.
    pub fn arm_scope(&self) -> String {
        format!("{}/.default", self.arm_base())
    }

    fn arm_base(&self) -> &str {
        self.ctx.config.endpoints.resource_manager.trim_end_matches('/')
    }

    /// Absolute ARM URL for `path` with the `api-version` query parameter.
    pub fn arm_url(&self, path: &str, api_version: &str) -> String {
        with_api_version(&format!("{}{}", self.arm_base(), path), api_version)
    }

    pub async fn bearer_token(&self, scope: &str, tenant: Option<&str>) -> AzureResult<String> {
        let credential = self.ctx.credentials.get_credential(tenant);
        let token = azure_core::credentials::TokenCredential::get_token(
            credential.as_ref(),
            &[scope],
            None,
        )
        .await?;
        Ok(token.token.secret().to_string())
    }

    /// Send an authenticated request. Non-success statuses become failures.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        scope: &str,
        tenant: Option<&str>,
        customize: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> AzureResult<reqwest::Response> {
        let token = self.bearer_token(scope, tenant).await?;
        let request = self
            .ctx
            .http
            .request(method.clone(), url)
            .header(AUTHORIZATION, format!("Bearer {token}"));
        let response = customize(request).send().await?;
        tracing::debug!(%method, url, status = response.status().as_u16(), "azure request");
        if !response.status().is_success() {
            return Err(AzureFailure::from_response(response).await);
        }
        Ok(response)
    }

    /// Send a request with an optional JSON body and decode the JSON reply.
    /// An empty reply decodes to `null`.
    pub async fn request_json(
        &self,
        method: Method,
        url: &str,
        scope: &str,
        body: Option<&Value>,
    ) -> AzureResult<Value> {
        let response = self
            .send(method, url, scope, None, |req| match body {
                Some(body) => req.json(body),
                None => req,
            })
            .await?;
        read_json(response).await
    }

    pub async fn arm_post(&self, path: &str, api_version: &str, body: &Value) -> AzureResult<Value> {
        let url = self.arm_url(path, api_version);
        self.request_json(Method::POST, &url, &self.arm_scope(), Some(body))
            .await
    }

    /// GET a collection and follow `nextLink` / `@odata.nextLink` until
    /// exhausted or `limit` items have been collected.
    pub async fn get_paged(
        &self,
        url: &str,
        scope: &str,
        headers: HeaderMap,
        limit: Option<usize>,
    ) -> AzureResult<Vec<Value>> {
        let token = self.bearer_token(scope, None).await?;
        collect_pages(&self.ctx.http, url, &token, headers, limit).await
    }

    pub async fn arm_list(
        &self,
        path: &str,
        api_version: &str,
        limit: Option<usize>,
    ) -> AzureResult<Vec<Value>> {
        let url = self.arm_url(path, api_version);
        self.get_paged(&url, &self.arm_scope(), HeaderMap::new(), limit)
            .await
    }

    /// Resolve a subscription display name (or ID) to its ID.
    pub async fn resolve_subscription(
        &self,
        subscription: &str,
        tenant: Option<&str>,
    ) -> AzureResult<String> {
        if is_guid(subscription) {
            return Ok(subscription.to_string());
        }

        let key = subscription_cache_key(subscription, tenant);
        // The cache lock is held while the factory runs, so the factory
        // fetches directly instead of going through `list_subscriptions`.
        let resolved = self
            .ctx
            .cache
            .get_or_set(
                &key,
                || async {
                    let subs = self.fetch_subscriptions(tenant).await?;
                    subs.iter()
                        .find(|s| {
                            s["name"]
                                .as_str()
                                .is_some_and(|n| n.eq_ignore_ascii_case(subscription))
                        })
                        .map(|s| s["id"].clone())
                        .ok_or_else(|| {
                            AzureFailure::from(ToolError::not_found(format!(
                                "Subscription '{subscription}' not found"
                            )))
                        })
                },
                SUBSCRIPTION_CACHE_TTL,
            )
            .await?;

        resolved.as_str().map(str::to_string).ok_or_else(|| {
            AzureFailure::Other(format!("Subscription '{subscription}' resolved to a non-string id"))
        })
    }

    /// `/subscriptions/{id}`, or the resource group beneath it when one is given.
    pub async fn scope_path(&self, subscription: &str, resource_group: &str) -> AzureResult<String> {
        if !resource_group.is_empty() {
            require_path_segment(resource_group, "resource_group")?;
        }
        let sub_id = self.resolve_subscription(subscription, None).await?;
        Ok(if resource_group.is_empty() {
            format!("/subscriptions/{sub_id}")
        } else {
            format!("/subscriptions/{sub_id}/resourceGroups/{resource_group}")
        })
    }

    /// All accessible subscriptions as `{id, name, state, tenant_id}`.
    pub async fn list_subscriptions(&self, tenant: Option<&str>) -> AzureResult<Vec<Value>> {
        let key = format!("subscriptions:{}", tenant.unwrap_or("default"));
        let cached = self
            .ctx
            .cache
            .get_or_set(
                &key,
                || async { self.fetch_subscriptions(tenant).await.map(Value::Array) },
                SUBSCRIPTION_CACHE_TTL,
            )
            .await?;
        Ok(match cached {
            Value::Array(items) => items,
            _ => Vec::new(),
        })
    }

    async fn fetch_subscriptions(&self, tenant: Option<&str>) -> AzureResult<Vec<Value>> {
        let url = self.arm_url("/subscriptions", SUBSCRIPTIONS_API_VERSION);
        let token = self.bearer_token(&self.arm_scope(), tenant).await?;
        let raw = collect_pages(&self.ctx.http, &url, &token, HeaderMap::new(), None).await?;
        Ok(raw
            .into_iter()
            .map(|sub| {
                json!({
                    "id": sub["subscriptionId"],
                    "name": sub["displayName"],
                    "state": sub["state"],
                    "tenant_id": sub["tenantId"],
                })
            })
            .collect())
    }

    /// Run a KQL query through Azure Resource Graph.
    ///
    /// Management groups take precedence over subscriptions. With neither,
    /// every accessible subscription is queried.
    pub async fn execute_resource_graph_query(
        &self,
        query: &str,
        subscriptions: &[String],
        management_groups: &[String],
        skip: u32,
        top: u32,
    ) -> AzureResult<Value> {
        let mut body = Map::new();
        if !management_groups.is_empty() {
            body.insert("managementGroups".into(), json!(management_groups));
        } else if !subscriptions.is_empty() {
            body.insert("subscriptions".into(), json!(subscriptions));
        } else {
            let all: Vec<Value> = self
                .list_subscriptions(None)
                .await?
                .into_iter()
                .map(|s| s["id"].clone())
                .collect();
            body.insert("subscriptions".into(), Value::Array(all));
        }
        body.insert("query".into(), json!(query));
        body.insert(
            "options".into(),
            json!({ "$skip": skip, "$top": top, "resultFormat": "objectArray" }),
        );

        let result = self
            .arm_post(
                "/providers/Microsoft.ResourceGraph/resources",
                RESOURCE_GRAPH_API_VERSION,
                &Value::Object(body),
            )
            .await?;
        Ok(shape_graph_result(result))
    }

    /// Resources of one type, filtered by resource group and name.
    pub async fn list_resources(&self, filter: &ResourceFilter<'_>) -> AzureResult<Vec<Value>> {
        let sub_id = self.resolve_subscription(filter.subscription, None).await?;
        let query = filter.to_kql();
        let result = self
            .execute_resource_graph_query(&query, &[sub_id], &[], 0, filter.limit)
            .await?;
        Ok(match result {
            Value::Object(mut obj) => match obj.remove("data") {
                Some(Value::Array(rows)) => rows,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        })
    }

    /// A single resource by name, or `None`.
    pub async fn get_resource(
        &self,
        resource_type: &str,
        subscription: &str,
        name: &str,
        resource_group: Option<&str>,
    ) -> AzureResult<Option<Value>> {
        let filter = ResourceFilter {
            resource_type,
            subscription,
            resource_group,
            name: Some(name),
            extra: None,
            limit: 1,
        };
        Ok(self.list_resources(&filter).await?.into_iter().next())
    }
}

/// Parameters for [`AzureService::list_resources`].
#[derive(Debug, Clone)]
pub struct ResourceFilter<'a> {
    pub resource_type: &'a str,
    pub subscription: &'a str,
    pub resource_group: Option<&'a str>,
    pub name: Option<&'a str>,
    /// Raw KQL predicate appended as another `where`.
    pub extra: Option<&'a str>,
    pub limit: u32,
}

impl<'a> ResourceFilter<'a> {
    pub fn new(resource_type: &'a str, subscription: &'a str) -> Self {
        Self {
            resource_type,
            subscription,
            resource_group: None,
            name: None,
            extra: None,
            limit: 50,
        }
    }

    pub fn to_kql(&self) -> String {
        let mut query = format!("resources | where type =~ '{}'", escape_kql(self.resource_type));
        if let Some(rg) = self.resource_group.filter(|rg| !rg.is_empty()) {
            query.push_str(&format!(" | where resourceGroup =~ '{}'", escape_kql(rg)));
        }
        if let Some(name) = self.name.filter(|n| !n.is_empty()) {
            query.push_str(&format!(" | where name =~ '{}'", escape_kql(name)));
        }
        if let Some(extra) = self.extra.filter(|e| !e.is_empty()) {
            query.push_str(&format!(" | where {extra}"));
        }
        query.push_str(&format!(" | limit {}", self.limit));
        query
    }
}

fn shape_graph_result(mut result: Value) -> Value {
    let truncated = match result.get("resultTruncated") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    let data = match result.get_mut("data").map(Value::take) {
        Some(Value::Array(rows)) => Value::Array(rows),
        _ => json!([]),
    };
    json!({
        "data": data,
        "count": result["count"],
        "total_records": result["totalRecords"],
        "skip_token": result["$skipToken"],
        "result_truncated": truncated,
    })
}

/// Subscription segment of a full ARM resource ID.
pub fn subscription_of(resource_id: &str) -> Option<&str> {
    let mut parts = resource_id.split('/');
    parts
        .by_ref()
        .find(|p| p.eq_ignore_ascii_case("subscriptions"))?;
    parts.next().filter(|s| !s.is_empty())
}

/// A full ARM resource ID that can be spliced into a request path.
pub fn require_resource_id(resource_id: &str) -> Result<(), ToolError> {
    if subscription_of(resource_id).is_none() || resource_id.contains(['?', '#']) {
        return Err(ToolError::validation_field(
            format!(
                "'{resource_id}' is not a full resource ID \
                 (expected /subscriptions/<id>/resourceGroups/...)"
            ),
            "resource_id",
        ));
    }
    Ok(())
}

/// A name used as one ARM path segment.
/// `{endpoint}/{segments...}?api-version=...` for a data-plane endpoint the
/// caller supplied. Each segment is percent-encoded; only https is accepted.
pub fn endpoint_url(endpoint: &str, segments: &[&str], api_version: &str) -> Result<Url, ToolError> {
    let invalid = || {
        ToolError::validation_field(format!("'{endpoint}' is not an https endpoint URL"), "endpoint")
    };
    let mut url = Url::parse(endpoint).map_err(|_| invalid())?;
    if url.scheme() != "https" {
        return Err(invalid());
    }
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(segments);
    url.set_query(None);
    url.query_pairs_mut().append_pair("api-version", api_version);
    Ok(url)
}

pub fn require_path_segment(value: &str, field: &str) -> Result<(), ToolError> {
    if value.is_empty() || value.contains(['/', '?', '#', '%']) {
        return Err(ToolError::validation_field(
            format!("'{value}' is not a valid {field}"),
            field,
        ));
    }
    Ok(())
}

pub fn subscription_cache_key(subscription: &str, tenant: Option<&str>) -> String {
    format!("subscription:{subscription}:{}", tenant.unwrap_or("default"))
}

pub fn is_guid(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}

/// Quote-escape a value for a KQL single-quoted string literal.
pub fn escape_kql(value: &str) -> String {
    value.replace('\'', "''")
}

pub fn with_api_version(url: &str, api_version: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}api-version={api_version}")
}

async fn read_json(response: reqwest::Response) -> AzureResult<Value> {
    let body = response.text().await?;
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|err| AzureFailure::Other(format!("Invalid JSON in Azure response: {err}")))
}

/// Follow continuation links, collecting each page's `value` array.
pub async fn collect_pages(
    http: &reqwest::Client,
    url: &str,
    token: &str,
    headers: HeaderMap,
    limit: Option<usize>,
) -> AzureResult<Vec<Value>> {
    let mut items = Vec::new();
    let mut next = Some(url.to_string());
    let mut pages = 0;

    while let Some(url) = next.take() {
        let response = http
            .get(&url)
            .bearer_auth(token)
            .headers(headers.clone())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AzureFailure::from_response(response).await);
        }
        let mut page = read_json(response).await?;

        if let Some(Value::Array(values)) = page.get_mut("value").map(Value::take) {
            items.extend(values);
        }
        if let Some(limit) = limit {
            if items.len() >= limit {
                items.truncate(limit);
                break;
            }
        }

        pages += 1;
        if pages >= MAX_PAGES {
            tracing::warn!(pages, "stopped following continuation links");
            break;
        }
        next = ["nextLink", "@odata.nextLink"]
            .iter()
            .find_map(|k| page.get(*k).and_then(Value::as_str))
            .filter(|link| !link.is_empty())
            .map(str::to_string);
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_single_quotes() {
        assert_eq!(escape_kql("o'brien"), "o''brien");
        assert_eq!(escape_kql("plain"), "plain");
    }

    #[test]
    fn guid_detection() {
        assert!(is_guid("12345678-1234-1234-1234-123456789abc"));
        assert!(!is_guid("Production"));
    }

    #[test]
    fn resource_filter_builds_kql() {
        let filter = ResourceFilter {
            resource_group: Some("rg'1"),
            name: Some("acct"),
            limit: 10,
            ..ResourceFilter::new("Microsoft.Storage/storageAccounts", "sub")
        };
        assert_eq!(
            filter.to_kql(),
            "resources | where type =~ 'Microsoft.Storage/storageAccounts' \
             | where resourceGroup =~ 'rg''1' | where name =~ 'acct' | limit 10"
        );
    }

    #[test]
    fn api_version_is_appended() {
        assert_eq!(with_api_version("https://x/a", "1"), "https://x/a?api-version=1");
        assert_eq!(with_api_version("https://x/a?b=c", "1"), "https://x/a?b=c&api-version=1");
    }

    #[test]
    fn graph_result_is_reshaped() {
        let shaped = shape_graph_result(json!({
            "totalRecords": 2,
            "count": 2,
            "resultTruncated": "false",
            "data": [{ "name": "a" }, { "name": "b" }],
        }));
        assert_eq!(shaped["total_records"], 2);
        assert_eq!(shaped["result_truncated"], false);
        assert_eq!(shaped["data"].as_array().unwrap().len(), 2);
        assert!(shaped["skip_token"].is_null());
    }

    #[test]
    fn subscription_is_extracted_from_resource_id() {
        let id = "/subscriptions/1111/resourceGroups/rg/providers/Microsoft.Web/sites/app";
        assert_eq!(subscription_of(id), Some("1111"));
        assert_eq!(subscription_of("/resourceGroups/rg"), None);
        assert_eq!(subscription_of("/subscriptions/"), None);
    }

    #[test]
    fn partial_ids_are_rejected() {
        let err = require_resource_id("myvm").unwrap_err();
        assert_eq!(err.to_dict()["field"], "resource_id");
        assert!(require_resource_id("/subscriptions/1/resourceGroups/rg?x=1").is_err());
        assert!(require_resource_id("/subscriptions/1/resourceGroups/rg#frag").is_err());
    }

    #[test]
    fn path_segments_cannot_escape() {
        assert!(require_path_segment("prod-rg", "resource_group").is_ok());
        for bad in ["", "a/b", "rg?api-version=1", "rg#x", "%2e%2e"] {
            let err = require_path_segment(bad, "resource_group").unwrap_err();
            assert_eq!(err.to_dict()["field"], "resource_group");
        }
    }

    #[tokio::test]
    async fn scope_path_checks_resource_group() {
        let service = AzureService::new(&AzureContext::for_tests());
        let sub = "12345678-1234-1234-1234-123456789abc";
        assert_eq!(
            service.scope_path(sub, "").await.unwrap(),
            format!("/subscriptions/{sub}")
        );
        assert_eq!(
            service.scope_path(sub, "prod").await.unwrap(),
            format!("/subscriptions/{sub}/resourceGroups/prod")
        );
        assert!(service.scope_path(sub, "../x").await.is_err());
    }

    #[tokio::test]
    async fn guid_subscription_passes_through() {
        let service = AzureService::new(&AzureContext::for_tests());
        let id = "12345678-1234-1234-1234-123456789abc";
        assert_eq!(service.resolve_subscription(id, None).await.unwrap(), id);
    }

    #[tokio::test]
    async fn subscription_name_is_served_from_cache() {
        let ctx = AzureContext::for_tests();
        ctx.cache
            .set(
                subscription_cache_key("Production", None),
                json!("12345678-1234-1234-1234-123456789abc"),
                SUBSCRIPTION_CACHE_TTL,
            )
            .await;
        let service = AzureService::new(&ctx);
        assert_eq!(
            service.resolve_subscription("Production", None).await.unwrap(),
            "12345678-1234-1234-1234-123456789abc"
        );
    }

    #[tokio::test]
    async fn pages_are_followed() {
        let mut server = mockito::Server::new_async().await;
        let second = format!("{}/items?page=2", server.url());
        let _p1 = server
            .mock("GET", "/items")
            .match_header("authorization", "Bearer t0k")
            .with_body(json!({ "value": [1, 2], "nextLink": second }).to_string())
            .create_async()
            .await;
        let _p2 = server
            .mock("GET", "/items?page=2")
            .with_body(json!({ "value": [3] }).to_string())
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let items = collect_pages(
            &http,
            &format!("{}/items", server.url()),
            "t0k",
            HeaderMap::new(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(items, vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn paging_stops_at_limit() {
        let mut server = mockito::Server::new_async().await;
        let _p1 = server
            .mock("GET", "/items")
            .with_body(
                json!({ "value": [1, 2, 3], "@odata.nextLink": format!("{}/more", server.url()) })
                    .to_string(),
            )
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let items = collect_pages(
            &http,
            &format!("{}/items", server.url()),
            "t",
            HeaderMap::new(),
            Some(2),
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn failed_page_is_classified() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/items")
            .with_status(403)
            .with_body(r#"{"error":{"code":"AuthorizationFailed","message":"denied"}}"#)
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let err = collect_pages(&http, &format!("{}/items", server.url()), "t", HeaderMap::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AzureFailure::Http { status: 403, .. }));
    }
}
