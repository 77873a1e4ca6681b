//! Bing Search v7 through a `Microsoft.Bing/accounts` resource.
//!
//! Callers never handle keys: the resource's key is fetched with ARM
//! `listKeys` using the server's credential and cached for 12 hours.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use super::failure;
use crate::azure_error::{AzureFailure, AzureResult};
use crate::context::AzureContext;
use crate::error::{ToolError, ToolResult};
use crate::registry::ToolRegistry;
use crate::service::{require_path_segment, AzureService, ResourceFilter};
use crate::tool::{AzureTool, ToolMetadata};

const BING_RESOURCE_TYPE: &str = "Microsoft.Bing/accounts";
const BING_ARM_API_VERSION: &str = "2020-06-10";
const KEY_CACHE_TTL: Duration = Duration::from_secs(12 * 60 * 60);
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

pub(crate) fn register(registry: &mut ToolRegistry) {
    registry.register::<BingResourceListTool>("bing", Some("resource"));
    registry.register::<BingResourceGetTool>("bing", Some("resource"));
    registry.register::<BingWebSearchTool>("bing", Some("search"));
    registry.register::<BingNewsSearchTool>("bing", Some("search"));
    registry.register::<BingImageSearchTool>("bing", Some("search"));
    registry.register::<BingVideoSearchTool>("bing", Some("search"));
    registry.register::<BingEntitySearchTool>("bing", Some("search"));
}

pub fn key_cache_key(subscription_id: &str, resource_group: &str, name: &str) -> String {
    format!("bing:key:{subscription_id}:{resource_group}:{name}")
}

pub struct BingService {
    base: AzureService,
}

impl BingService {
    pub fn new(base: AzureService) -> Self {
        Self { base }
    }

    pub async fn list_resources(
        &self,
        subscription: &str,
        resource_group: &str,
        limit: u32,
    ) -> AzureResult<Vec<Value>> {
        let mut filter = ResourceFilter::new(BING_RESOURCE_TYPE, subscription);
        filter.resource_group = Some(resource_group);
        filter.limit = limit;
        self.base.list_resources(&filter).await
    }

    pub async fn get_resource(
        &self,
        subscription: &str,
        resource_group: &str,
        name: &str,
    ) -> AzureResult<Value> {
        self.base
            .get_resource(BING_RESOURCE_TYPE, subscription, name, Some(resource_group))
            .await?
            .ok_or_else(|| {
                ToolError::not_found(format!("Bing resource '{name}' not found")).into()
            })
    }

    /// `key1` of the resource, from cache when possible.
    async fn api_key(
        &self,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> AzureResult<String> {
        require_path_segment(resource_group, "resource_group")?;
        require_path_segment(name, "resource_name")?;
        let cache_key = key_cache_key(subscription_id, resource_group, name);
        let path = format!(
            "/subscriptions/{subscription_id}/resourceGroups/{resource_group}\
             /providers/Microsoft.Bing/accounts/{name}/listKeys"
        );
        let key = self
            .base
            .context()
            .cache
            .get_or_set(
                &cache_key,
                || async {
                    let keys = self
                        .base
                        .arm_post(&path, BING_ARM_API_VERSION, &json!({}))
                        .await?;
                    keys.get("key1")
                        .or_else(|| keys.get("Key1"))
                        .filter(|k| k.as_str().is_some_and(|s| !s.is_empty()))
                        .cloned()
                        .ok_or_else(|| {
                            AzureFailure::from(ToolError::azure_resource(
                                format!("Bing resource '{name}' returned no API keys"),
                                Some(BING_RESOURCE_TYPE.into()),
                                Some(name.into()),
                            ))
                        })
                },
                KEY_CACHE_TTL,
            )
            .await?;
        Ok(key.as_str().unwrap_or_default().to_string())
    }

    /// GET `<bing endpoint><path>` with the key header. Empty parameters are dropped.
    pub async fn search(
        &self,
        path: &str,
        api_key: &str,
        params: &[(&str, String)],
    ) -> AzureResult<Value> {
        let ctx = self.base.context();
        let url = format!("{}{path}", ctx.config.endpoints.bing.trim_end_matches('/'));
        let params: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();

        let response = ctx
            .http
            .get(&url)
            .header(KEY_HEADER, api_key)
            .query(&params)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED => Err(ToolError::authorization(
                "Bing Search rejected the API key; it may have been regenerated",
            )
            .into()),
            _ => Err(AzureFailure::from_response(response).await),
        }
    }

    async fn search_with_resource(
        &self,
        resource: &BingResource,
        path: &str,
        params: &[(&str, String)],
    ) -> AzureResult<Value> {
        let sub_id = self
            .base
            .resolve_subscription(&resource.subscription, None)
            .await?;
        let key = self
            .api_key(&sub_id, &resource.resource_group, &resource.resource_name)
            .await?;
        self.search(path, &key, params).await
    }
}

fn bing(ctx: &AzureContext) -> BingService {
    BingService::new(AzureService::new(ctx))
}

fn default_limit() -> u32 {
    50
}

fn default_count() -> u32 {
    10
}

/// Which Bing resource pays for a search.
#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct BingResource {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Name of the Microsoft.Bing/accounts resource. Use bing_resource_list to find it.
    #[validate(length(min = 1))]
    pub resource_name: String,
    /// Resource group of the Bing resource.
    #[validate(length(min = 1))]
    pub resource_group: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum SafeSearch {
    Off,
    Moderate,
    Strict,
}

impl SafeSearch {
    fn as_str(self) -> &'static str {
        match self {
            SafeSearch::Off => "Off",
            SafeSearch::Moderate => "Moderate",
            SafeSearch::Strict => "Strict",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum Freshness {
    Day,
    Week,
    Month,
}

impl Freshness {
    fn as_str(self) -> &'static str {
        match self {
            Freshness::Day => "Day",
            Freshness::Week => "Week",
            Freshness::Month => "Month",
        }
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct BingResourceListOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group to filter by. Leave empty for all resource groups.
    #[serde(default)]
    pub resource_group: String,
    /// Maximum number of resources to return (1-200).
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 200))]
    pub limit: u32,
}

#[derive(Debug, Default)]
pub struct BingResourceListTool;

#[async_trait]
impl AzureTool for BingResourceListTool {
    type Options = BingResourceListOptions;

    fn name(&self) -> &'static str {
        "bing_resource_list"
    }

    fn description(&self) -> &'static str {
        "List Bing Search resources (Microsoft.Bing/accounts) in a subscription. \
         The search tools need a resource name and resource group from here."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        bing(ctx)
            .list_resources(&options.subscription, &options.resource_group, options.limit)
            .await
            .map(Value::Array)
            .map_err(failure("Bing Resources"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct BingResourceGetOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub resource: BingResource,
}

#[derive(Debug, Default)]
pub struct BingResourceGetTool;

#[async_trait]
impl AzureTool for BingResourceGetTool {
    type Options = BingResourceGetOptions;

    fn name(&self) -> &'static str {
        "bing_resource_get"
    }

    fn description(&self) -> &'static str {
        "Get one Bing Search resource with its location, SKU, kind and \
         properties."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let resource = &options.resource;
        bing(ctx)
            .get_resource(
                &resource.subscription,
                &resource.resource_group,
                &resource.resource_name,
            )
            .await
            .map_err(failure("Bing Resource"))
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct BingWebSearchOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub resource: BingResource,
    /// Search query.
    #[validate(length(min = 1))]
    pub query: String,
    /// Market code such as 'en-US'. Leave empty for the default market.
    #[serde(default)]
    pub market: String,
    /// SafeSearch level.
    #[serde(default)]
    pub safe_search: Option<SafeSearch>,
    /// Number of results (1-50).
    #[serde(default = "default_count")]
    #[validate(range(min = 1, max = 50))]
    pub count: u32,
    /// Zero-based result offset for paging.
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Default)]
pub struct BingWebSearchTool;

#[async_trait]
impl AzureTool for BingWebSearchTool {
    type Options = BingWebSearchOptions;

    fn name(&self) -> &'static str {
        "bing_web_search"
    }

    fn description(&self) -> &'static str {
        "Search the web with Bing. Returns web pages with titles, URLs and \
         snippets, plus related searches."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let params = [
            ("q", options.query.clone()),
            ("count", options.count.to_string()),
            ("offset", options.offset.to_string()),
            ("mkt", options.market.clone()),
            (
                "safeSearch",
                options
                    .safe_search
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default(),
            ),
        ];
        bing(ctx)
            .search_with_resource(&options.resource, "/search", &params)
            .await
            .map_err(failure("Bing Web Search"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct BingNewsSearchOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub resource: BingResource,
    /// Search query.
    #[validate(length(min = 1))]
    pub query: String,
    /// Market code such as 'en-US'. Leave empty for the default market.
    #[serde(default)]
    pub market: String,
    /// Number of articles (1-100).
    #[serde(default = "default_count")]
    #[validate(range(min = 1, max = 100))]
    pub count: u32,
    /// Only articles discovered within this period.
    #[serde(default)]
    pub freshness: Option<Freshness>,
}

#[derive(Debug, Default)]
pub struct BingNewsSearchTool;

#[async_trait]
impl AzureTool for BingNewsSearchTool {
    type Options = BingNewsSearchOptions;

    fn name(&self) -> &'static str {
        "bing_news_search"
    }

    fn description(&self) -> &'static str {
        "Search recent news articles with Bing. Optionally restrict to the last \
         day, week or month."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let params = [
            ("q", options.query.clone()),
            ("count", options.count.to_string()),
            ("mkt", options.market.clone()),
            (
                "freshness",
                options
                    .freshness
                    .map(|f| f.as_str().to_string())
                    .unwrap_or_default(),
            ),
        ];
        bing(ctx)
            .search_with_resource(&options.resource, "/news/search", &params)
            .await
            .map_err(failure("Bing News Search"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum ImageSize {
    Small,
    Medium,
    Large,
    Wallpaper,
}

impl ImageSize {
    fn as_str(self) -> &'static str {
        match self {
            ImageSize::Small => "Small",
            ImageSize::Medium => "Medium",
            ImageSize::Large => "Large",
            ImageSize::Wallpaper => "Wallpaper",
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct BingImageSearchOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub resource: BingResource,
    /// Image search query.
    #[validate(length(min = 1))]
    pub query: String,
    /// Market code such as 'en-US'. Leave empty for the default market.
    #[serde(default)]
    pub market: String,
    /// SafeSearch level.
    #[serde(default)]
    pub safe_search: Option<SafeSearch>,
    /// Number of images (1-150).
    #[serde(default = "default_count")]
    #[validate(range(min = 1, max = 150))]
    pub count: u32,
    /// Only images of this size.
    #[serde(default)]
    pub size: Option<ImageSize>,
    /// Dominant color or color type, e.g. 'Red', 'Monochrome', 'ColorOnly'.
    #[serde(default)]
    pub color: String,
}

impl BingImageSearchOptions {
    fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("q", self.query.clone()),
            ("count", self.count.to_string()),
            ("mkt", self.market.clone()),
            (
                "safeSearch",
                self.safe_search
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default(),
            ),
            (
                "size",
                self.size.map(|s| s.as_str().to_string()).unwrap_or_default(),
            ),
            ("color", self.color.clone()),
        ]
    }
}

#[derive(Debug, Default)]
pub struct BingImageSearchTool;

#[async_trait]
impl AzureTool for BingImageSearchTool {
    type Options = BingImageSearchOptions;

    fn name(&self) -> &'static str {
        "bing_image_search"
    }

    fn description(&self) -> &'static str {
        "Search images with Bing. Returns image URLs, thumbnails, dimensions \
         and the pages hosting them."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        bing(ctx)
            .search_with_resource(&options.resource, "/images/search", &options.params())
            .await
            .map_err(failure("Bing Image Search"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum VideoPricing {
    Free,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum VideoResolution {
    #[serde(rename = "SD480p")]
    Sd480p,
    #[serde(rename = "HD720p")]
    Hd720p,
    #[serde(rename = "HD1080p")]
    Hd1080p,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct BingVideoSearchOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub resource: BingResource,
    /// Video search query.
    #[validate(length(min = 1))]
    pub query: String,
    /// Market code such as 'en-US'. Leave empty for the default market.
    #[serde(default)]
    pub market: String,
    /// Number of videos (1-105).
    #[serde(default = "default_count")]
    #[validate(range(min = 1, max = 105))]
    pub count: u32,
    /// Only free or only paid videos.
    #[serde(default)]
    pub pricing: Option<VideoPricing>,
    /// Minimum resolution.
    #[serde(default)]
    pub resolution: Option<VideoResolution>,
}

impl BingVideoSearchOptions {
    fn params(&self) -> Vec<(&'static str, String)> {
        let pricing = match self.pricing {
            Some(VideoPricing::Free) => "Free",
            Some(VideoPricing::Paid) => "Paid",
            None => "",
        };
        let resolution = match self.resolution {
            Some(VideoResolution::Sd480p) => "SD480p",
            Some(VideoResolution::Hd720p) => "HD720p",
            Some(VideoResolution::Hd1080p) => "HD1080p",
            None => "",
        };
        vec![
            ("q", self.query.clone()),
            ("count", self.count.to_string()),
            ("mkt", self.market.clone()),
            ("pricing", pricing.to_string()),
            ("resolution", resolution.to_string()),
        ]
    }
}

#[derive(Debug, Default)]
pub struct BingVideoSearchTool;

#[async_trait]
impl AzureTool for BingVideoSearchTool {
    type Options = BingVideoSearchOptions;

    fn name(&self) -> &'static str {
        "bing_video_search"
    }

    fn description(&self) -> &'static str {
        "Search videos with Bing. Returns titles, publishers, durations, view \
         counts and thumbnail URLs."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        bing(ctx)
            .search_with_resource(&options.resource, "/videos/search", &options.params())
            .await
            .map_err(failure("Bing Video Search"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct BingEntitySearchOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub resource: BingResource,
    /// A person, company, place or thing to look up.
    #[validate(length(min = 1))]
    pub query: String,
    /// Market code such as 'en-US'. Leave empty for the default market.
    #[serde(default)]
    pub market: String,
}

#[derive(Debug, Default)]
pub struct BingEntitySearchTool;

#[async_trait]
impl AzureTool for BingEntitySearchTool {
    type Options = BingEntitySearchOptions;

    fn name(&self) -> &'static str {
        "bing_entity_search"
    }

    fn description(&self) -> &'static str {
        "Look up people, places, organizations and local businesses with Bing. \
         Returns entity facts, descriptions and contact details."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let params = [
            ("q", options.query.clone()),
            ("mkt", options.market.clone()),
        ];
        bing(ctx)
            .search_with_resource(&options.resource, "/entities", &params)
            .await
            .map_err(failure("Bing Entity Search"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure_error::handle_azure_error;
    use crate::config::Config;
    use crate::tool::parse_options;
    use crate::tools::raw;

    fn service_for(server: &mockito::Server) -> BingService {
        let mut config = Config::default();
        config.endpoints.bing = server.url();
        BingService::new(AzureService::new(&AzureContext::new(config)))
    }

    #[test]
    fn key_cache_key_format() {
        assert_eq!(
            key_cache_key("sub-1", "rg", "bing-prod"),
            "bing:key:sub-1:rg:bing-prod"
        );
    }

    #[test]
    fn web_search_options_flatten_resource() {
        let opts: BingWebSearchOptions = parse_options(raw(json!({
            "subscription": "prod",
            "resource_name": "bing-prod",
            "resource_group": "search-rg",
            "query": "rust async",
            "safe_search": "Strict",
        })))
        .unwrap();
        assert_eq!(opts.resource.resource_name, "bing-prod");
        assert_eq!(opts.safe_search, Some(SafeSearch::Strict));
        assert_eq!(opts.count, 10);
    }

    #[test]
    fn nested_resource_fields_are_validated() {
        let err = parse_options::<BingNewsSearchOptions>(raw(json!({
            "subscription": "prod",
            "resource_name": "",
            "resource_group": "search-rg",
            "query": "azure",
        })))
        .unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
    }

    #[test]
    fn unknown_freshness_is_rejected() {
        assert!(parse_options::<BingNewsSearchOptions>(raw(json!({
            "subscription": "prod",
            "resource_name": "bing-prod",
            "resource_group": "search-rg",
            "query": "azure",
            "freshness": "Year",
        })))
        .is_err());
    }

    #[test]
    fn image_filters_become_query_params() {
        let opts: BingImageSearchOptions = parse_options(raw(json!({
            "subscription": "prod",
            "resource_name": "bing-prod",
            "resource_group": "search-rg",
            "query": "aurora",
            "size": "Wallpaper",
            "count": 150,
        })))
        .unwrap();
        let params = opts.params();
        assert!(params.contains(&("size", "Wallpaper".to_string())));
        assert!(params.contains(&("count", "150".to_string())));
        assert!(params.contains(&("color", String::new())));
    }

    #[test]
    fn video_limits_and_resolutions() {
        let opts: BingVideoSearchOptions = parse_options(raw(json!({
            "subscription": "prod",
            "resource_name": "bing-prod",
            "resource_group": "search-rg",
            "query": "rustconf",
            "resolution": "HD1080p",
            "pricing": "Free",
        })))
        .unwrap();
        let params = opts.params();
        assert!(params.contains(&("resolution", "HD1080p".to_string())));
        assert!(params.contains(&("pricing", "Free".to_string())));

        let err = parse_options::<BingVideoSearchOptions>(raw(json!({
            "subscription": "prod",
            "resource_name": "bing-prod",
            "resource_group": "search-rg",
            "query": "rustconf",
            "count": 106,
        })))
        .unwrap_err();
        assert_eq!(err.to_dict()["field"], "count");
    }

    #[tokio::test]
    async fn key_lookup_rejects_path_like_names() {
        let server = mockito::Server::new_async().await;
        let err = service_for(&server)
            .api_key("s1", "rg", "bing/../../other")
            .await
            .unwrap_err();
        let err = handle_azure_error(err, Some("Bing Resource"));
        assert_eq!(err.to_dict()["field"], "resource_name");
    }

    #[tokio::test]
    async fn search_sends_key_and_drops_empty_params() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_header(KEY_HEADER, "secret-key")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("q".into(), "rust".into()),
                mockito::Matcher::UrlEncoded("count".into(), "5".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"webPages":{"value":[{"name":"The Rust Book"}]}}"#)
            .create_async()
            .await;

        let result = service_for(&server)
            .search(
                "/search",
                "secret-key",
                &[("q", "rust".into()), ("count", "5".into()), ("mkt", String::new())],
            )
            .await
            .unwrap();
        assert_eq!(result["webPages"]["value"][0]["name"], "The Rust Book");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_key_is_an_authorization_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/news/search")
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let failure = service_for(&server)
            .search("/news/search", "stale", &[("q", "azure".into())])
            .await
            .unwrap_err();
        let err = handle_azure_error(failure, Some("Bing News Search"));
        assert_eq!(err.kind_name(), "AuthorizationError");
    }

    #[tokio::test]
    async fn throttling_is_a_rate_limit_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search")
            .match_query(mockito::Matcher::Any)
            .with_status(429)
            .with_header("Retry-After", "30")
            .create_async()
            .await;

        let failure = service_for(&server)
            .search("/search", "k", &[("q", "x".into())])
            .await
            .unwrap_err();
        let err = handle_azure_error(failure, Some("Bing Web Search"));
        assert_eq!(err.kind_name(), "RateLimitError");
        assert_eq!(err.to_dict()["retry_after"], 30);
    }
}
