//! Application Insights: component discovery and telemetry queries.
//!
//! Telemetry is read through the resource-scoped Log Analytics query API,
//! so callers only need the component's resource ID.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::{Validate, ValidationError};

use super::failure;
use super::monitor::MonitorService;
use crate::azure_error::AzureResult;
use crate::context::AzureContext;
use crate::error::{ToolError, ToolResult};
use crate::registry::ToolRegistry;
use crate::service::{escape_kql, AzureService};
use crate::tool::{AzureTool, ToolMetadata};

const COMPONENT_PROJECTION: &str = " | project id, name, resourceGroup, location, subscriptionId, \
     appId = properties.AppId, instrumentationKey = properties.InstrumentationKey, \
     connectionString = properties.ConnectionString, \
     applicationType = properties.Application_Type, ingestionMode = properties.IngestionMode, \
     workspaceResourceId = properties.WorkspaceResourceId, \
     retentionInDays = properties.RetentionInDays, \
     publicNetworkAccess = properties.publicNetworkAccessForIngestion, \
     provisioningState = properties.provisioningState, \
     createdDate = properties.CreationDate, tags";

pub(crate) fn register(registry: &mut ToolRegistry) {
    registry.register::<AppInsightsListTool>("appinsights", Some("discovery"));
    registry.register::<AppInsightsGetTool>("appinsights", Some("discovery"));
    registry.register::<AppInsightsQueryTool>("appinsights", Some("query"));
    registry.register::<AppInsightsRequestsQueryTool>("appinsights", Some("requests"));
    registry.register::<AppInsightsDependenciesQueryTool>("appinsights", Some("dependencies"));
    registry.register::<AppInsightsExceptionsQueryTool>("appinsights", Some("exceptions"));
    registry.register::<AppInsightsTracesQueryTool>("appinsights", Some("traces"));
    registry.register::<AppInsightsEventsQueryTool>("appinsights", Some("events"));
}

/// Canonical ISO 8601 duration for the query API.
///
/// Accepts minutes and hours (`PT30M`, `PT1H`) and days, weeks or months
/// (`P1D`, `P2W`, `P1M`). Weeks and months become days; a month is 30 days.
pub fn normalize_timespan(timespan: &str) -> Option<String> {
    let upper = timespan.trim().to_ascii_uppercase();
    let (body, time) = match upper.strip_prefix("PT") {
        Some(rest) => (rest, true),
        None => (upper.strip_prefix('P')?, false),
    };
    let unit = body.chars().last()?;
    let count: u32 = body[..body.len() - unit.len_utf8()].parse().ok()?;
    if count == 0 {
        return None;
    }
    match (time, unit) {
        (true, 'M') => Some(format!("PT{count}M")),
        (true, 'H') => Some(format!("PT{count}H")),
        (false, 'D') => Some(format!("P{count}D")),
        (false, 'W') => Some(format!("P{}D", count.checked_mul(7)?)),
        (false, 'M') => Some(format!("P{}D", count.checked_mul(30)?)),
        _ => None,
    }
}

fn valid_timespan(timespan: &str) -> Result<(), ValidationError> {
    match normalize_timespan(timespan) {
        Some(_) => Ok(()),
        None => {
            let mut err = ValidationError::new("timespan");
            err.message = Some(
                format!("'{timespan}' is not a supported duration (PT30M, PT1H, P1D, P7D, P1M)")
                    .into(),
            );
            Err(err)
        }
    }
}

/// Append `| take top` unless the query already limits its rows.
pub fn with_take(query: &str, top: u32) -> String {
    let lower = query.to_ascii_lowercase();
    if lower.contains("| take ") || lower.contains("| limit ") {
        query.to_string()
    } else {
        format!("{query}\n| take {top}")
    }
}

/// KQL for one telemetry table, newest rows first.
pub fn telemetry_query(table: &str, filters: &[String], columns: &str, top: u32) -> String {
    let mut query = table.to_string();
    if !filters.is_empty() {
        query.push_str(&format!(" | where {}", filters.join(" and ")));
    }
    query.push_str(&format!(
        " | project {columns} | order by timestamp desc | take {top}"
    ));
    query
}

fn contains(column: &str, value: &str) -> Option<String> {
    (!value.is_empty()).then(|| format!("{column} contains '{}'", escape_kql(value)))
}

fn equals(column: &str, value: &str) -> Option<String> {
    (!value.is_empty()).then(|| format!("{column} == '{}'", escape_kql(value)))
}

fn success_filter(success: Option<bool>) -> Option<String> {
    success.map(|s| format!("success == {s}"))
}

fn slower_than(min_duration_ms: u32) -> Option<String> {
    (min_duration_ms > 0).then(|| format!("duration > {min_duration_ms}"))
}

const OPERATION_COLUMNS: &str =
    "operation_Id, operation_Name, cloud_RoleName, cloud_RoleInstance, appId, itemId";

pub struct AppInsightsService {
    base: AzureService,
}

impl AppInsightsService {
    pub fn new(base: AzureService) -> Self {
        Self { base }
    }

    pub async fn list(
        &self,
        subscription: &str,
        resource_group: &str,
        top: u32,
    ) -> AzureResult<Vec<Value>> {
        let sub_id = self.base.resolve_subscription(subscription, None).await?;
        let mut query = String::from("resources | where type =~ 'microsoft.insights/components'");
        if !resource_group.is_empty() {
            query.push_str(&format!(
                " | where resourceGroup =~ '{}'",
                escape_kql(resource_group)
            ));
        }
        query.push_str(COMPONENT_PROJECTION);
        query.push_str(&format!(" | order by name asc | take {top}"));

        let result = self
            .base
            .execute_resource_graph_query(&query, &[sub_id], &[], 0, top)
            .await?;
        Ok(result["data"].as_array().cloned().unwrap_or_default())
    }

    pub async fn get(&self, subscription: &str, resource_group: &str, name: &str) -> AzureResult<Value> {
        let sub_id = self.base.resolve_subscription(subscription, None).await?;
        let query = format!(
            "resources | where type =~ 'microsoft.insights/components' \
             | where resourceGroup =~ '{}' | where name =~ '{}'{COMPONENT_PROJECTION}",
            escape_kql(resource_group),
            escape_kql(name)
        );
        let result = self
            .base
            .execute_resource_graph_query(&query, &[sub_id], &[], 0, 1)
            .await?;
        result["data"]
            .as_array()
            .and_then(|rows| rows.first())
            .cloned()
            .ok_or_else(|| {
                ToolError::not_found(format!(
                    "Application Insights '{name}' not found in resource group '{resource_group}'"
                ))
                .into()
            })
    }

    /// Run KQL against a component. Queries without a row limit get `top`.
    pub async fn query(&self, window: &TelemetryWindow, query: &str) -> AzureResult<Value> {
        let timespan = normalize_timespan(&window.timespan).ok_or_else(|| {
            ToolError::validation_field(
                format!("'{}' is not a supported duration", window.timespan),
                "timespan",
            )
        })?;
        MonitorService::new(self.base.clone())
            .query_resource(
                &window.resource_id,
                &with_take(query, window.top),
                &timespan,
                false,
            )
            .await
    }
}

fn appinsights(ctx: &AzureContext) -> AppInsightsService {
    AppInsightsService::new(AzureService::new(ctx))
}

fn default_top() -> u32 {
    100
}

fn default_timespan() -> String {
    "P1D".to_string()
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct AppInsightsListOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group to filter by. Leave empty for all resource groups.
    #[serde(default)]
    pub resource_group: String,
    /// Maximum number of resources to return (1-1000).
    #[serde(default = "default_top")]
    #[validate(range(min = 1, max = 1000))]
    pub top: u32,
}

#[derive(Debug, Default)]
pub struct AppInsightsListTool;

#[async_trait]
impl AzureTool for AppInsightsListTool {
    type Options = AppInsightsListOptions;

    fn name(&self) -> &'static str {
        "appinsights_list"
    }

    fn description(&self) -> &'static str {
        "List Application Insights resources in a subscription. Returns the \
         resource IDs the query tools need, plus connection strings and linked \
         workspaces."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        appinsights(ctx)
            .list(&options.subscription, &options.resource_group, options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Application Insights"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct AppInsightsGetOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group containing the Application Insights resource.
    #[validate(length(min = 1))]
    pub resource_group: String,
    /// Name of the Application Insights resource.
    #[validate(length(min = 1))]
    pub name: String,
}

#[derive(Debug, Default)]
pub struct AppInsightsGetTool;

#[async_trait]
impl AzureTool for AppInsightsGetTool {
    type Options = AppInsightsGetOptions;

    fn name(&self) -> &'static str {
        "appinsights_get"
    }

    fn description(&self) -> &'static str {
        "Get one Application Insights resource: resource ID, connection string, \
         linked Log Analytics workspace and retention."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        appinsights(ctx)
            .get(&options.subscription, &options.resource_group, &options.name)
            .await
            .map_err(failure("Application Insights"))
    }
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Which component to query and over what window.
#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct TelemetryWindow {
    /// Full resource ID of the Application Insights resource, from
    /// appinsights_list or appinsights_get.
    #[validate(length(min = 1))]
    pub resource_id: String,
    /// Time range as an ISO 8601 duration: PT1H, P1D, P7D, P30D.
    #[serde(default = "default_timespan")]
    #[validate(custom(function = "valid_timespan"))]
    pub timespan: String,
    /// Maximum rows to return (1-10000).
    #[serde(default = "default_top")]
    #[validate(range(min = 1, max = 10000))]
    pub top: u32,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct AppInsightsQueryOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub window: TelemetryWindow,
    /// KQL query. Tables include traces, exceptions, requests, dependencies,
    /// customEvents, pageViews and availabilityResults.
    #[validate(length(min = 1))]
    pub query: String,
}

#[derive(Debug, Default)]
pub struct AppInsightsQueryTool;

#[async_trait]
impl AzureTool for AppInsightsQueryTool {
    type Options = AppInsightsQueryOptions;

    fn name(&self) -> &'static str {
        "appinsights_query"
    }

    fn description(&self) -> &'static str {
        "Run a custom KQL query against Application Insights telemetry. Use it \
         for analytics the specialised appinsights tools do not cover."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        appinsights(ctx)
            .query(&options.window, &options.query)
            .await
            .map_err(failure("Application Insights Query"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct AppInsightsRequestsQueryOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub window: TelemetryWindow,
    /// Only requests whose URL contains this text.
    #[serde(default)]
    pub url_filter: String,
    /// Only this HTTP status code, e.g. '500'.
    #[serde(default)]
    pub result_code: String,
    /// Only successful (true) or failed (false) requests.
    #[serde(default)]
    pub success: Option<bool>,
    /// Only requests slower than this many milliseconds.
    #[serde(default)]
    pub min_duration_ms: u32,
}

impl AppInsightsRequestsQueryOptions {
    pub fn kql(&self) -> String {
        let filters: Vec<String> = [
            contains("url", &self.url_filter),
            equals("resultCode", &self.result_code),
            success_filter(self.success),
            slower_than(self.min_duration_ms),
        ]
        .into_iter()
        .flatten()
        .collect();
        telemetry_query(
            "requests",
            &filters,
            &format!(
                "timestamp, name, url, resultCode, success, duration, performanceBucket, \
                 source, {OPERATION_COLUMNS}"
            ),
            self.window.top,
        )
    }
}

#[derive(Debug, Default)]
pub struct AppInsightsRequestsQueryTool;

#[async_trait]
impl AzureTool for AppInsightsRequestsQueryTool {
    type Options = AppInsightsRequestsQueryOptions;

    fn name(&self) -> &'static str {
        "appinsights_requests_query"
    }

    fn description(&self) -> &'static str {
        "Query incoming HTTP requests recorded by Application Insights. Filter by \
         URL, status code, success or minimum duration to find slow or failing \
         endpoints."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        appinsights(ctx)
            .query(&options.window, &options.kql())
            .await
            .map_err(failure("Application Insights Requests"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct AppInsightsDependenciesQueryOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub window: TelemetryWindow,
    /// Only this dependency type, e.g. 'SQL', 'HTTP', 'Azure blob'.
    #[serde(default)]
    pub dependency_type: String,
    /// Only dependencies whose target contains this text.
    #[serde(default)]
    pub target: String,
    /// Only successful (true) or failed (false) calls.
    #[serde(default)]
    pub success: Option<bool>,
    /// Only calls slower than this many milliseconds.
    #[serde(default)]
    pub min_duration_ms: u32,
}

impl AppInsightsDependenciesQueryOptions {
    pub fn kql(&self) -> String {
        let filters: Vec<String> = [
            equals("type", &self.dependency_type),
            contains("target", &self.target),
            success_filter(self.success),
            slower_than(self.min_duration_ms),
        ]
        .into_iter()
        .flatten()
        .collect();
        telemetry_query(
            "dependencies",
            &filters,
            &format!(
                "timestamp, name, type, target, data, resultCode, success, duration, \
                 performanceBucket, {OPERATION_COLUMNS}"
            ),
            self.window.top,
        )
    }
}

#[derive(Debug, Default)]
pub struct AppInsightsDependenciesQueryTool;

#[async_trait]
impl AzureTool for AppInsightsDependenciesQueryTool {
    type Options = AppInsightsDependenciesQueryOptions;

    fn name(&self) -> &'static str {
        "appinsights_dependencies_query"
    }

    fn description(&self) -> &'static str {
        "Query outgoing dependency calls (databases, HTTP APIs, storage) recorded \
         by Application Insights, with duration and result."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        appinsights(ctx)
            .query(&options.window, &options.kql())
            .await
            .map_err(failure("Application Insights Dependencies"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct AppInsightsExceptionsQueryOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub window: TelemetryWindow,
    /// Only exceptions whose type contains this text.
    #[serde(default)]
    pub exception_type: String,
    /// Only exceptions with this problem ID.
    #[serde(default)]
    pub problem_id: String,
}

impl AppInsightsExceptionsQueryOptions {
    pub fn kql(&self) -> String {
        let filters: Vec<String> = [
            contains("type", &self.exception_type),
            equals("problemId", &self.problem_id),
        ]
        .into_iter()
        .flatten()
        .collect();
        telemetry_query(
            "exceptions",
            &filters,
            &format!(
                "timestamp, type, message, outerMessage, innermostMessage, problemId, \
                 handledAt, severityLevel, details, {OPERATION_COLUMNS}"
            ),
            self.window.top,
        )
    }
}

#[derive(Debug, Default)]
pub struct AppInsightsExceptionsQueryTool;

#[async_trait]
impl AzureTool for AppInsightsExceptionsQueryTool {
    type Options = AppInsightsExceptionsQueryOptions;

    fn name(&self) -> &'static str {
        "appinsights_exceptions_query"
    }

    fn description(&self) -> &'static str {
        "Query exceptions recorded by Application Insights with their messages, \
         problem IDs and stack details."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        appinsights(ctx)
            .query(&options.window, &options.kql())
            .await
            .map_err(failure("Application Insights Exceptions"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum TraceSeverity {
    Verbose,
    Information,
    Warning,
    Error,
    Critical,
}

impl TraceSeverity {
    /// Numeric `severityLevel` stored in the traces table.
    pub fn level(self) -> u8 {
        match self {
            TraceSeverity::Verbose => 0,
            TraceSeverity::Information => 1,
            TraceSeverity::Warning => 2,
            TraceSeverity::Error => 3,
            TraceSeverity::Critical => 4,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct AppInsightsTracesQueryOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub window: TelemetryWindow,
    /// Only traces at this severity.
    #[serde(default)]
    pub severity_level: Option<TraceSeverity>,
    /// Only traces whose message contains this text.
    #[serde(default)]
    pub message_filter: String,
}

impl AppInsightsTracesQueryOptions {
    pub fn kql(&self) -> String {
        let filters: Vec<String> = [
            self.severity_level
                .map(|s| format!("severityLevel == {}", s.level())),
            contains("message", &self.message_filter),
        ]
        .into_iter()
        .flatten()
        .collect();
        telemetry_query(
            "traces",
            &filters,
            &format!("timestamp, message, severityLevel, customDimensions, {OPERATION_COLUMNS}"),
            self.window.top,
        )
    }
}

#[derive(Debug, Default)]
pub struct AppInsightsTracesQueryTool;

#[async_trait]
impl AzureTool for AppInsightsTracesQueryTool {
    type Options = AppInsightsTracesQueryOptions;

    fn name(&self) -> &'static str {
        "appinsights_traces_query"
    }

    fn description(&self) -> &'static str {
        "Query application log traces recorded by Application Insights, \
         optionally by severity or message text."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        appinsights(ctx)
            .query(&options.window, &options.kql())
            .await
            .map_err(failure("Application Insights Traces"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct AppInsightsEventsQueryOptions {
    #[serde(flatten)]
    #[validate(nested)]
    pub window: TelemetryWindow,
    /// Only custom events with this name.
    #[serde(default)]
    pub event_name: String,
}

impl AppInsightsEventsQueryOptions {
    pub fn kql(&self) -> String {
        let filters: Vec<String> = equals("name", &self.event_name).into_iter().collect();
        telemetry_query(
            "customEvents",
            &filters,
            &format!("timestamp, name, customDimensions, customMeasurements, {OPERATION_COLUMNS}"),
            self.window.top,
        )
    }
}

#[derive(Debug, Default)]
pub struct AppInsightsEventsQueryTool;

#[async_trait]
impl AzureTool for AppInsightsEventsQueryTool {
    type Options = AppInsightsEventsQueryOptions;

    fn name(&self) -> &'static str {
        "appinsights_events_query"
    }

    fn description(&self) -> &'static str {
        "Query custom events tracked by the application, with their dimensions \
         and measurements."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        appinsights(ctx)
            .query(&options.window, &options.kql())
            .await
            .map_err(failure("Application Insights Events"))
    }
}
