//! Azure Monitor: Log Analytics, metrics, the activity log, alerting,
//! autoscale and monitoring configuration.

mod service;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

pub use service::{ActivityLogFilter, AlertFilter, BatchQuery, MonitorService};

use super::failure;
use crate::context::AzureContext;
use crate::error::{ToolError, ToolResult};
use crate::registry::ToolRegistry;
use crate::service::AzureService;
use crate::tool::{AzureTool, ToolMetadata};

pub(crate) fn register(registry: &mut ToolRegistry) {
    registry.register::<MonitorWorkspaceListTool>("monitor", Some("workspace"));
    registry.register::<MonitorLogsQueryTool>("monitor", Some("logs"));
    registry.register::<MonitorLogsQueryResourceTool>("monitor", Some("logs"));
    registry.register::<MonitorLogsBatchQueryTool>("monitor", Some("logs"));
    registry.register::<MonitorMetricsQueryTool>("monitor", Some("metrics"));
    registry.register::<MonitorMetricDefinitionsListTool>("monitor", Some("metrics"));
    registry.register::<MonitorMetricBaselinesGetTool>("monitor", Some("metrics"));
    registry.register::<MonitorActivityLogQueryTool>("monitor", Some("activity"));
    registry.register::<MonitorAlertsListTool>("monitor", Some("alerts"));
    registry.register::<MonitorAlertRulesListTool>("monitor", Some("alerts"));
    registry.register::<MonitorAlertRuleGetTool>("monitor", Some("alerts"));
    registry.register::<MonitorAutoscaleSettingsListTool>("monitor", Some("autoscale"));
    registry.register::<MonitorAutoscaleSettingsGetTool>("monitor", Some("autoscale"));
    registry.register::<MonitorActionGroupsListTool>("monitor", Some("config"));
    registry.register::<MonitorDiagnosticSettingsListTool>("monitor", Some("config"));
    registry.register::<MonitorDataCollectionRulesListTool>("monitor", Some("config"));
    registry.register::<MonitorScheduledQueryRulesListTool>("monitor", Some("config"));
}

fn monitor(ctx: &AzureContext) -> MonitorService {
    MonitorService::new(AzureService::new(ctx))
}

fn default_top() -> u32 {
    100
}

fn default_log_hours() -> u32 {
    24
}

fn default_metric_hours() -> u32 {
    1
}

fn default_interval() -> String {
    "PT1M".to_string()
}

fn default_activity_hours() -> u32 {
    24 * 7
}

fn default_baseline_interval() -> String {
    "PT1H".to_string()
}

// ---------------------------------------------------------------------------
// Workspaces and logs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MonitorWorkspaceListOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group to filter by. Leave empty for all resource groups.
    #[serde(default)]
    pub resource_group: String,
    /// Maximum number of workspaces to return (1-1000).
    #[serde(default = "default_top")]
    #[validate(range(min = 1, max = 1000))]
    pub top: u32,
}

#[derive(Debug, Default)]
pub struct MonitorWorkspaceListTool;

#[async_trait]
impl AzureTool for MonitorWorkspaceListTool {
    type Options = MonitorWorkspaceListOptions;

    fn name(&self) -> &'static str {
        "monitor_workspace_list"
    }

    fn description(&self) -> &'static str {
        "List Log Analytics workspaces in a subscription. Returns the workspace \
         customerId needed by monitor_logs_query, plus SKU and retention."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        monitor(ctx)
            .list_workspaces(&options.subscription, &options.resource_group, options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Log Analytics Workspaces"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MonitorLogsQueryOptions {
    /// Log Analytics workspace ID (the workspace customerId GUID).
    #[validate(length(min = 1))]
    pub workspace_id: String,
    /// KQL query, e.g. 'AzureActivity | where Level == "Error" | take 10'.
    #[validate(length(min = 1))]
    pub query: String,
    /// How far back to query, in hours (1-720).
    #[serde(default = "default_log_hours")]
    #[validate(range(min = 1, max = 720))]
    pub timespan_hours: u32,
    /// Include query execution statistics in the result.
    #[serde(default)]
    pub include_statistics: bool,
}

#[derive(Debug, Default)]
pub struct MonitorLogsQueryTool;

#[async_trait]
impl AzureTool for MonitorLogsQueryTool {
    type Options = MonitorLogsQueryOptions;

    fn name(&self) -> &'static str {
        "monitor_logs_query"
    }

    fn description(&self) -> &'static str {
        "Run a KQL query against a Log Analytics workspace. Each result table is \
         returned with its column names and one object per row."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        monitor(ctx)
            .query_logs(
                &options.workspace_id,
                &options.query,
                options.timespan_hours,
                options.include_statistics,
            )
            .await
            .map_err(failure("Log Analytics Query"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MonitorLogsQueryResourceOptions {
    /// Full Azure resource ID whose logs to query.
    #[validate(length(min = 1))]
    pub resource_id: String,
    /// KQL query.
    #[validate(length(min = 1))]
    pub query: String,
    /// How far back to query, in hours (1-720).
    #[serde(default = "default_log_hours")]
    #[validate(range(min = 1, max = 720))]
    pub timespan_hours: u32,
    /// Include query execution statistics in the result.
    #[serde(default)]
    pub include_statistics: bool,
}

#[derive(Debug, Default)]
pub struct MonitorLogsQueryResourceTool;

#[async_trait]
impl AzureTool for MonitorLogsQueryResourceTool {
    type Options = MonitorLogsQueryResourceOptions;

    fn name(&self) -> &'static str {
        "monitor_logs_query_resource"
    }

    fn description(&self) -> &'static str {
        "Run a KQL query against the logs of one Azure resource, without knowing \
         which workspace they are sent to."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        monitor(ctx)
            .query_resource(
                &options.resource_id,
                &options.query,
                &format!("PT{}H", options.timespan_hours),
                options.include_statistics,
            )
            .await
            .map_err(failure("Resource Log Query"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MonitorLogsBatchQueryOptions {
    /// Log Analytics workspace ID (GUID).
    #[validate(length(min = 1))]
    pub workspace_id: String,
    /// Up to 10 queries, each with a unique 'id' and a KQL 'query'.
    #[validate(length(min = 1, max = 10), nested)]
    pub queries: Vec<BatchQuery>,
    /// Time range in hours applied to every query (1-720).
    #[serde(default = "default_log_hours")]
    #[validate(range(min = 1, max = 720))]
    pub timespan_hours: u32,
}

#[derive(Debug, Default)]
pub struct MonitorLogsBatchQueryTool;

#[async_trait]
impl AzureTool for MonitorLogsBatchQueryTool {
    type Options = MonitorLogsBatchQueryOptions;

    fn name(&self) -> &'static str {
        "monitor_logs_batch_query"
    }

    fn description(&self) -> &'static str {
        "Run several KQL queries against one Log Analytics workspace in a single \
         request. Each result carries the id of its query and its own status."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = options.queries.iter().find(|q| !seen.insert(q.id.as_str())) {
            return Err(ToolError::validation_field(
                format!("Duplicate query id '{}'", dup.id),
                "queries",
            ));
        }
        monitor(ctx)
            .query_logs_batch(&options.workspace_id, &options.queries, options.timespan_hours)
            .await
            .map(Value::Array)
            .map_err(failure("Batch Log Query"))
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MonitorMetricsQueryOptions {
    /// Full Azure resource ID, e.g. '/subscriptions/.../providers/Microsoft.Compute/virtualMachines/vm1'.
    #[validate(length(min = 1))]
    pub resource_id: String,
    /// Metric names, e.g. ['Percentage CPU']. Use monitor_metric_definitions_list to discover them.
    #[validate(length(min = 1))]
    pub metric_names: Vec<String>,
    /// How far back to query, in hours (1-720).
    #[serde(default = "default_metric_hours")]
    #[validate(range(min = 1, max = 720))]
    pub timespan_hours: u32,
    /// Aggregation interval as an ISO 8601 duration (PT1M, PT5M, PT1H, ...).
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Aggregations to return: Average, Total, Maximum, Minimum, Count.
    #[serde(default)]
    pub aggregations: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MonitorMetricsQueryTool;

#[async_trait]
impl AzureTool for MonitorMetricsQueryTool {
    type Options = MonitorMetricsQueryOptions;

    fn name(&self) -> &'static str {
        "monitor_metrics_query"
    }

    fn description(&self) -> &'static str {
        "Query platform metrics for an Azure resource over a recent time window. \
         Returns one time series per metric and dimension combination."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        monitor(ctx)
            .query_metrics(
                &options.resource_id,
                &options.metric_names,
                options.timespan_hours,
                &options.interval,
                &options.aggregations,
            )
            .await
            .map_err(failure("Metrics Query"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MonitorMetricDefinitionsListOptions {
    /// Full Azure resource ID.
    #[validate(length(min = 1))]
    pub resource_id: String,
}

#[derive(Debug, Default)]
pub struct MonitorMetricDefinitionsListTool;

#[async_trait]
impl AzureTool for MonitorMetricDefinitionsListTool {
    type Options = MonitorMetricDefinitionsListOptions;

    fn name(&self) -> &'static str {
        "monitor_metric_definitions_list"
    }

    fn description(&self) -> &'static str {
        "List the metrics available for an Azure resource with their units, \
         supported aggregations and time grains."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        monitor(ctx)
            .list_metric_definitions(&options.resource_id)
            .await
            .map(Value::Array)
            .map_err(failure("Metric Definitions"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MonitorMetricBaselinesGetOptions {
    /// Full Azure resource ID.
    #[validate(length(min = 1))]
    pub resource_id: String,
    /// Metric names to get baselines for.
    #[validate(length(min = 1))]
    pub metric_names: Vec<String>,
    /// Window the baseline covers, in hours (1-720).
    #[serde(default = "default_log_hours")]
    #[validate(range(min = 1, max = 720))]
    pub timespan_hours: u32,
    /// Baseline interval as an ISO 8601 duration.
    #[serde(default = "default_baseline_interval")]
    pub interval: String,
}

#[derive(Debug, Default)]
pub struct MonitorMetricBaselinesGetTool;

#[async_trait]
impl AzureTool for MonitorMetricBaselinesGetTool {
    type Options = MonitorMetricBaselinesGetOptions;

    fn name(&self) -> &'static str {
        "monitor_metric_baselines_get"
    }

    fn description(&self) -> &'static str {
        "Get the expected low and high thresholds of resource metrics at each \
         sensitivity. Compare live values against them to spot anomalies."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        monitor(ctx)
            .get_metric_baselines(
                &options.resource_id,
                &options.metric_names,
                options.timespan_hours,
                &options.interval,
            )
            .await
            .map(Value::Array)
            .map_err(failure("Metric Baselines"))
    }
}

// ---------------------------------------------------------------------------
// Activity log
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MonitorActivityLogQueryOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Only events for this resource group.
    #[serde(default)]
    pub resource_group: String,
    /// Only events for this full resource ID.
    #[serde(default)]
    pub resource_id: String,
    /// How far back to look, in hours (1-2160, i.e. up to 90 days).
    #[serde(default = "default_activity_hours")]
    #[validate(range(min = 1, max = 2160))]
    pub timespan_hours: u32,
    /// Only this operation, e.g. 'Microsoft.Compute/virtualMachines/write'.
    #[serde(default)]
    pub operation_name: String,
    /// Only events with this status: Succeeded, Failed, Started, ...
    #[serde(default)]
    pub status: String,
    /// Maximum number of events to return (1-1000).
    #[serde(default = "default_top")]
    #[validate(range(min = 1, max = 1000))]
    pub top: u32,
}

#[derive(Debug, Default)]
pub struct MonitorActivityLogQueryTool;

#[async_trait]
impl AzureTool for MonitorActivityLogQueryTool {
    type Options = MonitorActivityLogQueryOptions;

    fn name(&self) -> &'static str {
        "monitor_activity_log_query"
    }

    fn description(&self) -> &'static str {
        "Query the subscription activity log to find who created, changed or \
         deleted Azure resources and when. Filter by resource group, resource, \
         operation or status."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let filter = ActivityLogFilter {
            resource_group: &options.resource_group,
            resource_id: &options.resource_id,
            operation_name: &options.operation_name,
            status: &options.status,
        };
        monitor(ctx)
            .query_activity_log(
                &options.subscription,
                &filter,
                options.timespan_hours,
                options.top,
            )
            .await
            .map(Value::Array)
            .map_err(failure("Activity Log"))
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum AlertSeverity {
    Sev0,
    Sev1,
    Sev2,
    Sev3,
    Sev4,
}

impl AlertSeverity {
    fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Sev0 => "Sev0",
            AlertSeverity::Sev1 => "Sev1",
            AlertSeverity::Sev2 => "Sev2",
            AlertSeverity::Sev3 => "Sev3",
            AlertSeverity::Sev4 => "Sev4",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum AlertState {
    New,
    Acknowledged,
    Closed,
}

impl AlertState {
    fn as_str(self) -> &'static str {
        match self {
            AlertState::New => "New",
            AlertState::Acknowledged => "Acknowledged",
            AlertState::Closed => "Closed",
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MonitorAlertsListOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group to filter by. Leave empty for all resource groups.
    #[serde(default)]
    pub resource_group: String,
    /// Only alerts of this severity.
    #[serde(default)]
    pub severity: Option<AlertSeverity>,
    /// Only alerts in this state.
    #[serde(default)]
    pub state: Option<AlertState>,
    /// Maximum number of alerts to return (1-1000).
    #[serde(default = "default_top")]
    #[validate(range(min = 1, max = 1000))]
    pub top: u32,
}

#[derive(Debug, Default)]
pub struct MonitorAlertsListTool;

#[async_trait]
impl AzureTool for MonitorAlertsListTool {
    type Options = MonitorAlertsListOptions;

    fn name(&self) -> &'static str {
        "monitor_alerts_list"
    }

    fn description(&self) -> &'static str {
        "List fired alerts in a subscription, newest first, with severity, state, \
         target resource and the rule that raised them."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let filter = AlertFilter {
            resource_group: &options.resource_group,
            severity: options.severity.map(AlertSeverity::as_str).unwrap_or_default(),
            state: options.state.map(AlertState::as_str).unwrap_or_default(),
        };
        monitor(ctx)
            .list_alerts(&options.subscription, &filter, options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Alerts"))
    }
}

/// Options shared by the subscription or resource group listings.
#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MonitorScopedListOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group to list from. Leave empty for the whole subscription.
    #[serde(default)]
    pub resource_group: String,
    /// Maximum number of items to return (1-1000).
    #[serde(default = "default_top")]
    #[validate(range(min = 1, max = 1000))]
    pub top: u32,
}

#[derive(Debug, Default)]
pub struct MonitorAlertRulesListTool;

#[async_trait]
impl AzureTool for MonitorAlertRulesListTool {
    type Options = MonitorScopedListOptions;

    fn name(&self) -> &'static str {
        "monitor_alert_rules_list"
    }

    fn description(&self) -> &'static str {
        "List metric alert rules with their scopes, conditions, thresholds and \
         evaluation frequency."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        monitor(ctx)
            .list_alert_rules(&options.subscription, &options.resource_group, options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Alert Rules"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MonitorAlertRuleGetOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group containing the rule.
    #[validate(length(min = 1))]
    pub resource_group: String,
    /// Name of the metric alert rule.
    #[validate(length(min = 1))]
    pub rule_name: String,
}

#[derive(Debug, Default)]
pub struct MonitorAlertRuleGetTool;

#[async_trait]
impl AzureTool for MonitorAlertRuleGetTool {
    type Options = MonitorAlertRuleGetOptions;

    fn name(&self) -> &'static str {
        "monitor_alert_rule_get"
    }

    fn description(&self) -> &'static str {
        "Get one metric alert rule with its full criteria."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        monitor(ctx)
            .get_alert_rule(
                &options.subscription,
                &options.resource_group,
                &options.rule_name,
            )
            .await
            .map_err(failure("Alert Rule"))
    }
}

// ---------------------------------------------------------------------------
// Autoscale
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MonitorAutoscaleSettingsListTool;

#[async_trait]
impl AzureTool for MonitorAutoscaleSettingsListTool {
    type Options = MonitorScopedListOptions;

    fn name(&self) -> &'static str {
        "monitor_autoscale_settings_list"
    }

    fn description(&self) -> &'static str {
        "List autoscale settings with their target resource, capacity limits and \
         scale rules."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        monitor(ctx)
            .list_autoscale_settings(&options.subscription, &options.resource_group, options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Autoscale Settings"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MonitorAutoscaleSettingsGetOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group containing the setting.
    #[validate(length(min = 1))]
    pub resource_group: String,
    /// Name of the autoscale setting.
    #[validate(length(min = 1))]
    pub setting_name: String,
}

#[derive(Debug, Default)]
pub struct MonitorAutoscaleSettingsGetTool;

#[async_trait]
impl AzureTool for MonitorAutoscaleSettingsGetTool {
    type Options = MonitorAutoscaleSettingsGetOptions;

    fn name(&self) -> &'static str {
        "monitor_autoscale_settings_get"
    }

    fn description(&self) -> &'static str {
        "Get one autoscale setting with its profiles and scale rules."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        monitor(ctx)
            .get_autoscale_setting(
                &options.subscription,
                &options.resource_group,
                &options.setting_name,
            )
            .await
            .map_err(failure("Autoscale Setting"))
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MonitorActionGroupsListTool;

#[async_trait]
impl AzureTool for MonitorActionGroupsListTool {
    type Options = MonitorScopedListOptions;

    fn name(&self) -> &'static str {
        "monitor_action_groups_list"
    }

    fn description(&self) -> &'static str {
        "List action groups and who they notify: email, SMS, webhook and app \
         push receivers."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        monitor(ctx)
            .list_action_groups(&options.subscription, &options.resource_group, options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Action Groups"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MonitorDiagnosticSettingsListOptions {
    /// Full Azure resource ID.
    #[validate(length(min = 1))]
    pub resource_id: String,
}

#[derive(Debug, Default)]
pub struct MonitorDiagnosticSettingsListTool;

#[async_trait]
impl AzureTool for MonitorDiagnosticSettingsListTool {
    type Options = MonitorDiagnosticSettingsListOptions;

    fn name(&self) -> &'static str {
        "monitor_diagnostic_settings_list"
    }

    fn description(&self) -> &'static str {
        "List where a resource sends its logs and metrics: workspace, storage \
         account or event hub, with the enabled categories."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        monitor(ctx)
            .list_diagnostic_settings(&options.resource_id)
            .await
            .map(Value::Array)
            .map_err(failure("Diagnostic Settings"))
    }
}

#[derive(Debug, Default)]
pub struct MonitorDataCollectionRulesListTool;

#[async_trait]
impl AzureTool for MonitorDataCollectionRulesListTool {
    type Options = MonitorScopedListOptions;

    fn name(&self) -> &'static str {
        "monitor_data_collection_rules_list"
    }

    fn description(&self) -> &'static str {
        "List data collection rules with their data sources and destinations."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        monitor(ctx)
            .list_data_collection_rules(&options.subscription, &options.resource_group, options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Data Collection Rules"))
    }
}

#[derive(Debug, Default)]
pub struct MonitorScheduledQueryRulesListTool;

#[async_trait]
impl AzureTool for MonitorScheduledQueryRulesListTool {
    type Options = MonitorScopedListOptions;

    fn name(&self) -> &'static str {
        "monitor_scheduled_query_rules_list"
    }

    fn description(&self) -> &'static str {
        "List log search alert rules with their KQL conditions, severity and \
         evaluation window."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        monitor(ctx)
            .list_scheduled_query_rules(&options.subscription, &options.resource_group, options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Scheduled Query Rules"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{parse_options, DynTool};
    use crate::tools::raw;
    use serde_json::json;

    #[test]
    fn logs_query_defaults_to_a_day() {
        let opts: MonitorLogsQueryOptions = parse_options(raw(json!({
            "workspace_id": "00000000-0000-0000-0000-000000000000",
            "query": "Heartbeat | take 1",
        })))
        .unwrap();
        assert_eq!(opts.timespan_hours, 24);
        assert!(!opts.include_statistics);
    }

    #[test]
    fn metrics_need_at_least_one_name() {
        let err = parse_options::<MonitorMetricsQueryOptions>(raw(json!({
            "resource_id": "/subscriptions/1/resourceGroups/rg",
            "metric_names": [],
        })))
        .unwrap_err();
        assert_eq!(err.to_dict()["field"], "metric_names");
    }

    #[test]
    fn activity_log_window_is_bounded() {
        let opts: MonitorActivityLogQueryOptions =
            parse_options(raw(json!({ "subscription": "prod" }))).unwrap();
        assert_eq!(opts.timespan_hours, 168);

        assert!(parse_options::<MonitorActivityLogQueryOptions>(raw(json!({
            "subscription": "prod",
            "timespan_hours": 5000,
        })))
        .is_err());
    }

    #[tokio::test]
    async fn metrics_reject_bare_names_before_any_request() {
        let ctx = AzureContext::for_tests();
        let err = MonitorMetricDefinitionsListTool
            .run(&ctx, raw(json!({ "resource_id": "vm1" })))
            .await
            .unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
    }

    #[test]
    fn batch_query_limits_are_enforced() {
        let queries: Vec<Value> = (0..11)
            .map(|i| json!({ "id": format!("q{i}"), "query": "Heartbeat" }))
            .collect();
        let err = parse_options::<MonitorLogsBatchQueryOptions>(raw(json!({
            "workspace_id": "ws",
            "queries": queries,
        })))
        .unwrap_err();
        assert_eq!(err.to_dict()["field"], "queries");

        assert!(parse_options::<MonitorLogsBatchQueryOptions>(raw(json!({
            "workspace_id": "ws",
            "queries": [{ "id": "a", "query": "" }],
        })))
        .is_err());
    }

    #[tokio::test]
    async fn duplicate_batch_ids_are_rejected() {
        let ctx = AzureContext::for_tests();
        let err = MonitorLogsBatchQueryTool
            .run(
                &ctx,
                raw(json!({
                    "workspace_id": "ws",
                    "queries": [
                        { "id": "a", "query": "Heartbeat" },
                        { "id": "a", "query": "AzureActivity" },
                    ],
                })),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_dict()["field"], "queries");
    }

    #[test]
    fn alert_filters_are_closed_sets() {
        let opts: MonitorAlertsListOptions = parse_options(raw(json!({
            "subscription": "prod",
            "severity": "Sev1",
            "state": "Acknowledged",
        })))
        .unwrap();
        assert_eq!(opts.severity, Some(AlertSeverity::Sev1));
        assert_eq!(opts.state.map(AlertState::as_str), Some("Acknowledged"));

        assert!(parse_options::<MonitorAlertsListOptions>(raw(json!({
            "subscription": "prod",
            "severity": "Critical",
        })))
        .is_err());
    }

    #[test]
    fn rule_get_needs_a_resource_group() {
        let err = parse_options::<MonitorAlertRuleGetOptions>(raw(json!({
            "subscription": "prod",
            "resource_group": "",
            "rule_name": "cpu",
        })))
        .unwrap_err();
        assert_eq!(err.to_dict()["field"], "resource_group");
    }

    #[tokio::test]
    async fn rule_names_cannot_carry_paths() {
        let ctx = AzureContext::for_tests();
        let err = MonitorAutoscaleSettingsGetTool
            .run(
                &ctx,
                raw(json!({
                    "subscription": "12345678-1234-1234-1234-123456789abc",
                    "resource_group": "rg",
                    "setting_name": "x/../../other",
                })),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_dict()["field"], "setting_name");
    }

    #[test]
    fn scoped_listings_share_defaults() {
        let opts: MonitorScopedListOptions =
            parse_options(raw(json!({ "subscription": "prod" }))).unwrap();
        assert_eq!(opts.top, 100);
        assert!(opts.resource_group.is_empty());
    }

    #[test]
    fn baselines_default_to_hourly_over_a_day() {
        let opts: MonitorMetricBaselinesGetOptions = parse_options(raw(json!({
            "resource_id": "/subscriptions/1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm",
            "metric_names": ["Percentage CPU"],
        })))
        .unwrap();
        assert_eq!(opts.interval, "PT1H");
        assert_eq!(opts.timespan_hours, 24);
    }
}
