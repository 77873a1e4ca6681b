//! Cost Management queries and forecasts, Consumption budgets, exports and
//! Advisor cost recommendations.

use async_trait::async_trait;
use reqwest::Method;
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use super::failure;
use crate::azure_error::AzureResult;
use crate::context::AzureContext;
use crate::error::{ToolError, ToolResult};
use crate::registry::ToolRegistry;
use crate::service::{require_path_segment, AzureService};
use crate::tool::{AzureTool, ToolMetadata};

const COST_QUERY_API_VERSION: &str = "2023-03-01";
const BUDGETS_API_VERSION: &str = "2023-05-01";
const EXPORTS_API_VERSION: &str = "2023-03-01";
const ADVISOR_API_VERSION: &str = "2023-01-01";

pub(crate) fn register(registry: &mut ToolRegistry) {
    registry.register::<CostQueryTool>("cost", Some("query"));
    registry.register::<CostUsageByResourceTool>("cost", Some("usage"));
    registry.register::<CostForecastTool>("cost", Some("forecast"));
    registry.register::<CostBudgetsListTool>("cost", Some("budget"));
    registry.register::<CostBudgetsGetTool>("cost", Some("budget"));
    registry.register::<CostExportsListTool>("cost", Some("export"));
    registry.register::<CostRecommendationsTool>("cost", Some("recommendation"));
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Timeframe {
    #[default]
    MonthToDate,
    BillingMonthToDate,
    TheLastMonth,
    TheLastBillingMonth,
    WeekToDate,
    /// Requires from_date and to_date.
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Granularity {
    #[default]
    None,
    Daily,
    Monthly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum MetricType {
    #[default]
    ActualCost,
    AmortizedCost,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CostQueryOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group to scope the query. Leave empty for the whole subscription.
    #[serde(default)]
    pub resource_group: String,
    /// Time period for cost data.
    #[serde(default)]
    pub timeframe: Timeframe,
    /// Start date (YYYY-MM-DD) for a Custom timeframe.
    #[serde(default)]
    pub from_date: Option<NaiveDate>,
    /// End date (YYYY-MM-DD) for a Custom timeframe.
    #[serde(default)]
    pub to_date: Option<NaiveDate>,
    /// 'Daily' or 'Monthly' for a time series; 'None' for totals.
    #[serde(default)]
    pub granularity: Granularity,
    /// Dimension to group by: ResourceGroup, ResourceType, ServiceName,
    /// ResourceLocation, MeterCategory, ResourceId, ... Leave empty for totals.
    #[serde(default)]
    pub group_by: String,
    /// AmortizedCost spreads reservation purchases over their term.
    #[serde(default)]
    pub metric_type: MetricType,
}

impl CostQueryOptions {
    /// Request body for the Cost Management query API.
    pub fn definition(&self) -> ToolResult<Value> {
        let mut dataset = json!({
            "aggregation": {
                "totalCost": { "name": "Cost", "function": "Sum" },
                "totalCostUSD": { "name": "CostUSD", "function": "Sum" },
            },
        });
        if self.granularity != Granularity::None {
            dataset["granularity"] = json!(self.granularity);
        }
        if !self.group_by.is_empty() {
            dataset["grouping"] = json!([{ "type": "Dimension", "name": self.group_by }]);
        }

        let mut body = json!({
            "type": self.metric_type,
            "timeframe": self.timeframe,
            "dataset": dataset,
        });

        if self.timeframe == Timeframe::Custom {
            let (Some(from), Some(to)) = (self.from_date, self.to_date) else {
                return Err(ToolError::validation_field(
                    "from_date and to_date are required for a Custom timeframe",
                    "from_date",
                ));
            };
            if from > to {
                return Err(ToolError::validation_field(
                    "from_date must not be after to_date",
                    "from_date",
                ));
            }
            body["timePeriod"] = json!({
                "from": format!("{from}T00:00:00Z"),
                "to": format!("{to}T23:59:59Z"),
            });
        }
        Ok(body)
    }
}

/// Column index by name in a Cost Management result.
fn column(columns: &[Value], name: &str) -> Option<usize> {
    columns.iter().position(|c| c["name"] == name)
}

/// Rows of a `ResourceId` grouped query, most expensive first.
pub fn rank_resources(props: &Value, top: usize) -> Vec<Value> {
    let columns = props["columns"].as_array().map(Vec::as_slice).unwrap_or_default();
    let cost_idx = column(columns, "Cost").unwrap_or(0);
    let usd_idx = column(columns, "CostUSD").unwrap_or(1);
    let id_idx = column(columns, "ResourceId").unwrap_or(2);
    let currency_idx = column(columns, "Currency");

    let mut resources: Vec<Value> = props["rows"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|row| {
            let row = row.as_array()?;
            let resource_id = row.get(id_idx)?.as_str().unwrap_or_default();
            Some(json!({
                "resource_id": resource_id,
                "resource_name": resource_id.rsplit('/').next().unwrap_or_default(),
                "cost": row.get(cost_idx).cloned().unwrap_or(json!(0)),
                "cost_usd": row.get(usd_idx).cloned().unwrap_or(json!(0)),
                "currency": currency_idx
                    .and_then(|i| row.get(i))
                    .cloned()
                    .unwrap_or(json!("USD")),
            }))
        })
        .collect();
    resources.sort_by(|a, b| {
        let cost = |v: &Value| v["cost"].as_f64().unwrap_or(0.0);
        cost(b).total_cmp(&cost(a))
    });
    resources.truncate(top);
    resources
}

/// Forecast request for the `days` following `now`.
pub fn forecast_definition(
    now: DateTime<Utc>,
    days: u32,
    granularity: ForecastGranularity,
    include_actual_cost: bool,
    include_fresh_partial_cost: bool,
) -> Value {
    let end = now + Duration::days(i64::from(days));
    json!({
        "type": "ActualCost",
        "timeframe": "Custom",
        "timePeriod": {
            "from": now.to_rfc3339_opts(SecondsFormat::Secs, true),
            "to": end.to_rfc3339_opts(SecondsFormat::Secs, true),
        },
        "dataset": {
            "granularity": granularity,
            "aggregation": { "totalCost": { "name": "Cost", "function": "Sum" } },
        },
        "includeActualCost": include_actual_cost,
        "includeFreshPartialCost": include_fresh_partial_cost,
    })
}

fn shape_budget(budget: &Value) -> Value {
    let props = &budget["properties"];
    json!({
        "name": budget["name"],
        "id": budget["id"],
        "amount": props["amount"],
        "time_grain": props["timeGrain"],
        "category": props["category"],
        "current_spend": props["currentSpend"]["amount"],
        "current_spend_unit": props["currentSpend"]["unit"],
        "time_period_start": props["timePeriod"]["startDate"],
        "time_period_end": props["timePeriod"]["endDate"],
    })
}

/// A budget with its notifications and how much of it is spent.
fn shape_budget_detail(budget: &Value) -> Value {
    let props = &budget["properties"];
    let mut shaped = shape_budget(budget);
    let current = props["currentSpend"]["amount"].as_f64().unwrap_or(0.0);
    let amount = props["amount"].as_f64().filter(|a| *a > 0.0).unwrap_or(1.0);
    shaped["current_spend"] = json!(current);
    shaped["usage_percent"] = json!((current / amount * 10000.0).round() / 100.0);
    shaped["notifications"] = props["notifications"]
        .as_object()
        .map(|notifications| {
            notifications
                .iter()
                .map(|(name, n)| {
                    json!({
                        "name": name,
                        "enabled": n["enabled"],
                        "operator": n["operator"],
                        "threshold": n["threshold"],
                        "contact_emails": n["contactEmails"].as_array().cloned().unwrap_or_default(),
                        "threshold_type": n["thresholdType"],
                    })
                })
                .collect()
        })
        .unwrap_or_else(|| json!([]));
    shaped["filter"] = props["filter"].clone();
    shaped
}

fn shape_export(export: &Value) -> Value {
    let props = &export["properties"];
    let destination = &props["deliveryInfo"]["destination"];
    json!({
        "name": export["name"],
        "id": export["id"],
        "format": props["format"],
        "definition_type": props["definition"]["type"],
        "definition_timeframe": props["definition"]["timeframe"],
        "schedule_status": props["schedule"]["status"],
        "schedule_recurrence": props["schedule"]["recurrence"],
        "next_run_time": props["nextRunTimeEstimate"],
        "destination_container": destination["container"],
        "destination_root_folder": destination["rootFolderPath"],
        "destination_resource_id": destination["resourceId"],
    })
}

fn shape_recommendation(rec: &Value) -> Value {
    let props = &rec["properties"];
    let extended = &props["extendedProperties"];
    let annual_savings = match &extended["annualSavingsAmount"] {
        Value::String(s) => s.parse::<f64>().ok(),
        other => other.as_f64(),
    };
    let metadata = &props["resourceMetadata"];
    json!({
        "id": rec["id"],
        "name": rec["name"],
        "category": props["category"],
        "impact": props["impact"],
        "impacted_field": props["impactedField"],
        "impacted_value": props["impactedValue"],
        "short_description": props["shortDescription"]["problem"],
        "solution": props["shortDescription"]["solution"],
        "potential_benefits": props["potentialBenefits"],
        "annual_savings": annual_savings,
        "savings_currency": extended["savingsCurrency"].as_str().unwrap_or("USD"),
        "resource_metadata": if metadata.is_object() {
            json!({ "resource_id": metadata["resourceId"], "source": metadata["source"] })
        } else {
            Value::Null
        },
        "last_updated": props["lastUpdated"],
    })
}

pub struct CostService {
    base: AzureService,
}

impl CostService {
    pub fn new(base: AzureService) -> Self {
        Self { base }
    }

    async fn post_cost(&self, scope: &str, operation: &str, body: &Value) -> AzureResult<Value> {
        let mut result = self
            .base
            .arm_post(
                &format!("{scope}/providers/Microsoft.CostManagement/{operation}"),
                COST_QUERY_API_VERSION,
                body,
            )
            .await?;
        Ok(result["properties"].take())
    }

    pub async fn query(&self, options: &CostQueryOptions, body: &Value) -> AzureResult<Value> {
        let scope = self
            .base
            .scope_path(&options.subscription, &options.resource_group)
            .await?;
        let props = &self.post_cost(&scope, "query", body).await?;
        Ok(json!({
            "columns": props["columns"],
            "rows": props["rows"].as_array().cloned().unwrap_or_default(),
            "next_link": props["nextLink"],
            "scope": scope,
            "timeframe": options.timeframe,
            "granularity": options.granularity,
        }))
    }

    pub async fn list_budgets(
        &self,
        subscription: &str,
        resource_group: &str,
    ) -> AzureResult<Vec<Value>> {
        let scope = self.base.scope_path(subscription, resource_group).await?;
        let path = format!("{scope}/providers/Microsoft.Consumption/budgets");
        let budgets = self.base.arm_list(&path, BUDGETS_API_VERSION, None).await?;
        Ok(budgets.iter().map(shape_budget).collect())
    }

    pub async fn get_budget(
        &self,
        subscription: &str,
        resource_group: &str,
        budget_name: &str,
    ) -> AzureResult<Value> {
        require_path_segment(budget_name, "budget_name")?;
        let scope = self.base.scope_path(subscription, resource_group).await?;
        let url = self.base.arm_url(
            &format!("{scope}/providers/Microsoft.Consumption/budgets/{budget_name}"),
            BUDGETS_API_VERSION,
        );
        let budget = self
            .base
            .request_json(Method::GET, &url, &self.base.arm_scope(), None)
            .await?;
        Ok(shape_budget_detail(&budget))
    }

    pub async fn usage_by_resource(
        &self,
        options: &CostUsageByResourceOptions,
    ) -> AzureResult<Vec<Value>> {
        let scope = self
            .base
            .scope_path(&options.subscription, &options.resource_group)
            .await?;
        let body = json!({
            "type": options.metric_type,
            "timeframe": options.timeframe,
            "dataset": {
                "aggregation": {
                    "totalCost": { "name": "Cost", "function": "Sum" },
                    "totalCostUSD": { "name": "CostUSD", "function": "Sum" },
                },
                "grouping": [{ "type": "Dimension", "name": "ResourceId" }],
            },
        });
        let props = self.post_cost(&scope, "query", &body).await?;
        Ok(rank_resources(&props, options.top as usize))
    }

    pub async fn forecast(&self, options: &CostForecastOptions) -> AzureResult<Value> {
        let scope = self
            .base
            .scope_path(&options.subscription, &options.resource_group)
            .await?;
        let now = Utc::now();
        let body = forecast_definition(
            now,
            options.forecast_days,
            options.granularity,
            options.include_actual_cost,
            options.include_fresh_partial_cost,
        );
        let props = self.post_cost(&scope, "forecast", &body).await?;
        Ok(json!({
            "columns": props["columns"],
            "rows": props["rows"].as_array().cloned().unwrap_or_default(),
            "scope": scope,
            "forecast_days": options.forecast_days,
            "granularity": options.granularity,
            "start_date": body["timePeriod"]["from"],
            "end_date": body["timePeriod"]["to"],
        }))
    }

    pub async fn list_exports(
        &self,
        subscription: &str,
        resource_group: &str,
    ) -> AzureResult<Vec<Value>> {
        let scope = self.base.scope_path(subscription, resource_group).await?;
        let path = format!("{scope}/providers/Microsoft.CostManagement/exports");
        let exports = self.base.arm_list(&path, EXPORTS_API_VERSION, None).await?;
        Ok(exports.iter().map(shape_export).collect())
    }

    pub async fn recommendations(
        &self,
        subscription: &str,
        category: Option<AdvisorCategory>,
    ) -> AzureResult<Vec<Value>> {
        let scope = self.base.scope_path(subscription, "").await?;
        let mut path = format!("{scope}/providers/Microsoft.Advisor/recommendations");
        if let Some(category) = category {
            let filter = format!("Category eq '{}'", category.as_str());
            let encoded: String =
                url::form_urlencoded::byte_serialize(filter.as_bytes()).collect();
            path.push_str(&format!("?$filter={encoded}"));
        }
        let recommendations = self.base.arm_list(&path, ADVISOR_API_VERSION, None).await?;
        Ok(recommendations.iter().map(shape_recommendation).collect())
    }
}

fn cost(ctx: &AzureContext) -> CostService {
    CostService::new(AzureService::new(ctx))
}

// ---------------------------------------------------------------------------
// Queries and forecasts
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct CostQueryTool;

#[async_trait]
impl AzureTool for CostQueryTool {
    type Options = CostQueryOptions;

    fn name(&self) -> &'static str {
        "cost_query"
    }

    fn description(&self) -> &'static str {
        "Query Azure spend for a subscription or resource group. Group by a \
         dimension such as ServiceName or ResourceGroup, or use Daily/Monthly \
         granularity for a time series."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let body = options.definition()?;
        cost(ctx)
            .query(&options, &body)
            .await
            .map_err(failure("Cost Management Query"))
    }
}

fn default_usage_top() -> u32 {
    20
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CostUsageByResourceOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group to scope the query. Leave empty for all resources.
    #[serde(default)]
    pub resource_group: String,
    /// Time period for cost data. Custom is not supported here.
    #[serde(default)]
    #[validate(custom(function = "preset_timeframe"))]
    pub timeframe: Timeframe,
    /// Number of most expensive resources to return (1-100).
    #[serde(default = "default_usage_top")]
    #[validate(range(min = 1, max = 100))]
    pub top: u32,
    #[serde(default)]
    pub metric_type: MetricType,
}

fn preset_timeframe(timeframe: &Timeframe) -> Result<(), validator::ValidationError> {
    if *timeframe == Timeframe::Custom {
        let mut err = validator::ValidationError::new("timeframe");
        err.message = Some("use cost_query for a Custom timeframe".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct CostUsageByResourceTool;

#[async_trait]
impl AzureTool for CostUsageByResourceTool {
    type Options = CostUsageByResourceOptions;

    fn name(&self) -> &'static str {
        "cost_usage_by_resource"
    }

    fn description(&self) -> &'static str {
        "Rank individual resources by cost for a period. Use it to find what \
         drives spend in a subscription or resource group."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        cost(ctx)
            .usage_by_resource(&options)
            .await
            .map(Value::Array)
            .map_err(failure("Cost Management Query"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ForecastGranularity {
    #[default]
    Daily,
    Monthly,
}

fn default_forecast_days() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CostForecastOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group to scope the forecast. Leave empty for the subscription.
    #[serde(default)]
    pub resource_group: String,
    #[serde(default)]
    pub granularity: ForecastGranularity,
    /// Days to forecast from now (1-365).
    #[serde(default = "default_forecast_days")]
    #[validate(range(min = 1, max = 365))]
    pub forecast_days: u32,
    /// Include actual costs to date alongside the forecast.
    #[serde(default = "default_true")]
    pub include_actual_cost: bool,
    /// Include partial costs for the current period.
    #[serde(default = "default_true")]
    pub include_fresh_partial_cost: bool,
}

#[derive(Debug, Default)]
pub struct CostForecastTool;

#[async_trait]
impl AzureTool for CostForecastTool {
    type Options = CostForecastOptions;

    fn name(&self) -> &'static str {
        "cost_forecast"
    }

    fn description(&self) -> &'static str {
        "Forecast spend for the coming days from historical usage, daily or \
         monthly."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        cost(ctx)
            .forecast(&options)
            .await
            .map_err(failure("Cost Forecast"))
    }
}

// ---------------------------------------------------------------------------
// Budgets and exports
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CostBudgetsListOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group scope. Leave empty for subscription budgets.
    #[serde(default)]
    pub resource_group: String,
}

#[derive(Debug, Default)]
pub struct CostBudgetsListTool;

#[async_trait]
impl AzureTool for CostBudgetsListTool {
    type Options = CostBudgetsListOptions;

    fn name(&self) -> &'static str {
        "cost_budgets_list"
    }

    fn description(&self) -> &'static str {
        "List cost budgets with their amount, time grain and current spend."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        cost(ctx)
            .list_budgets(&options.subscription, &options.resource_group)
            .await
            .map(Value::Array)
            .map_err(failure("Budgets"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CostBudgetsGetOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Name of the budget.
    #[validate(length(min = 1))]
    pub budget_name: String,
    /// Resource group scope. Leave empty for a subscription budget.
    #[serde(default)]
    pub resource_group: String,
}

#[derive(Debug, Default)]
pub struct CostBudgetsGetTool;

#[async_trait]
impl AzureTool for CostBudgetsGetTool {
    type Options = CostBudgetsGetOptions;

    fn name(&self) -> &'static str {
        "cost_budgets_get"
    }

    fn description(&self) -> &'static str {
        "Get one budget with its notification thresholds, contacts and the \
         percentage already spent."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        cost(ctx)
            .get_budget(
                &options.subscription,
                &options.resource_group,
                &options.budget_name,
            )
            .await
            .map_err(failure("Budget"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CostExportsListOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group scope. Leave empty for subscription exports.
    #[serde(default)]
    pub resource_group: String,
}

#[derive(Debug, Default)]
pub struct CostExportsListTool;

#[async_trait]
impl AzureTool for CostExportsListTool {
    type Options = CostExportsListOptions;

    fn name(&self) -> &'static str {
        "cost_exports_list"
    }

    fn description(&self) -> &'static str {
        "List scheduled cost exports with their schedule, format and storage \
         destination."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        cost(ctx)
            .list_exports(&options.subscription, &options.resource_group)
            .await
            .map(Value::Array)
            .map_err(failure("Cost Exports"))
    }
}

// ---------------------------------------------------------------------------
// Advisor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum AdvisorCategory {
    Cost,
    Security,
    Performance,
    HighAvailability,
    OperationalExcellence,
}

impl AdvisorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            AdvisorCategory::Cost => "Cost",
            AdvisorCategory::Security => "Security",
            AdvisorCategory::Performance => "Performance",
            AdvisorCategory::HighAvailability => "HighAvailability",
            AdvisorCategory::OperationalExcellence => "OperationalExcellence",
        }
    }
}

fn default_category() -> Option<AdvisorCategory> {
    Some(AdvisorCategory::Cost)
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CostRecommendationsOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Advisor category. Defaults to Cost; pass null for every category.
    #[serde(default = "default_category")]
    pub category: Option<AdvisorCategory>,
}

#[derive(Debug, Default)]
pub struct CostRecommendationsTool;

#[async_trait]
impl AzureTool for CostRecommendationsTool {
    type Options = CostRecommendationsOptions;

    fn name(&self) -> &'static str {
        "cost_recommendations"
    }

    fn description(&self) -> &'static str {
        "List Azure Advisor recommendations, by default the cost ones, with \
         estimated annual savings and the affected resource."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        cost(ctx)
            .recommendations(&options.subscription, options.category)
            .await
            .map(Value::Array)
            .map_err(failure("Advisor Recommendations"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::parse_options;
    use crate::tools::raw;

    fn query(extra: Value) -> CostQueryOptions {
        let mut base = json!({ "subscription": "prod" });
        if let (Some(obj), Value::Object(more)) = (base.as_object_mut(), extra) {
            obj.extend(more);
        }
        parse_options(raw(base)).unwrap()
    }

    #[test]
    fn resources_are_ranked_by_cost() {
        let props = json!({
            "columns": [
                { "name": "Cost", "type": "Number" },
                { "name": "CostUSD", "type": "Number" },
                { "name": "ResourceId", "type": "String" },
                { "name": "Currency", "type": "String" },
            ],
            "rows": [
                [1.5, 1.5, "/subscriptions/s1/resourceGroups/rg/providers/Microsoft.Web/sites/cheap", "EUR"],
                [90.0, 97.2, "/subscriptions/s1/resourceGroups/rg/providers/Microsoft.Sql/servers/db", "EUR"],
                [12.0, 13.0, "/subscriptions/s1/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/st", "EUR"],
            ],
        });
        let ranked = rank_resources(&props, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0]["resource_name"], "db");
        assert_eq!(ranked[0]["currency"], "EUR");
        assert_eq!(ranked[1]["resource_name"], "st");
    }

    #[test]
    fn usage_rejects_custom_timeframe() {
        let err = parse_options::<CostUsageByResourceOptions>(raw(json!({
            "subscription": "prod",
            "timeframe": "Custom",
        })))
        .unwrap_err();
        assert_eq!(err.to_dict()["field"], "timeframe");
    }

    #[test]
    fn forecast_window_starts_now() {
        use chrono::TimeZone;
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let body = forecast_definition(now, 30, ForecastGranularity::Monthly, true, false);
        assert_eq!(body["timePeriod"]["from"], "2024-03-01T12:00:00Z");
        assert_eq!(body["timePeriod"]["to"], "2024-03-31T12:00:00Z");
        assert_eq!(body["dataset"]["granularity"], "Monthly");
        assert_eq!(body["includeFreshPartialCost"], false);
    }

    #[test]
    fn forecast_days_are_bounded() {
        let err = parse_options::<CostForecastOptions>(raw(json!({
            "subscription": "prod",
            "forecast_days": 400,
        })))
        .unwrap_err();
        assert_eq!(err.to_dict()["field"], "forecast_days");
    }

    #[test]
    fn budget_detail_reports_usage_and_notifications() {
        let budget = shape_budget_detail(&json!({
            "name": "monthly",
            "properties": {
                "amount": 800,
                "currentSpend": { "amount": 200, "unit": "USD" },
                "notifications": {
                    "Actual_GreaterThan_80_Percent": {
                        "enabled": true,
                        "operator": "GreaterThan",
                        "threshold": 80,
                        "contactEmails": ["ops@contoso.com"],
                        "thresholdType": "Actual",
                    },
                },
            },
        }));
        assert_eq!(budget["usage_percent"], 25.0);
        assert_eq!(budget["notifications"][0]["name"], "Actual_GreaterThan_80_Percent");
        assert_eq!(budget["notifications"][0]["contact_emails"][0], "ops@contoso.com");
    }

    #[tokio::test]
    async fn budget_names_cannot_carry_paths() {
        let ctx = AzureContext::for_tests();
        let err = CostBudgetsGetTool
            .execute(
                &ctx,
                parse_options(raw(json!({
                    "subscription": "12345678-1234-1234-1234-123456789abc",
                    "budget_name": "monthly/../../x",
                })))
                .unwrap(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_dict()["field"], "budget_name");
    }

    #[test]
    fn recommendation_savings_are_numeric() {
        let rec = shape_recommendation(&json!({
            "id": "r1",
            "name": "r1",
            "properties": {
                "category": "Cost",
                "impact": "High",
                "shortDescription": { "problem": "Right-size VM", "solution": "Resize" },
                "extendedProperties": { "annualSavingsAmount": "1234.5" },
                "resourceMetadata": { "resourceId": "/subscriptions/s1/x", "source": "vm" },
            },
        }));
        assert_eq!(rec["annual_savings"], 1234.5);
        assert_eq!(rec["savings_currency"], "USD");
        assert_eq!(rec["resource_metadata"]["source"], "vm");
    }

    #[test]
    fn recommendations_default_to_cost() {
        let opts: CostRecommendationsOptions =
            parse_options(raw(json!({ "subscription": "prod" }))).unwrap();
        assert_eq!(opts.category, Some(AdvisorCategory::Cost));
        let opts: CostRecommendationsOptions =
            parse_options(raw(json!({ "subscription": "prod", "category": null }))).unwrap();
        assert_eq!(opts.category, None);
    }

    #[test]
    fn exports_flatten_destination() {
        let export = shape_export(&json!({
            "name": "daily",
            "properties": {
                "format": "Csv",
                "definition": { "type": "ActualCost", "timeframe": "MonthToDate" },
                "schedule": { "status": "Active", "recurrence": "Daily" },
                "deliveryInfo": { "destination": { "container": "exports", "rootFolderPath": "cost" } },
            },
        }));
        assert_eq!(export["destination_container"], "exports");
        assert_eq!(export["schedule_recurrence"], "Daily");
    }

    #[test]
    fn default_definition_is_month_to_date_totals() {
        let body = query(json!({})).definition().unwrap();
        assert_eq!(body["type"], "ActualCost");
        assert_eq!(body["timeframe"], "MonthToDate");
        assert!(body["dataset"].get("granularity").is_none());
        assert!(body["dataset"].get("grouping").is_none());
        assert_eq!(body["dataset"]["aggregation"]["totalCost"]["name"], "Cost");
    }

    #[test]
    fn grouping_and_granularity_are_included() {
        let body = query(json!({
            "granularity": "Daily",
            "group_by": "ServiceName",
            "metric_type": "AmortizedCost",
        }))
        .definition()
        .unwrap();
        assert_eq!(body["dataset"]["granularity"], "Daily");
        assert_eq!(body["dataset"]["grouping"][0]["name"], "ServiceName");
        assert_eq!(body["type"], "AmortizedCost");
    }

    #[test]
    fn custom_timeframe_needs_dates() {
        let err = query(json!({ "timeframe": "Custom" })).definition().unwrap_err();
        assert_eq!(err.to_dict()["field"], "from_date");

        let body = query(json!({
            "timeframe": "Custom",
            "from_date": "2024-01-01",
            "to_date": "2024-01-31",
        }))
        .definition()
        .unwrap();
        assert_eq!(body["timePeriod"]["from"], "2024-01-01T00:00:00Z");
        assert_eq!(body["timePeriod"]["to"], "2024-01-31T23:59:59Z");
    }

    #[test]
    fn reversed_dates_are_rejected() {
        let err = query(json!({
            "timeframe": "Custom",
            "from_date": "2024-02-01",
            "to_date": "2024-01-01",
        }))
        .definition()
        .unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
    }

    #[test]
    fn budgets_are_flattened() {
        let budget = shape_budget(&json!({
            "name": "monthly",
            "id": "/subscriptions/s1/providers/Microsoft.Consumption/budgets/monthly",
            "properties": {
                "amount": 1000,
                "timeGrain": "Monthly",
                "category": "Cost",
                "currentSpend": { "amount": 420.5, "unit": "USD" },
                "timePeriod": { "startDate": "2024-01-01T00:00:00Z" },
            },
        }));
        assert_eq!(budget["current_spend"], 420.5);
        assert_eq!(budget["current_spend_unit"], "USD");
        assert!(budget["time_period_end"].is_null());
    }
}
