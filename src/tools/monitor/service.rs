use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::header::HeaderMap;
use reqwest::Method;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;
use validator::Validate;

use crate::azure_error::AzureResult;
use crate::error::ToolError;
use crate::service::{
    escape_kql, require_path_segment, require_resource_id, AzureService,
};

const METRICS_API_VERSION: &str = "2018-01-01";
const BASELINES_API_VERSION: &str = "2019-03-01";
const ACTIVITY_LOG_API_VERSION: &str = "2015-04-01";
const METRIC_ALERTS_API_VERSION: &str = "2018-03-01";
const AUTOSCALE_API_VERSION: &str = "2022-10-01";
const ACTION_GROUPS_API_VERSION: &str = "2023-01-01";
const DIAGNOSTIC_SETTINGS_API_VERSION: &str = "2021-05-01-preview";
const SCHEDULED_QUERY_RULES_API_VERSION: &str = "2023-03-15-preview";
const UPN_CLAIM: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/upn";

/// `start/end` in ISO 8601 covering the last `hours` hours.
pub fn timespan_ending(end: DateTime<Utc>, hours: u32) -> String {
    let start = end - Duration::hours(i64::from(hours));
    format!(
        "{}/{}",
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        end.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Query string for the metrics API. Kept out of async code: the
/// serializer is not `Send`.
pub fn metrics_query_string(
    metric_names: &[String],
    timespan: &str,
    interval: &str,
    aggregations: &[String],
) -> String {
    let mut params = url::form_urlencoded::Serializer::new(String::new());
    params
        .append_pair("metricnames", &metric_names.join(","))
        .append_pair("timespan", timespan)
        .append_pair("interval", interval);
    if !aggregations.is_empty() {
        params.append_pair("aggregation", &aggregations.join(","));
    }
    params.finish()
}

/// Turn a Log Analytics table (`columns` + positional `rows`) into
/// `{name, columns, rows: [{column: value}], row_count}`.
pub fn shape_table(table: &Value) -> Value {
    let columns: Vec<&str> = table["columns"]
        .as_array()
        .map(|cols| cols.iter().filter_map(|c| c["name"].as_str()).collect())
        .unwrap_or_default();

    let rows: Vec<Value> = table["rows"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    let cells = row.as_array().map(Vec::as_slice).unwrap_or_default();
                    let obj: Map<String, Value> = columns
                        .iter()
                        .zip(cells)
                        .map(|(col, cell)| (col.to_string(), cell.clone()))
                        .collect();
                    Value::Object(obj)
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "name": table["name"],
        "columns": columns,
        "row_count": rows.len(),
        "rows": rows,
    })
}

/// Shape a Log Analytics query reply. A reply carrying an `error` next to
/// its tables is a partial result.
pub fn shape_query_response(raw: &Value, include_statistics: bool) -> Value {
    let tables: Vec<Value> = items(&raw["tables"]).iter().map(shape_table).collect();
    let total_rows: u64 = tables
        .iter()
        .filter_map(|t| t["row_count"].as_u64())
        .sum();

    let mut result = json!({ "status": "success", "tables": tables, "total_rows": total_rows });
    if let Some(err) = raw.get("error").filter(|e| !e.is_null()) {
        result["status"] = json!("partial");
        result["error"] = err["message"].clone();
    }
    if include_statistics {
        if let Some(stats) = raw.get("statistics") {
            result["statistics"] = stats.clone();
        }
    }
    result
}

/// One entry of a batch log query.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
pub struct BatchQuery {
    /// Identifier echoed back with this query's result.
    #[validate(length(min = 1))]
    pub id: String,
    /// KQL query.
    #[validate(length(min = 1))]
    pub query: String,
}

/// Body for the Log Analytics `$batch` endpoint.
pub fn batch_request(workspace_id: &str, queries: &[BatchQuery], hours: u32) -> Value {
    let requests: Vec<Value> = queries
        .iter()
        .map(|q| {
            json!({
                "id": q.id,
                "headers": { "Content-Type": "application/json" },
                "body": { "query": q.query, "timespan": format!("PT{hours}H") },
                "method": "POST",
                "path": "/query",
                "workspace": workspace_id,
            })
        })
        .collect();
    json!({ "requests": requests })
}

/// Per-query results in request order. The service may answer out of order.
pub fn shape_batch_response(raw: &Value, queries: &[BatchQuery]) -> Vec<Value> {
    let responses = items(&raw["responses"]);
    queries
        .iter()
        .map(|q| {
            let Some(response) = responses.iter().find(|r| r["id"].as_str() == Some(&q.id))
            else {
                return json!({ "id": q.id, "status": "failed", "error": "No response for query" });
            };
            let status = response["status"].as_u64().unwrap_or_default();
            let body = &response["body"];
            if (200..300).contains(&status) {
                let mut shaped = shape_query_response(body, false);
                shaped["id"] = json!(q.id);
                shaped
            } else {
                json!({
                    "id": q.id,
                    "status": "failed",
                    "error": body["error"]["message"],
                    "code": body["error"]["code"],
                })
            }
        })
        .collect()
}

fn items(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or_default()
}

fn shape_baseline(baseline: &Value) -> Value {
    let name = baseline["name"]
        .as_str()
        .or_else(|| baseline["name"]["value"].as_str())
        .unwrap_or("unknown");
    let props = &baseline["properties"];
    let series: Vec<Value> = items(&props["baselines"])
        .iter()
        .map(|b| {
            let data: Vec<Value> = items(&b["data"])
                .iter()
                .map(|d| {
                    json!({
                        "sensitivity": d["sensitivity"],
                        "lowThresholds": d["lowThresholds"].as_array().cloned().unwrap_or_default(),
                        "highThresholds": d["highThresholds"].as_array().cloned().unwrap_or_default(),
                    })
                })
                .collect();
            json!({
                "dimensions": b["dimensions"].as_array().cloned().unwrap_or_default(),
                "timestamps": b["timestamps"].as_array().cloned().unwrap_or_default(),
                "data": data,
            })
        })
        .collect();
    json!({
        "name": name,
        "namespace": props["namespace"],
        "timespan": props["timespan"],
        "interval": props["interval"],
        "baselines": series,
    })
}

fn shape_alert_rule(rule: &Value) -> Value {
    let props = &rule["properties"];
    let criteria = &props["criteria"];
    let conditions: Vec<Value> = items(&criteria["allOf"])
        .iter()
        .map(|c| {
            json!({
                "name": c["name"],
                "metricName": c["metricName"],
                "metricNamespace": c["metricNamespace"],
                "operator": c["operator"],
                "threshold": c["threshold"],
                "timeAggregation": c["timeAggregation"],
            })
        })
        .collect();
    json!({
        "id": rule["id"],
        "name": rule["name"],
        "description": props["description"],
        "severity": props["severity"],
        "enabled": props["enabled"],
        "scopes": props["scopes"].as_array().cloned().unwrap_or_default(),
        "evaluationFrequency": props["evaluationFrequency"],
        "windowSize": props["windowSize"],
        "targetResourceType": props["targetResourceType"],
        "targetResourceRegion": props["targetResourceRegion"],
        "criteria": { "odataType": criteria["odata.type"], "conditions": conditions },
        "autoMitigate": props["autoMitigate"],
    })
}

fn shape_autoscale(setting: &Value) -> Value {
    let props = &setting["properties"];
    let profiles: Vec<Value> = items(&props["profiles"])
        .iter()
        .map(|p| {
            let rules: Vec<Value> = items(&p["rules"])
                .iter()
                .map(|r| {
                    json!({
                        "metricName": r["metricTrigger"]["metricName"],
                        "operator": r["metricTrigger"]["operator"],
                        "threshold": r["metricTrigger"]["threshold"],
                        "direction": r["scaleAction"]["direction"],
                        "changeCount": r["scaleAction"]["value"],
                        "cooldown": r["scaleAction"]["cooldown"],
                    })
                })
                .collect();
            json!({
                "name": p["name"],
                "capacity": p["capacity"],
                "rules": rules,
            })
        })
        .collect();
    json!({
        "id": setting["id"],
        "name": setting["name"],
        "location": setting["location"],
        "targetResourceUri": props["targetResourceUri"],
        "enabled": props["enabled"],
        "profiles": profiles,
    })
}

fn shape_action_group(group: &Value) -> Value {
    let props = &group["properties"];
    let receivers = |key: &str, fields: &[(&str, &str)]| -> Value {
        items(&props[key])
            .iter()
            .map(|r| {
                let obj: Map<String, Value> = fields
                    .iter()
                    .map(|(out, src)| (out.to_string(), r[*src].clone()))
                    .collect();
                Value::Object(obj)
            })
            .collect()
    };
    json!({
        "id": group["id"],
        "name": group["name"],
        "location": group["location"],
        "enabled": props["enabled"],
        "shortName": props["groupShortName"],
        "emailReceivers": receivers("emailReceivers", &[("name", "name"), ("email", "emailAddress"), ("status", "status")]),
        "smsReceivers": receivers("smsReceivers", &[("name", "name"), ("countryCode", "countryCode"), ("phoneNumber", "phoneNumber"), ("status", "status")]),
        "webhookReceivers": receivers("webhookReceivers", &[("name", "name"), ("serviceUri", "serviceUri")]),
        "azureAppPushReceivers": receivers("azureAppPushReceivers", &[("name", "name"), ("email", "emailAddress")]),
    })
}

fn shape_diagnostic_setting(setting: &Value) -> Value {
    let props = &setting["properties"];
    let logs: Vec<Value> = items(&props["logs"])
        .iter()
        .map(|l| json!({ "category": l["category"], "categoryGroup": l["categoryGroup"], "enabled": l["enabled"] }))
        .collect();
    let metrics: Vec<Value> = items(&props["metrics"])
        .iter()
        .map(|m| json!({ "category": m["category"], "enabled": m["enabled"], "timeGrain": m["timeGrain"] }))
        .collect();
    json!({
        "id": setting["id"],
        "name": setting["name"],
        "storageAccountId": props["storageAccountId"],
        "workspaceId": props["workspaceId"],
        "eventHubAuthorizationRuleId": props["eventHubAuthorizationRuleId"],
        "eventHubName": props["eventHubName"],
        "logs": logs,
        "metrics": metrics,
    })
}

fn shape_scheduled_query_rule(rule: &Value) -> Value {
    let props = &rule["properties"];
    let conditions: Vec<Value> = items(&props["criteria"]["allOf"])
        .iter()
        .map(|c| {
            json!({
                "query": c["query"],
                "operator": c["operator"],
                "threshold": c["threshold"],
                "timeAggregation": c["timeAggregation"],
            })
        })
        .collect();
    json!({
        "id": rule["id"],
        "name": rule["name"],
        "location": rule["location"],
        "description": props["description"],
        "severity": props["severity"],
        "enabled": props["enabled"],
        "scopes": props["scopes"].as_array().cloned().unwrap_or_default(),
        "evaluationFrequency": props["evaluationFrequency"],
        "windowSize": props["windowSize"],
        "criteria": { "allOf": conditions },
    })
}

/// Filters for [`MonitorService::list_alerts`].
#[derive(Debug, Default)]
pub struct AlertFilter<'a> {
    pub resource_group: &'a str,
    pub severity: &'a str,
    pub state: &'a str,
}

impl AlertFilter<'_> {
    pub fn to_kql(&self, top: u32) -> String {
        let mut query = String::from(
            "alertsmanagementresources \
             | where type =~ 'microsoft.alertsmanagement/alerts' \
             | extend severity = tostring(properties.essentials.severity), \
             alertState = tostring(properties.essentials.alertState), \
             targetResource = properties.essentials.targetResource, \
             startDateTime = todatetime(properties.essentials.startDateTime), \
             monitorCondition = properties.essentials.monitorCondition, \
             alertRule = properties.essentials.alertRule",
        );
        if !self.resource_group.is_empty() {
            query.push_str(&format!(
                " | where resourceGroup =~ '{}'",
                escape_kql(self.resource_group)
            ));
        }
        if !self.severity.is_empty() {
            query.push_str(&format!(" | where severity =~ '{}'", escape_kql(self.severity)));
        }
        if !self.state.is_empty() {
            query.push_str(&format!(" | where alertState =~ '{}'", escape_kql(self.state)));
        }
        query.push_str(&format!(
            " | project id, name, severity, state = alertState, targetResource, \
             startDateTime, monitorCondition, alertRule, resourceGroup \
             | order by startDateTime desc | take {top}"
        ));
        query
    }
}

fn shape_metric(metric: &Value) -> Value {
    let timeseries: Vec<Value> = metric["timeseries"]
        .as_array()
        .map(|series| {
            series
                .iter()
                .map(|ts| {
                    let metadata: Map<String, Value> = ts["metadatavalues"]
                        .as_array()
                        .map(|values| {
                            values
                                .iter()
                                .filter_map(|m| {
                                    let key = m["name"]["value"].as_str()?;
                                    Some((key.to_string(), m["value"].clone()))
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    let data: Vec<Value> = ts["data"]
                        .as_array()
                        .map(|points| points.iter().map(shape_data_point).collect())
                        .unwrap_or_default();
                    json!({ "metadata": metadata, "data": data })
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "name": metric["name"]["value"].as_str().unwrap_or("unknown"),
        "unit": metric["unit"],
        "timeseries": timeseries,
    })
}

fn shape_data_point(point: &Value) -> Value {
    let mut out = Map::new();
    out.insert("timestamp".into(), point["timeStamp"].clone());
    for key in ["average", "total", "maximum", "minimum", "count"] {
        if let Some(v) = point.get(key).filter(|v| !v.is_null()) {
            out.insert(key.into(), v.clone());
        }
    }
    Value::Object(out)
}

fn shape_event(event: &Value) -> Value {
    let mut out = json!({
        "eventTimestamp": event["eventTimestamp"],
        "operationName": event["operationName"]["value"],
        "operationDisplayName": event["operationName"]["localizedValue"],
        "status": event["status"]["value"],
        "caller": event["caller"],
        "resourceId": event["resourceId"],
        "resourceGroupName": event["resourceGroupName"],
        "resourceType": event["resourceType"]["value"],
        "level": event["level"],
        "description": event["description"],
        "correlationId": event["correlationId"],
    });
    if let Some(claims) = event.get("claims").filter(|c| c.is_object()) {
        out["claims"] = json!({
            "name": claims["name"],
            "upn": claims[UPN_CLAIM],
            "appid": claims["appid"],
        });
    }
    out
}

/// Filters for [`MonitorService::query_activity_log`].
#[derive(Debug, Default)]
pub struct ActivityLogFilter<'a> {
    pub resource_group: &'a str,
    pub resource_id: &'a str,
    pub operation_name: &'a str,
    pub status: &'a str,
}

impl ActivityLogFilter<'_> {
    pub fn to_odata(&self, since: DateTime<Utc>) -> String {
        let mut clauses = vec![format!(
            "eventTimestamp ge '{}'",
            since.to_rfc3339_opts(SecondsFormat::Secs, true)
        )];
        let mut push = |field: &str, value: &str| {
            if !value.is_empty() {
                clauses.push(format!("{field} eq '{}'", escape_kql(value)));
            }
        };
        push("resourceGroupName", self.resource_group);
        push("resourceId", self.resource_id);
        push("operationName.value", self.operation_name);
        push("status.value", self.status);
        clauses.join(" and ")
    }
}

pub struct MonitorService {
    base: AzureService,
}

impl MonitorService {
    pub fn new(base: AzureService) -> Self {
        Self { base }
    }

    fn log_analytics_base(&self) -> &str {
        self.base
            .context()
            .config
            .endpoints
            .log_analytics
            .trim_end_matches('/')
    }

    pub async fn list_workspaces(
        &self,
        subscription: &str,
        resource_group: &str,
        top: u32,
    ) -> AzureResult<Vec<Value>> {
        let sub_id = self.base.resolve_subscription(subscription, None).await?;
        let mut query =
            String::from("resources | where type =~ 'microsoft.operationalinsights/workspaces'");
        if !resource_group.is_empty() {
            query.push_str(&format!(
                " | where resourceGroup =~ '{}'",
                escape_kql(resource_group)
            ));
        }
        query.push_str(&format!(
            " | project id, name, resourceGroup, location, \
             customerId = properties.customerId, sku = properties.sku.name, \
             retentionInDays = properties.retentionInDays, \
             provisioningState = properties.provisioningState | take {top}"
        ));

        let result = self
            .base
            .execute_resource_graph_query(&query, &[sub_id], &[], 0, top)
            .await?;
        Ok(result["data"].as_array().cloned().unwrap_or_default())
    }

    /// `{log analytics}/v1/<segments>`, each segment percent-encoded.
    fn log_analytics_url(&self, segments: &[&str]) -> Result<Url, ToolError> {
        let mut url = Url::parse(self.log_analytics_base()).map_err(|err| {
            ToolError::configuration(
                format!("Invalid Log Analytics endpoint: {err}"),
                Some("AZURE_LOG_ANALYTICS_ENDPOINT"),
            )
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                ToolError::configuration(
                    "Log Analytics endpoint cannot carry a path",
                    Some("AZURE_LOG_ANALYTICS_ENDPOINT"),
                )
            })?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    async fn post_query(&self, url: Url, body: &Value, include_statistics: bool) -> AzureResult<Value> {
        let scope = format!("{}/.default", self.log_analytics_base());
        let response = self
            .base
            .send(Method::POST, url.as_str(), &scope, None, |req| {
                let req = req.json(body);
                if include_statistics {
                    req.header("Prefer", "include-statistics=true")
                } else {
                    req
                }
            })
            .await?;
        Ok(response.json().await?)
    }

    /// Run KQL against a workspace. Partial results carry `status: "partial"`
    /// and the service's error message.
    pub async fn query_logs(
        &self,
        workspace_id: &str,
        query: &str,
        hours: u32,
        include_statistics: bool,
    ) -> AzureResult<Value> {
        let url = self.log_analytics_url(&["workspaces", workspace_id, "query"])?;
        let body = json!({ "query": query, "timespan": format!("PT{hours}H") });
        let raw = self.post_query(url, &body, include_statistics).await?;
        Ok(shape_query_response(&raw, include_statistics))
    }

    /// Run KQL scoped to one resource's logs instead of a workspace.
    /// `timespan` is an ISO 8601 duration.
    pub async fn query_resource(
        &self,
        resource_id: &str,
        query: &str,
        timespan: &str,
        include_statistics: bool,
    ) -> AzureResult<Value> {
        require_resource_id(resource_id)?;
        let mut segments: Vec<&str> = resource_id.split('/').filter(|s| !s.is_empty()).collect();
        segments.push("query");
        let url = self.log_analytics_url(&segments)?;
        let body = json!({ "query": query, "timespan": timespan });
        let raw = self.post_query(url, &body, include_statistics).await?;
        Ok(shape_query_response(&raw, include_statistics))
    }

    /// Several workspace queries in one `$batch` round trip.
    pub async fn query_logs_batch(
        &self,
        workspace_id: &str,
        queries: &[BatchQuery],
        hours: u32,
    ) -> AzureResult<Vec<Value>> {
        let url = self.log_analytics_url(&["$batch"])?;
        let body = batch_request(workspace_id, queries, hours);
        let raw = self.post_query(url, &body, false).await?;
        Ok(shape_batch_response(&raw, queries))
    }

    pub async fn query_metrics(
        &self,
        resource_id: &str,
        metric_names: &[String],
        hours: u32,
        interval: &str,
        aggregations: &[String],
    ) -> AzureResult<Value> {
        require_resource_id(resource_id)?;
        let timespan = timespan_ending(Utc::now(), hours);

        let mut url = self.base.arm_url(
            &format!(
                "/{}/providers/Microsoft.Insights/metrics",
                resource_id.trim_start_matches('/')
            ),
            METRICS_API_VERSION,
        );
        url.push('&');
        url.push_str(&metrics_query_string(
            metric_names,
            &timespan,
            interval,
            aggregations,
        ));

        let raw = self
            .base
            .request_json(Method::GET, &url, &self.base.arm_scope(), None)
            .await?;
        let metrics: Vec<Value> = raw["value"]
            .as_array()
            .map(|values| values.iter().map(shape_metric).collect())
            .unwrap_or_default();

        Ok(json!({
            "timespan": timespan,
            "interval": interval,
            "metrics": metrics,
        }))
    }

    pub async fn list_metric_definitions(&self, resource_id: &str) -> AzureResult<Vec<Value>> {
        require_resource_id(resource_id)?;
        let path = format!(
            "/{}/providers/Microsoft.Insights/metricDefinitions",
            resource_id.trim_start_matches('/')
        );
        let definitions = self.base.arm_list(&path, METRICS_API_VERSION, None).await?;

        Ok(definitions
            .iter()
            .map(|def| {
                let availabilities: Vec<Value> = def["metricAvailabilities"]
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .map(|a| json!({ "timeGrain": a["timeGrain"], "retention": a["retention"] }))
                            .collect()
                    })
                    .unwrap_or_default();
                json!({
                    "name": def["name"]["value"].as_str().unwrap_or("unknown"),
                    "displayName": def["name"]["localizedValue"],
                    "unit": def["unit"],
                    "primaryAggregationType": def["primaryAggregationType"],
                    "supportedAggregationTypes": def["supportedAggregationTypes"],
                    "metricAvailabilities": availabilities,
                })
            })
            .collect())
    }

    pub async fn query_activity_log(
        &self,
        subscription: &str,
        filter: &ActivityLogFilter<'_>,
        hours: u32,
        top: u32,
    ) -> AzureResult<Vec<Value>> {
        let sub_id = self.base.resolve_subscription(subscription, None).await?;
        let since = Utc::now() - Duration::hours(i64::from(hours));
        let odata = filter.to_odata(since);

        let mut url = self.base.arm_url(
            &format!("/subscriptions/{sub_id}/providers/Microsoft.Insights/eventtypes/management/values"),
            ACTIVITY_LOG_API_VERSION,
        );
        url.push('&');
        url.push_str(
            &url::form_urlencoded::Serializer::new(String::new())
                .append_pair("$filter", &odata)
                .finish(),
        );

        let events = self
            .base
            .get_paged(
                &url,
                &self.base.arm_scope(),
                HeaderMap::new(),
                Some(top as usize),
            )
            .await?;
        Ok(events.iter().map(shape_event).collect())
    }

    pub async fn get_metric_baselines(
        &self,
        resource_id: &str,
        metric_names: &[String],
        hours: u32,
        interval: &str,
    ) -> AzureResult<Vec<Value>> {
        require_resource_id(resource_id)?;
        let timespan = timespan_ending(Utc::now(), hours);
        let mut url = self.base.arm_url(
            &format!(
                "/{}/providers/Microsoft.Insights/metricBaselines",
                resource_id.trim_start_matches('/')
            ),
            BASELINES_API_VERSION,
        );
        url.push('&');
        url.push_str(&metrics_query_string(metric_names, &timespan, interval, &[]));

        let raw = self
            .base
            .request_json(Method::GET, &url, &self.base.arm_scope(), None)
            .await?;
        Ok(items(&raw["value"]).iter().map(shape_baseline).collect())
    }

    /// Fired alerts, newest first, through Resource Graph.
    pub async fn list_alerts(
        &self,
        subscription: &str,
        filter: &AlertFilter<'_>,
        top: u32,
    ) -> AzureResult<Vec<Value>> {
        let sub_id = self.base.resolve_subscription(subscription, None).await?;
        let result = self
            .base
            .execute_resource_graph_query(&filter.to_kql(top), &[sub_id], &[], 0, top)
            .await?;
        Ok(result["data"].as_array().cloned().unwrap_or_default())
    }

    async fn list_in_scope(
        &self,
        subscription: &str,
        resource_group: &str,
        provider_path: &str,
        api_version: &str,
        top: u32,
    ) -> AzureResult<Vec<Value>> {
        let scope = self.base.scope_path(subscription, resource_group).await?;
        self.base
            .arm_list(
                &format!("{scope}/providers/{provider_path}"),
                api_version,
                Some(top as usize),
            )
            .await
    }

    async fn get_in_group(
        &self,
        subscription: &str,
        resource_group: &str,
        provider_path: &str,
        name: &str,
        api_version: &str,
    ) -> AzureResult<Value> {
        require_path_segment(resource_group, "resource_group")?;
        let scope = self.base.scope_path(subscription, resource_group).await?;
        let url = self
            .base
            .arm_url(&format!("{scope}/providers/{provider_path}/{name}"), api_version);
        self.base
            .request_json(Method::GET, &url, &self.base.arm_scope(), None)
            .await
    }

    pub async fn list_alert_rules(
        &self,
        subscription: &str,
        resource_group: &str,
        top: u32,
    ) -> AzureResult<Vec<Value>> {
        let rules = self
            .list_in_scope(
                subscription,
                resource_group,
                "Microsoft.Insights/metricAlerts",
                METRIC_ALERTS_API_VERSION,
                top,
            )
            .await?;
        Ok(rules.iter().map(shape_alert_rule).collect())
    }

    pub async fn get_alert_rule(
        &self,
        subscription: &str,
        resource_group: &str,
        rule_name: &str,
    ) -> AzureResult<Value> {
        require_path_segment(rule_name, "rule_name")?;
        let rule = self
            .get_in_group(
                subscription,
                resource_group,
                "Microsoft.Insights/metricAlerts",
                rule_name,
                METRIC_ALERTS_API_VERSION,
            )
            .await?;
        Ok(shape_alert_rule(&rule))
    }

    pub async fn list_autoscale_settings(
        &self,
        subscription: &str,
        resource_group: &str,
        top: u32,
    ) -> AzureResult<Vec<Value>> {
        let settings = self
            .list_in_scope(
                subscription,
                resource_group,
                "Microsoft.Insights/autoscalesettings",
                AUTOSCALE_API_VERSION,
                top,
            )
            .await?;
        Ok(settings.iter().map(shape_autoscale).collect())
    }

    pub async fn get_autoscale_setting(
        &self,
        subscription: &str,
        resource_group: &str,
        setting_name: &str,
    ) -> AzureResult<Value> {
        require_path_segment(setting_name, "setting_name")?;
        let setting = self
            .get_in_group(
                subscription,
                resource_group,
                "Microsoft.Insights/autoscalesettings",
                setting_name,
                AUTOSCALE_API_VERSION,
            )
            .await?;
        Ok(shape_autoscale(&setting))
    }

    pub async fn list_action_groups(
        &self,
        subscription: &str,
        resource_group: &str,
        top: u32,
    ) -> AzureResult<Vec<Value>> {
        let groups = self
            .list_in_scope(
                subscription,
                resource_group,
                "Microsoft.Insights/actionGroups",
                ACTION_GROUPS_API_VERSION,
                top,
            )
            .await?;
        Ok(groups.iter().map(shape_action_group).collect())
    }

    pub async fn list_diagnostic_settings(&self, resource_id: &str) -> AzureResult<Vec<Value>> {
        require_resource_id(resource_id)?;
        let path = format!(
            "/{}/providers/Microsoft.Insights/diagnosticSettings",
            resource_id.trim_start_matches('/')
        );
        let settings = self
            .base
            .arm_list(&path, DIAGNOSTIC_SETTINGS_API_VERSION, None)
            .await?;
        Ok(settings.iter().map(shape_diagnostic_setting).collect())
    }

    pub async fn list_data_collection_rules(
        &self,
        subscription: &str,
        resource_group: &str,
        top: u32,
    ) -> AzureResult<Vec<Value>> {
        let sub_id = self.base.resolve_subscription(subscription, None).await?;
        let mut query =
            String::from("resources | where type =~ 'microsoft.insights/datacollectionrules'");
        if !resource_group.is_empty() {
            query.push_str(&format!(
                " | where resourceGroup =~ '{}'",
                escape_kql(resource_group)
            ));
        }
        query.push_str(&format!(
            " | project id, name, resourceGroup, location, kind, \
             description = properties.description, \
             dataSources = properties.dataSources, \
             destinations = properties.destinations | take {top}"
        ));
        let result = self
            .base
            .execute_resource_graph_query(&query, &[sub_id], &[], 0, top)
            .await?;
        Ok(result["data"].as_array().cloned().unwrap_or_default())
    }

    pub async fn list_scheduled_query_rules(
        &self,
        subscription: &str,
        resource_group: &str,
        top: u32,
    ) -> AzureResult<Vec<Value>> {
        let rules = self
            .list_in_scope(
                subscription,
                resource_group,
                "Microsoft.Insights/scheduledQueryRules",
                SCHEDULED_QUERY_RULES_API_VERSION,
                top,
            )
            .await?;
        Ok(rules.iter().map(shape_scheduled_query_rule).collect())
    }
}
