//! Azure RBAC role definitions and role assignments, plus Microsoft Graph
//! app role grants for service principals.
//!
//! Role assignments and Microsoft Graph permission grants are limited to fixed
//! allow lists. Roles that can hand out further access are refused outright.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use super::entraid::EntraIdService;
use super::failure;
use crate::azure_error::AzureResult;
use crate::context::AzureContext;
use crate::error::{ToolError, ToolResult};
use crate::registry::ToolRegistry;
use crate::service::{is_guid, AzureService};
use crate::tool::{AzureTool, ToolMetadata};

const AUTHORIZATION_API_VERSION: &str = "2022-04-01";

pub const MICROSOFT_GRAPH_APP_ID: &str = "00000003-0000-0000-c000-000000000000";

/// Data-plane and read roles that may be assigned.
pub const ALLOWED_RBAC_ROLES: &[&str] = &[
    "Storage Blob Data Reader",
    "Storage Blob Data Contributor",
    "Storage Blob Data Owner",
    "Storage Queue Data Reader",
    "Storage Queue Data Contributor",
    "Storage Queue Data Message Processor",
    "Storage Queue Data Message Sender",
    "Storage Table Data Reader",
    "Storage Table Data Contributor",
    "Storage File Data SMB Share Reader",
    "Storage File Data SMB Share Contributor",
    "Cosmos DB Account Reader Role",
    "Cosmos DB Built-in Data Reader",
    "Cosmos DB Built-in Data Contributor",
    "DocumentDB Account Contributor",
    "Key Vault Reader",
    "Key Vault Secrets User",
    "Key Vault Secrets Officer",
    "Key Vault Crypto User",
    "Key Vault Crypto Officer",
    "Key Vault Certificates Officer",
    "Search Index Data Reader",
    "Search Index Data Contributor",
    "Search Service Contributor",
    "Cost Management Reader",
    "Cost Management Contributor",
    "Monitoring Reader",
    "Monitoring Contributor",
    "Log Analytics Reader",
    "Log Analytics Contributor",
    "Reader",
];

/// Roles that grant control over access itself.
pub const BLOCKED_RBAC_ROLES: &[&str] = &[
    "Owner",
    "Contributor",
    "User Access Administrator",
    "Role Based Access Control Administrator",
];

/// Read-only Microsoft Graph application permissions that may be granted.
pub const ALLOWED_GRAPH_PERMISSIONS: &[&str] = &[
    "User.Read.All",
    "User.ReadBasic.All",
    "Group.Read.All",
    "GroupMember.Read.All",
    "Application.Read.All",
    "Directory.Read.All",
    "ServicePrincipalEndpoint.Read.All",
    "RoleManagement.Read.Directory",
    "AuditLog.Read.All",
];

pub(crate) fn register(registry: &mut ToolRegistry) {
    registry.register::<RbacRoleListTool>("rbac", Some("role"));
    registry.register::<RbacRoleGetTool>("rbac", Some("role"));
    registry.register::<RbacAllowedListTool>("rbac", Some("role"));
    registry.register::<RbacAssignmentListTool>("rbac", Some("assignment"));
    registry.register::<RbacAssignmentCreateTool>("rbac", Some("assignment"));
    registry.register::<RbacAssignmentDeleteTool>("rbac", Some("assignment"));
    registry.register::<RbacAppRoleListTool>("rbac", Some("approle"));
    registry.register::<RbacAppRoleGrantTool>("rbac", Some("approle"));
}

fn with_filter(path: String, filter: Option<String>) -> String {
    match filter {
        Some(filter) => {
            let encoded: String = url::form_urlencoded::byte_serialize(filter.as_bytes()).collect();
            format!("{path}?$filter={encoded}")
        }
        None => path,
    }
}

fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Last path segment of a role definition id, lowercased.
fn definition_key(role_definition_id: &str) -> String {
    role_definition_id
        .rsplit('/')
        .next()
        .unwrap_or(role_definition_id)
        .to_ascii_lowercase()
}

fn string_list(value: &Value) -> Value {
    Value::Array(value.as_array().cloned().unwrap_or_default())
}

/// Refuse blocked roles first, then anything outside the allow list.
pub fn check_assignable(role_name: &str) -> Result<(), ToolError> {
    if BLOCKED_RBAC_ROLES.contains(&role_name) {
        let mut blocked = BLOCKED_RBAC_ROLES.to_vec();
        blocked.sort_unstable();
        return Err(ToolError::validation_field(
            format!(
                "Role '{role_name}' is blocked for security reasons. Blocked roles: {}",
                blocked.join(", ")
            ),
            "role_name",
        ));
    }
    if !ALLOWED_RBAC_ROLES.contains(&role_name) {
        return Err(ToolError::validation_field(
            format!(
                "Role '{role_name}' is not in the allowed list. Use rbac_allowed_list to see \
                 assignable roles."
            ),
            "role_name",
        ));
    }
    Ok(())
}

pub fn check_graph_permission(resource_app_id: &str, permission: &str) -> Result<(), ToolError> {
    if resource_app_id.eq_ignore_ascii_case(MICROSOFT_GRAPH_APP_ID)
        && !ALLOWED_GRAPH_PERMISSIONS.contains(&permission)
    {
        return Err(ToolError::validation_field(
            format!(
                "Graph permission '{permission}' is not in the allowed list: {}",
                ALLOWED_GRAPH_PERMISSIONS.join(", ")
            ),
            "permission_name",
        ));
    }
    Ok(())
}

/// An explicit assignment scope must be an ARM path under a subscription.
fn validate_scope(scope: &str) -> Result<(), ToolError> {
    let valid = scope.starts_with("/subscriptions/")
        && !scope.contains(['?', '#', '%'])
        && !scope.split('/').any(|segment| segment == "..");
    if valid {
        Ok(())
    } else {
        Err(ToolError::validation_field(
            "scope must be an ARM path starting with /subscriptions/",
            "scope",
        ))
    }
}

fn require_guid(value: &str, field: &str) -> Result<(), ToolError> {
    if is_guid(value) {
        Ok(())
    } else {
        Err(ToolError::validation_field(
            format!("{field} must be a GUID"),
            field,
        ))
    }
}

fn shape_role(role: &Value) -> Value {
    let props = &role["properties"];
    let permissions: Vec<Value> = props["permissions"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|p| {
            json!({
                "actions": string_list(&p["actions"]),
                "not_actions": string_list(&p["notActions"]),
                "data_actions": string_list(&p["dataActions"]),
                "not_data_actions": string_list(&p["notDataActions"]),
            })
        })
        .collect();
    let role_name = props["roleName"].as_str().unwrap_or_default();
    json!({
        "id": role["id"],
        "name": role["name"],
        "role_name": props["roleName"],
        "description": props["description"],
        "role_type": props["type"],
        "permissions": permissions,
        "assignable_scopes": string_list(&props["assignableScopes"]),
        "is_allowed": ALLOWED_RBAC_ROLES.contains(&role_name),
        "is_blocked": BLOCKED_RBAC_ROLES.contains(&role_name),
    })
}

fn shape_assignment(assignment: &Value, role_names: &HashMap<String, String>) -> Value {
    let props = &assignment["properties"];
    let definition_id = props["roleDefinitionId"].as_str().unwrap_or_default();
    let role_name = role_names
        .get(&definition_key(definition_id))
        .map(String::as_str)
        .unwrap_or("Unknown");
    json!({
        "id": assignment["id"],
        "name": assignment["name"],
        "principal_id": props["principalId"],
        "principal_type": props["principalType"],
        "role_definition_id": definition_id,
        "role_name": role_name,
        "scope": props["scope"],
        "created_on": props["createdOn"],
        "updated_on": props["updatedOn"],
        "created_by": props["createdBy"],
    })
}

fn shape_app_role_assignment(assignment: &Value) -> Value {
    json!({
        "id": assignment["id"],
        "app_role_id": assignment["appRoleId"],
        "principal_id": assignment["principalId"],
        "principal_display_name": assignment["principalDisplayName"],
        "resource_id": assignment["resourceId"],
        "resource_display_name": assignment["resourceDisplayName"],
        "created_date_time": assignment["createdDateTime"],
    })
}

/// Id of the app role whose `value` is `permission`.
fn app_role_id<'a>(service_principal: &'a Value, permission: &str) -> Option<&'a str> {
    service_principal["appRoles"]
        .as_array()?
        .iter()
        .find(|role| role["value"].as_str() == Some(permission))
        .and_then(|role| role["id"].as_str())
}

pub struct RbacService {
    base: AzureService,
}

impl RbacService {
    pub fn new(base: AzureService) -> Self {
        Self { base }
    }

    fn graph(&self) -> EntraIdService {
        EntraIdService::new(self.base.clone())
    }

    /// The explicit scope when given, otherwise the subscription itself.
    async fn assignment_scope(&self, subscription: &str, scope: &str) -> AzureResult<String> {
        if scope.is_empty() {
            return self.base.scope_path(subscription, "").await;
        }
        validate_scope(scope)?;
        Ok(scope.trim_end_matches('/').to_string())
    }

    async fn role_definitions(&self, scope: &str, filter: Option<String>) -> AzureResult<Vec<Value>> {
        let path = with_filter(
            format!("{scope}/providers/Microsoft.Authorization/roleDefinitions"),
            filter,
        );
        self.base
            .arm_list(&path, AUTHORIZATION_API_VERSION, None)
            .await
    }

    pub async fn list_roles(&self, subscription: &str, custom_only: bool) -> AzureResult<Vec<Value>> {
        let scope = self.base.scope_path(subscription, "").await?;
        let filter = custom_only.then(|| "type eq 'CustomRole'".to_string());
        let roles = self.role_definitions(&scope, filter).await?;
        Ok(roles.iter().map(shape_role).collect())
    }

    pub async fn get_role(&self, subscription: &str, role_name: &str) -> AzureResult<Value> {
        let scope = self.base.scope_path(subscription, "").await?;
        let filter = format!("roleName eq '{}'", odata_literal(role_name));
        self.role_definitions(&scope, Some(filter))
            .await?
            .first()
            .map(shape_role)
            .ok_or_else(|| ToolError::not_found(format!("Role '{role_name}' not found")).into())
    }

    /// Assignments at a scope with role names resolved from a single
    /// role definition listing.
    pub async fn list_assignments(
        &self,
        subscription: &str,
        resource_group: &str,
        principal_id: &str,
    ) -> AzureResult<Vec<Value>> {
        let scope = self.base.scope_path(subscription, resource_group).await?;
        let filter = (!principal_id.is_empty()).then(|| format!("principalId eq '{principal_id}'"));
        let path = with_filter(
            format!("{scope}/providers/Microsoft.Authorization/roleAssignments"),
            filter,
        );
        let assignments = self
            .base
            .arm_list(&path, AUTHORIZATION_API_VERSION, None)
            .await?;
        if assignments.is_empty() {
            return Ok(assignments);
        }

        let role_names: HashMap<String, String> = self
            .role_definitions(&scope, None)
            .await?
            .iter()
            .filter_map(|role| {
                let name = role["properties"]["roleName"].as_str()?;
                Some((definition_key(role["id"].as_str()?), name.to_string()))
            })
            .collect();

        Ok(assignments
            .iter()
            .map(|a| shape_assignment(a, &role_names))
            .collect())
    }

    pub async fn create_assignment(
        &self,
        subscription: &str,
        scope: &str,
        role_name: &str,
        principal_id: &str,
        principal_type: PrincipalType,
    ) -> AzureResult<Value> {
        check_assignable(role_name).inspect_err(|_| {
            tracing::warn!(role_name, principal_id, scope, "refused role assignment");
        })?;
        let scope = self.assignment_scope(subscription, scope).await?;
        let role = self.get_role(subscription, role_name).await?;
        let name = uuid::Uuid::new_v4().to_string();
        let path = format!("{scope}/providers/Microsoft.Authorization/roleAssignments/{name}");
        let body = json!({
            "properties": {
                "roleDefinitionId": role["id"],
                "principalId": principal_id,
                "principalType": principal_type,
            }
        });
        let url = self.base.arm_url(&path, AUTHORIZATION_API_VERSION);
        let created = self
            .base
            .request_json(Method::PUT, &url, &self.base.arm_scope(), Some(&body))
            .await?;
        tracing::info!(
            role_name,
            principal_id,
            scope = %scope,
            assignment_id = created["id"].as_str().unwrap_or_default(),
            "Role assignment created"
        );

        let definition = definition_key(role["id"].as_str().unwrap_or_default());
        let names = HashMap::from([(definition, role_name.to_string())]);
        Ok(shape_assignment(&created, &names))
    }

    pub async fn delete_assignment(
        &self,
        subscription: &str,
        scope: &str,
        assignment_name: &str,
    ) -> AzureResult<Value> {
        let scope = self.assignment_scope(subscription, scope).await?;
        let path =
            format!("{scope}/providers/Microsoft.Authorization/roleAssignments/{assignment_name}");
        let url = self.base.arm_url(&path, AUTHORIZATION_API_VERSION);
        let deleted = self
            .base
            .request_json(Method::DELETE, &url, &self.base.arm_scope(), None)
            .await?;
        tracing::info!(assignment_name, scope = %scope, "Role assignment deleted");
        let id = deleted["id"].as_str().map(str::to_string).unwrap_or(path);
        Ok(json!({ "id": id, "name": assignment_name, "deleted": true }))
    }

    pub async fn list_app_role_assignments(&self, principal_id: &str) -> AzureResult<Vec<Value>> {
        let graph = self.graph();
        let url = graph.graph_url(&["servicePrincipals", principal_id, "appRoleAssignments"], &[])?;
        let assignments = self
            .base
            .get_paged(&url, &graph.graph_scope(), HeaderMap::new(), None)
            .await?;
        Ok(assignments.iter().map(shape_app_role_assignment).collect())
    }

    pub async fn grant_app_role(
        &self,
        principal_id: &str,
        resource_app_id: &str,
        permission: &str,
    ) -> AzureResult<Value> {
        check_graph_permission(resource_app_id, permission).inspect_err(|_| {
            tracing::warn!(principal_id, permission, "refused app role grant");
        })?;
        let graph = self.graph();
        let scope = graph.graph_scope();

        let lookup = graph.graph_url(
            &["servicePrincipals"],
            &[("$filter", format!("appId eq '{}'", odata_literal(resource_app_id)))],
        )?;
        let found = self
            .base
            .request_json(Method::GET, &lookup, &scope, None)
            .await?;
        let resource = found["value"]
            .as_array()
            .and_then(|sps| sps.first())
            .ok_or_else(|| {
                ToolError::not_found(format!(
                    "Service principal for application '{resource_app_id}' not found"
                ))
            })?;
        let resource_id = resource["id"].as_str().unwrap_or_default();
        let role_id = app_role_id(resource, permission).ok_or_else(|| {
            ToolError::not_found(format!(
                "App role '{permission}' not found on application '{resource_app_id}'"
            ))
        })?;

        let url = graph.graph_url(&["servicePrincipals", resource_id, "appRoleAssignedTo"], &[])?;
        let body = json!({
            "principalId": principal_id,
            "resourceId": resource_id,
            "appRoleId": role_id,
        });
        let granted = self
            .base
            .request_json(Method::POST, &url, &scope, Some(&body))
            .await?;
        tracing::info!(principal_id, permission, resource_app_id, "App role granted");

        let mut shaped = shape_app_role_assignment(&granted);
        shaped["permission_name"] = json!(permission);
        Ok(shaped)
    }
}

fn rbac(ctx: &AzureContext) -> RbacService {
    RbacService::new(AzureService::new(ctx))
}

/// Kind of principal receiving a role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, serde::Serialize, JsonSchema)]
pub enum PrincipalType {
    User,
    Group,
    #[default]
    ServicePrincipal,
}

fn sorted(list: &[&'static str]) -> Vec<&'static str> {
    let mut list = list.to_vec();
    list.sort_unstable();
    list
}

fn matching(list: &[&'static str], filter: &str) -> Vec<&'static str> {
    let filter = filter.to_lowercase();
    sorted(list)
        .into_iter()
        .filter(|name| name.to_lowercase().contains(&filter))
        .collect()
}

// ---------------------------------------------------------------------------
// Role definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct RbacRoleListOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Only return custom roles.
    #[serde(default)]
    pub custom_only: bool,
}

#[derive(Debug, Default)]
pub struct RbacRoleListTool;

#[async_trait]
impl AzureTool for RbacRoleListTool {
    type Options = RbacRoleListOptions;

    fn name(&self) -> &'static str {
        "rbac_role_list"
    }

    fn description(&self) -> &'static str {
        "List role definitions available in a subscription with their \
         permissions, assignable scopes and whether each may be assigned."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        rbac(ctx)
            .list_roles(&options.subscription, options.custom_only)
            .await
            .map(Value::Array)
            .map_err(failure("Role Definitions"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct RbacRoleGetOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Display name of the role, e.g. "Storage Blob Data Reader".
    #[validate(length(min = 1))]
    pub role_name: String,
}

#[derive(Debug, Default)]
pub struct RbacRoleGetTool;

#[async_trait]
impl AzureTool for RbacRoleGetTool {
    type Options = RbacRoleGetOptions;

    fn name(&self) -> &'static str {
        "rbac_role_get"
    }

    fn description(&self) -> &'static str {
        "Get one role definition by display name, including its permissions."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        rbac(ctx)
            .get_role(&options.subscription, &options.role_name)
            .await
            .map_err(failure("Role Definition"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct RbacAllowedListOptions {
    /// Only names containing this text, case-insensitive.
    #[serde(default)]
    pub filter: String,
}

#[derive(Debug, Default)]
pub struct RbacAllowedListTool;

#[async_trait]
impl AzureTool for RbacAllowedListTool {
    type Options = RbacAllowedListOptions;

    fn name(&self) -> &'static str {
        "rbac_allowed_list"
    }

    fn description(&self) -> &'static str {
        "List the Azure roles that may be assigned, the roles that are always \
         refused, and the Microsoft Graph permissions that may be granted."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, _ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        Ok(json!({
            "allowed_rbac_roles": matching(ALLOWED_RBAC_ROLES, &options.filter),
            "blocked_rbac_roles": matching(BLOCKED_RBAC_ROLES, &options.filter),
            "allowed_graph_permissions": matching(ALLOWED_GRAPH_PERMISSIONS, &options.filter),
        }))
    }
}

// ---------------------------------------------------------------------------
// Role assignments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct RbacAssignmentListOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Resource group scope. Leave empty for the subscription.
    #[serde(default)]
    pub resource_group: String,
    /// Only assignments for this principal object ID (GUID).
    #[serde(default)]
    pub principal_id: String,
}

#[derive(Debug, Default)]
pub struct RbacAssignmentListTool;

#[async_trait]
impl AzureTool for RbacAssignmentListTool {
    type Options = RbacAssignmentListOptions;

    fn name(&self) -> &'static str {
        "rbac_assignment_list"
    }

    fn description(&self) -> &'static str {
        "List role assignments for a subscription or resource group, optionally \
         for one principal. Each assignment includes its role name."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        if !options.principal_id.is_empty() {
            require_guid(&options.principal_id, "principal_id")?;
        }
        rbac(ctx)
            .list_assignments(
                &options.subscription,
                &options.resource_group,
                &options.principal_id,
            )
            .await
            .map(Value::Array)
            .map_err(failure("Role Assignments"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct RbacAssignmentCreateOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Full ARM scope, e.g. a resource ID. Empty means the subscription.
    #[serde(default)]
    pub scope: String,
    /// Role display name. Must be on the allowed list.
    #[validate(length(min = 1))]
    pub role_name: String,
    /// Object ID (GUID) of the user, group or service principal.
    pub principal_id: String,
    #[serde(default)]
    pub principal_type: PrincipalType,
}

#[derive(Debug, Default)]
pub struct RbacAssignmentCreateTool;

#[async_trait]
impl AzureTool for RbacAssignmentCreateTool {
    type Options = RbacAssignmentCreateOptions;

    fn name(&self) -> &'static str {
        "rbac_assignment_create"
    }

    fn description(&self) -> &'static str {
        "Assign an allowed role to a principal at a scope. Owner, Contributor and \
         access administration roles are refused; see rbac_allowed_list."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::WRITE
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        require_guid(&options.principal_id, "principal_id")?;
        rbac(ctx)
            .create_assignment(
                &options.subscription,
                &options.scope,
                &options.role_name,
                &options.principal_id,
                options.principal_type,
            )
            .await
            .map_err(failure("Role Assignment"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct RbacAssignmentDeleteOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Scope the assignment was made at. Empty means the subscription.
    #[serde(default)]
    pub scope: String,
    /// Assignment name (GUID) as returned by rbac_assignment_list.
    pub assignment_name: String,
}

#[derive(Debug, Default)]
pub struct RbacAssignmentDeleteTool;

#[async_trait]
impl AzureTool for RbacAssignmentDeleteTool {
    type Options = RbacAssignmentDeleteOptions;

    fn name(&self) -> &'static str {
        "rbac_assignment_delete"
    }

    fn description(&self) -> &'static str {
        "Remove a role assignment by its name at the given scope."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::DESTRUCTIVE
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        require_guid(&options.assignment_name, "assignment_name")?;
        rbac(ctx)
            .delete_assignment(&options.subscription, &options.scope, &options.assignment_name)
            .await
            .map_err(failure("Role Assignment"))
    }
}

// ---------------------------------------------------------------------------
// Graph app roles
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct RbacAppRoleListOptions {
    /// Object ID (GUID) of the service principal.
    pub principal_id: String,
}

#[derive(Debug, Default)]
pub struct RbacAppRoleListTool;

#[async_trait]
impl AzureTool for RbacAppRoleListTool {
    type Options = RbacAppRoleListOptions;

    fn name(&self) -> &'static str {
        "rbac_approle_list"
    }

    fn description(&self) -> &'static str {
        "List application permissions (app role assignments) granted to a \
         service principal, such as Microsoft Graph permissions."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        require_guid(&options.principal_id, "principal_id")?;
        rbac(ctx)
            .list_app_role_assignments(&options.principal_id)
            .await
            .map(Value::Array)
            .map_err(failure("App Role Assignments"))
    }
}

fn default_resource_app() -> String {
    MICROSOFT_GRAPH_APP_ID.to_string()
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct RbacAppRoleGrantOptions {
    /// Object ID (GUID) of the service principal receiving the permission.
    pub principal_id: String,
    /// Permission value, e.g. "User.Read.All".
    #[validate(length(min = 1))]
    pub permission_name: String,
    /// Application ID exposing the permission. Defaults to Microsoft Graph.
    #[serde(default = "default_resource_app")]
    pub resource_app_id: String,
}

#[derive(Debug, Default)]
pub struct RbacAppRoleGrantTool;

#[async_trait]
impl AzureTool for RbacAppRoleGrantTool {
    type Options = RbacAppRoleGrantOptions;

    fn name(&self) -> &'static str {
        "rbac_approle_grant"
    }

    fn description(&self) -> &'static str {
        "Grant an application permission to a service principal. Microsoft Graph \
         permissions are limited to the read-only set in rbac_allowed_list."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::WRITE
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        require_guid(&options.principal_id, "principal_id")?;
        require_guid(&options.resource_app_id, "resource_app_id")?;
        rbac(ctx)
            .grant_app_role(
                &options.principal_id,
                &options.resource_app_id,
                &options.permission_name,
            )
            .await
            .map_err(failure("App Role Assignment"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::parse_options;
    use crate::tools::raw;

    const READER: &str = "acdd72a7-3385-48ef-bd42-f606fba81ae7";
    const PRINCIPAL: &str = "11111111-2222-3333-4444-555555555555";

    #[test]
    fn filter_is_encoded() {
        let path = with_filter("/x".into(), Some("type eq 'CustomRole'".into()));
        assert_eq!(path, "/x?$filter=type+eq+%27CustomRole%27");
        assert_eq!(with_filter("/x".into(), None), "/x");
    }

    #[test]
    fn role_names_are_escaped_in_filters() {
        assert_eq!(odata_literal("Bob's Role"), "Bob''s Role");
    }

    #[test]
    fn definition_key_is_case_insensitive_guid() {
        let id = format!(
            "/subscriptions/s1/providers/Microsoft.Authorization/roleDefinitions/{}",
            READER.to_uppercase()
        );
        assert_eq!(definition_key(&id), READER);
    }

    #[test]
    fn role_permissions_are_flattened() {
        let role = shape_role(&json!({
            "id": format!("/providers/Microsoft.Authorization/roleDefinitions/{READER}"),
            "name": READER,
            "properties": {
                "roleName": "Reader",
                "type": "BuiltInRole",
                "permissions": [{ "actions": ["*/read"], "notActions": [] }],
                "assignableScopes": ["/"],
            },
        }));
        assert_eq!(role["role_name"], "Reader");
        assert_eq!(role["permissions"][0]["actions"][0], "*/read");
        assert_eq!(role["permissions"][0]["data_actions"], json!([]));
        assert_eq!(role["assignable_scopes"], json!(["/"]));
        assert_eq!(role["is_allowed"], true);
        assert_eq!(role["is_blocked"], false);
    }

    #[test]
    fn owner_is_flagged_as_blocked() {
        let role = shape_role(&json!({ "properties": { "roleName": "Owner" } }));
        assert_eq!(role["is_allowed"], false);
        assert_eq!(role["is_blocked"], true);
    }

    #[test]
    fn assignment_role_name_is_resolved() {
        let names = HashMap::from([(READER.to_string(), "Reader".to_string())]);
        let assignment = json!({
            "id": "a1",
            "name": "a1",
            "properties": {
                "principalId": "p1",
                "principalType": "User",
                "roleDefinitionId": format!("/subscriptions/s1/providers/Microsoft.Authorization/roleDefinitions/{READER}"),
                "scope": "/subscriptions/s1",
            },
        });
        assert_eq!(shape_assignment(&assignment, &names)["role_name"], "Reader");
        assert_eq!(
            shape_assignment(&assignment, &HashMap::new())["role_name"],
            "Unknown"
        );
    }

    #[test]
    fn blocked_roles_are_refused_before_the_allow_list() {
        let err = check_assignable("Owner").unwrap_err();
        assert!(err.message.contains("blocked"));
        assert_eq!(err.to_dict()["field"], "role_name");
        let err = check_assignable("Storage Account Contributor").unwrap_err();
        assert!(err.message.contains("not in the allowed list"));
        assert!(check_assignable("Storage Blob Data Reader").is_ok());
    }

    #[test]
    fn allow_and_block_lists_do_not_overlap() {
        for role in BLOCKED_RBAC_ROLES {
            assert!(!ALLOWED_RBAC_ROLES.contains(role), "{role}");
        }
    }

    #[test]
    fn graph_permissions_are_limited_to_read_scopes() {
        assert!(check_graph_permission(MICROSOFT_GRAPH_APP_ID, "User.Read.All").is_ok());
        let err =
            check_graph_permission(MICROSOFT_GRAPH_APP_ID, "Directory.ReadWrite.All").unwrap_err();
        assert_eq!(err.to_dict()["field"], "permission_name");
        // Other applications define their own roles.
        assert!(check_graph_permission(READER, "Custom.Write").is_ok());
    }

    #[test]
    fn scopes_must_live_under_a_subscription() {
        assert!(validate_scope("/subscriptions/s1/resourceGroups/rg").is_ok());
        assert!(validate_scope("/providers/Microsoft.Management/managementGroups/m").is_err());
        assert!(validate_scope("/subscriptions/s1/../s2").is_err());
        assert!(validate_scope("/subscriptions/s1?x=1").is_err());
    }

    #[test]
    fn app_role_is_found_by_value() {
        let sp = json!({
            "id": "sp1",
            "appRoles": [
                { "id": "r1", "value": "User.Read.All" },
                { "id": "r2", "value": "Group.Read.All" },
            ],
        });
        assert_eq!(app_role_id(&sp, "Group.Read.All"), Some("r2"));
        assert_eq!(app_role_id(&sp, "Mail.Send"), None);
    }

    #[tokio::test]
    async fn allowed_list_is_sorted_and_filtered() {
        let opts = parse_options(raw(json!({ "filter": "key vault" }))).unwrap();
        let out = RbacAllowedListTool
            .execute(&AzureContext::for_tests(), opts)
            .await
            .unwrap();
        let roles = out["allowed_rbac_roles"].as_array().unwrap();
        assert_eq!(roles.len(), 6);
        assert_eq!(roles[0], "Key Vault Certificates Officer");
        assert_eq!(out["blocked_rbac_roles"], json!([]));
    }

    #[tokio::test]
    async fn principal_must_be_a_guid() {
        let opts = parse_options(raw(json!({
            "subscription": "prod",
            "principal_id": "ann@contoso.com",
        })))
        .unwrap();
        let err = RbacAssignmentListTool
            .execute(&AzureContext::for_tests(), opts)
            .await
            .unwrap_err();
        assert_eq!(err.to_dict()["field"], "principal_id");
    }

    #[tokio::test]
    async fn owner_assignment_is_refused_without_calling_azure() {
        let opts = parse_options(raw(json!({
            "subscription": "prod",
            "role_name": "Owner",
            "principal_id": PRINCIPAL,
        })))
        .unwrap();
        let err = RbacAssignmentCreateTool
            .execute(&AzureContext::for_tests(), opts)
            .await
            .unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
        assert_eq!(err.to_dict()["field"], "role_name");
    }

    #[tokio::test]
    async fn assignment_names_must_be_guids() {
        let opts = parse_options(raw(json!({
            "subscription": "prod",
            "assignment_name": "../roleDefinitions/x",
        })))
        .unwrap();
        let err = RbacAssignmentDeleteTool
            .execute(&AzureContext::for_tests(), opts)
            .await
            .unwrap_err();
        assert_eq!(err.to_dict()["field"], "assignment_name");
    }

    #[tokio::test]
    async fn write_graph_permissions_are_refused() {
        let opts = parse_options(raw(json!({
            "principal_id": PRINCIPAL,
            "permission_name": "RoleManagement.ReadWrite.Directory",
        })))
        .unwrap();
        let err = RbacAppRoleGrantTool
            .execute(&AzureContext::for_tests(), opts)
            .await
            .unwrap_err();
        assert_eq!(err.to_dict()["field"], "permission_name");
    }

    #[test]
    fn principal_type_defaults_to_service_principal() {
        let opts: RbacAssignmentCreateOptions = parse_options(raw(json!({
            "subscription": "prod",
            "role_name": "Reader",
            "principal_id": PRINCIPAL,
        })))
        .unwrap();
        assert_eq!(opts.principal_type, PrincipalType::ServicePrincipal);
        assert_eq!(json!(opts.principal_type), "ServicePrincipal");
    }

    #[test]
    fn write_tools_are_flagged() {
        assert!(!AzureTool::metadata(&RbacAssignmentCreateTool).idempotent);
        assert!(AzureTool::metadata(&RbacAssignmentDeleteTool).destructive);
        assert!(!AzureTool::metadata(&RbacAppRoleGrantTool).read_only);
        assert!(AzureTool::metadata(&RbacAllowedListTool).read_only);
    }
}
