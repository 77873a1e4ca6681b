//! Microsoft Entra ID users, groups, applications, directory roles and audit
//! logs over Microsoft Graph.
//!
//! Needs the Graph application permissions `User.Read.All`, `Group.Read.All`,
//! `GroupMember.Read.All`, `Application.Read.All` and
//! `RoleManagement.Read.Directory`. Sign-in and audit logs also need
//! `AuditLog.Read.All` and an Entra ID P1 or P2 license.

mod service;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

pub use service::{DirectoryObject, DirectoryQuery, EntraIdService};
use service::{and_filters, odata_string, AuditStream};

use super::failure;
use crate::context::AzureContext;
use crate::error::{ToolError, ToolResult};
use crate::registry::ToolRegistry;
use crate::service::{is_guid, AzureService};
use crate::tool::{AzureTool, ToolMetadata};

pub(crate) fn register(registry: &mut ToolRegistry) {
    registry.register::<EntraIdUserListTool>("entraid", Some("user"));
    registry.register::<EntraIdUserGetTool>("entraid", Some("user"));
    registry.register::<EntraIdUserManagerTool>("entraid", Some("user"));
    registry.register::<EntraIdUserDirectReportsTool>("entraid", Some("user"));
    registry.register::<EntraIdUserMemberOfTool>("entraid", Some("user"));
    registry.register::<EntraIdUserLicensesTool>("entraid", Some("user"));
    registry.register::<EntraIdGroupListTool>("entraid", Some("group"));
    registry.register::<EntraIdGroupGetTool>("entraid", Some("group"));
    registry.register::<EntraIdGroupMembersTool>("entraid", Some("group"));
    registry.register::<EntraIdGroupOwnersTool>("entraid", Some("group"));
    registry.register::<EntraIdAppListTool>("entraid", Some("app"));
    registry.register::<EntraIdAppGetTool>("entraid", Some("app"));
    registry.register::<EntraIdServicePrincipalListTool>("entraid", Some("serviceprincipal"));
    registry.register::<EntraIdServicePrincipalGetTool>("entraid", Some("serviceprincipal"));
    registry.register::<EntraIdDirectoryRolesTool>("entraid", Some("security"));
    registry.register::<EntraIdRoleAssignmentsTool>("entraid", Some("security"));
    registry.register::<EntraIdSignInLogsTool>("entraid", Some("security"));
    registry.register::<EntraIdAuditLogsTool>("entraid", Some("security"));
}

/// Values spliced into OData filters must be object IDs.
fn optional_guid(value: &str, field: &str) -> Result<(), ToolError> {
    if value.is_empty() || is_guid(value) {
        Ok(())
    } else {
        Err(ToolError::validation_field(
            format!("{field} must be an object ID (GUID)"),
            field,
        ))
    }
}

fn entraid(ctx: &AzureContext) -> EntraIdService {
    EntraIdService::new(AzureService::new(ctx))
}

fn default_top() -> u32 {
    50
}

/// How much of each directory object to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    #[default]
    Summary,
    Full,
    /// Sign-in activity and account state. Users only.
    Security,
}

/// Shared listing options.
#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct DirectoryListOptions {
    /// OData filter, e.g. "department eq 'Engineering'".
    #[serde(default)]
    pub filter_query: String,
    /// Free-text search on display name.
    #[serde(default)]
    pub search: String,
    /// 'summary', 'full' or (users only) 'security'.
    #[serde(default)]
    pub detail_level: DetailLevel,
    /// Explicit fields to return. Overrides detail_level.
    #[serde(default)]
    pub select: Vec<String>,
    /// Maximum number of objects to return (1-999).
    #[serde(default = "default_top")]
    #[validate(range(min = 1, max = 999))]
    pub top: u32,
}

impl DirectoryListOptions {
    fn query(&self, object: DirectoryObject) -> DirectoryQuery<'_> {
        DirectoryQuery {
            object,
            filter: &self.filter_query,
            search: &self.search,
            detail: self.detail_level,
            select: &self.select,
            top: self.top,
        }
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct EntraIdUserListTool;

#[async_trait]
impl AzureTool for EntraIdUserListTool {
    type Options = DirectoryListOptions;

    fn name(&self) -> &'static str {
        "entraid_user_list"
    }

    fn description(&self) -> &'static str {
        "List Entra ID users. Filter with OData or search by name and mail. \
         detail_level 'security' adds sign-in activity and password state."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .list(&options.query(DirectoryObject::User))
            .await
            .map(Value::Array)
            .map_err(failure("Entra ID Users"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct EntraIdUserGetOptions {
    /// User object ID (GUID) or userPrincipalName.
    #[validate(length(min = 1))]
    pub user_id: String,
    /// 'summary', 'full' or 'security'.
    #[serde(default)]
    pub detail_level: DetailLevel,
    /// Explicit fields to return. Overrides detail_level.
    #[serde(default)]
    pub select: Vec<String>,
}

#[derive(Debug, Default)]
pub struct EntraIdUserGetTool;

#[async_trait]
impl AzureTool for EntraIdUserGetTool {
    type Options = EntraIdUserGetOptions;

    fn name(&self) -> &'static str {
        "entraid_user_get"
    }

    fn description(&self) -> &'static str {
        "Get one Entra ID user by object ID or user principal name."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .get(
                DirectoryObject::User,
                &options.user_id,
                options.detail_level,
                &options.select,
            )
            .await
            .map_err(failure("Entra ID User"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct EntraIdUserOptions {
    /// User object ID (GUID) or userPrincipalName.
    #[validate(length(min = 1))]
    pub user_id: String,
}

#[derive(Debug, Default)]
pub struct EntraIdUserManagerTool;

#[async_trait]
impl AzureTool for EntraIdUserManagerTool {
    type Options = EntraIdUserOptions;

    fn name(&self) -> &'static str {
        "entraid_user_manager"
    }

    fn description(&self) -> &'static str {
        "Get a user's manager. Returns an empty object when no manager is set."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .user_manager(&options.user_id)
            .await
            .map_err(failure("Entra ID User"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct EntraIdUserRelationOptions {
    /// User object ID (GUID) or userPrincipalName.
    #[validate(length(min = 1))]
    pub user_id: String,
    /// Maximum number of objects to return (1-999).
    #[serde(default = "default_top")]
    #[validate(range(min = 1, max = 999))]
    pub top: u32,
}

#[derive(Debug, Default)]
pub struct EntraIdUserDirectReportsTool;

#[async_trait]
impl AzureTool for EntraIdUserDirectReportsTool {
    type Options = EntraIdUserRelationOptions;

    fn name(&self) -> &'static str {
        "entraid_user_directreports"
    }

    fn description(&self) -> &'static str {
        "List the users and contacts who report directly to a user."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .related("users", &options.user_id, "directReports", options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Entra ID User"))
    }
}

#[derive(Debug, Default)]
pub struct EntraIdUserMemberOfTool;

#[async_trait]
impl AzureTool for EntraIdUserMemberOfTool {
    type Options = EntraIdUserRelationOptions;

    fn name(&self) -> &'static str {
        "entraid_user_memberof"
    }

    fn description(&self) -> &'static str {
        "List the groups, directory roles and administrative units a user is a \
         direct member of."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .related("users", &options.user_id, "memberOf", options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Entra ID User"))
    }
}

#[derive(Debug, Default)]
pub struct EntraIdUserLicensesTool;

#[async_trait]
impl AzureTool for EntraIdUserLicensesTool {
    type Options = EntraIdUserOptions;

    fn name(&self) -> &'static str {
        "entraid_user_licenses"
    }

    fn description(&self) -> &'static str {
        "List the licenses (SKUs and service plans) assigned to a user."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .user_licenses(&options.user_id)
            .await
            .map(Value::Array)
            .map_err(failure("Entra ID User"))
    }
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct EntraIdGroupListTool;

#[async_trait]
impl AzureTool for EntraIdGroupListTool {
    type Options = DirectoryListOptions;

    fn name(&self) -> &'static str {
        "entraid_group_list"
    }

    fn description(&self) -> &'static str {
        "List Entra ID groups, including security, Microsoft 365 and dynamic \
         membership groups."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .list(&options.query(DirectoryObject::Group))
            .await
            .map(Value::Array)
            .map_err(failure("Entra ID Groups"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct EntraIdGroupGetOptions {
    /// Group object ID (GUID).
    #[validate(length(min = 1))]
    pub group_id: String,
    /// 'summary' or 'full'.
    #[serde(default)]
    pub detail_level: DetailLevel,
    /// Explicit fields to return. Overrides detail_level.
    #[serde(default)]
    pub select: Vec<String>,
}

#[derive(Debug, Default)]
pub struct EntraIdGroupGetTool;

#[async_trait]
impl AzureTool for EntraIdGroupGetTool {
    type Options = EntraIdGroupGetOptions;

    fn name(&self) -> &'static str {
        "entraid_group_get"
    }

    fn description(&self) -> &'static str {
        "Get one Entra ID group by object ID."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .get(
                DirectoryObject::Group,
                &options.group_id,
                options.detail_level,
                &options.select,
            )
            .await
            .map_err(failure("Entra ID Group"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct EntraIdGroupMembersOptions {
    /// Group object ID (GUID).
    #[validate(length(min = 1))]
    pub group_id: String,
    /// Maximum number of members to return (1-999).
    #[serde(default = "default_top")]
    #[validate(range(min = 1, max = 999))]
    pub top: u32,
}

#[derive(Debug, Default)]
pub struct EntraIdGroupMembersTool;

#[async_trait]
impl AzureTool for EntraIdGroupMembersTool {
    type Options = EntraIdGroupMembersOptions;

    fn name(&self) -> &'static str {
        "entraid_group_members"
    }

    fn description(&self) -> &'static str {
        "List direct members of an Entra ID group. Members can be users, groups, \
         devices or service principals; each entry reports its type."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .group_members(&options.group_id, options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Entra ID Group Members"))
    }
}

#[derive(Debug, Default)]
pub struct EntraIdGroupOwnersTool;

#[async_trait]
impl AzureTool for EntraIdGroupOwnersTool {
    type Options = EntraIdGroupMembersOptions;

    fn name(&self) -> &'static str {
        "entraid_group_owners"
    }

    fn description(&self) -> &'static str {
        "List the owners of an Entra ID group. Owners can be users or service \
         principals."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .related("groups", &options.group_id, "owners", options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Entra ID Group Owners"))
    }
}

// ---------------------------------------------------------------------------
// Applications and service principals
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct EntraIdAppListTool;

#[async_trait]
impl AzureTool for EntraIdAppListTool {
    type Options = DirectoryListOptions;

    fn name(&self) -> &'static str {
        "entraid_app_list"
    }

    fn description(&self) -> &'static str {
        "List app registrations in Entra ID. 'full' includes redirect URIs, \
         required API permissions and credential expiry dates."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .list(&options.query(DirectoryObject::Application))
            .await
            .map(Value::Array)
            .map_err(failure("Entra ID Applications"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct EntraIdAppGetOptions {
    /// Application object ID (GUID). This is not the appId (client ID).
    #[validate(length(min = 1))]
    pub app_id: String,
    /// 'summary' or 'full'.
    #[serde(default)]
    pub detail_level: DetailLevel,
    /// Explicit fields to return. Overrides detail_level.
    #[serde(default)]
    pub select: Vec<String>,
}

#[derive(Debug, Default)]
pub struct EntraIdAppGetTool;

#[async_trait]
impl AzureTool for EntraIdAppGetTool {
    type Options = EntraIdAppGetOptions;

    fn name(&self) -> &'static str {
        "entraid_app_get"
    }

    fn description(&self) -> &'static str {
        "Get one app registration by object ID. 'full' includes redirect URIs, \
         required permissions and credential expiry dates."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .get(
                DirectoryObject::Application,
                &options.app_id,
                options.detail_level,
                &options.select,
            )
            .await
            .map_err(failure("Entra ID Application"))
    }
}

#[derive(Debug, Default)]
pub struct EntraIdServicePrincipalListTool;

#[async_trait]
impl AzureTool for EntraIdServicePrincipalListTool {
    type Options = DirectoryListOptions;

    fn name(&self) -> &'static str {
        "entraid_serviceprincipal_list"
    }

    fn description(&self) -> &'static str {
        "List service principals (enterprise applications and managed \
         identities) in Entra ID."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .list(&options.query(DirectoryObject::ServicePrincipal))
            .await
            .map(Value::Array)
            .map_err(failure("Entra ID Service Principals"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct EntraIdServicePrincipalGetOptions {
    /// Service principal object ID (GUID).
    #[validate(length(min = 1))]
    pub sp_id: String,
    /// 'summary' or 'full'.
    #[serde(default)]
    pub detail_level: DetailLevel,
    /// Explicit fields to return. Overrides detail_level.
    #[serde(default)]
    pub select: Vec<String>,
}

#[derive(Debug, Default)]
pub struct EntraIdServicePrincipalGetTool;

#[async_trait]
impl AzureTool for EntraIdServicePrincipalGetTool {
    type Options = EntraIdServicePrincipalGetOptions;

    fn name(&self) -> &'static str {
        "entraid_serviceprincipal_get"
    }

    fn description(&self) -> &'static str {
        "Get one service principal by object ID."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .get(
                DirectoryObject::ServicePrincipal,
                &options.sp_id,
                options.detail_level,
                &options.select,
            )
            .await
            .map_err(failure("Entra ID Service Principal"))
    }
}

// ---------------------------------------------------------------------------
// Directory roles and logs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct EntraIdDirectoryRolesOptions {
    /// Maximum number of roles to return (1-999).
    #[serde(default = "default_top")]
    #[validate(range(min = 1, max = 999))]
    pub top: u32,
}

#[derive(Debug, Default)]
pub struct EntraIdDirectoryRolesTool;

#[async_trait]
impl AzureTool for EntraIdDirectoryRolesTool {
    type Options = EntraIdDirectoryRolesOptions;

    fn name(&self) -> &'static str {
        "entraid_directory_roles"
    }

    fn description(&self) -> &'static str {
        "List directory roles activated in the tenant, such as Global \
         Administrator or User Administrator."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        entraid(ctx)
            .directory_roles(options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Entra ID Directory Roles"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct EntraIdRoleAssignmentsOptions {
    /// Only assignments held by this principal (object ID).
    #[serde(default)]
    pub principal_id: String,
    /// Only assignments of this role definition (GUID).
    #[serde(default)]
    pub role_definition_id: String,
    /// Maximum number of assignments to return (1-999).
    #[serde(default = "default_top")]
    #[validate(range(min = 1, max = 999))]
    pub top: u32,
}

impl EntraIdRoleAssignmentsOptions {
    fn filter(&self) -> Result<Option<String>, ToolError> {
        optional_guid(&self.principal_id, "principal_id")?;
        optional_guid(&self.role_definition_id, "role_definition_id")?;
        let mut clauses = Vec::new();
        if !self.principal_id.is_empty() {
            clauses.push(format!("principalId eq {}", odata_string(&self.principal_id)));
        }
        if !self.role_definition_id.is_empty() {
            clauses.push(format!(
                "roleDefinitionId eq {}",
                odata_string(&self.role_definition_id)
            ));
        }
        Ok(and_filters(&clauses, ""))
    }
}

#[derive(Debug, Default)]
pub struct EntraIdRoleAssignmentsTool;

#[async_trait]
impl AzureTool for EntraIdRoleAssignmentsTool {
    type Options = EntraIdRoleAssignmentsOptions;

    fn name(&self) -> &'static str {
        "entraid_role_assignments"
    }

    fn description(&self) -> &'static str {
        "List Entra ID directory role assignments with the assigned principal and \
         role definition expanded."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let filter = options.filter()?;
        entraid(ctx)
            .role_assignments(filter, options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Entra ID Role Assignments"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct EntraIdSignInLogsOptions {
    /// Only sign-ins by this user (object ID).
    #[serde(default)]
    pub user_id: String,
    /// Only sign-ins to this application (appId).
    #[serde(default)]
    pub app_id: String,
    /// Extra OData filter, e.g. "status/errorCode ne 0".
    #[serde(default)]
    pub filter_query: String,
    /// Maximum number of entries to return (1-999).
    #[serde(default = "default_top")]
    #[validate(range(min = 1, max = 999))]
    pub top: u32,
}

impl EntraIdSignInLogsOptions {
    fn filter(&self) -> Result<Option<String>, ToolError> {
        optional_guid(&self.user_id, "user_id")?;
        optional_guid(&self.app_id, "app_id")?;
        let mut clauses = Vec::new();
        if !self.user_id.is_empty() {
            clauses.push(format!("userId eq {}", odata_string(&self.user_id)));
        }
        if !self.app_id.is_empty() {
            clauses.push(format!("appId eq {}", odata_string(&self.app_id)));
        }
        Ok(and_filters(&clauses, &self.filter_query))
    }
}

#[derive(Debug, Default)]
pub struct EntraIdSignInLogsTool;

#[async_trait]
impl AzureTool for EntraIdSignInLogsTool {
    type Options = EntraIdSignInLogsOptions;

    fn name(&self) -> &'static str {
        "entraid_signin_logs"
    }

    fn description(&self) -> &'static str {
        "List recent Entra ID sign-ins, newest first. Requires an Entra ID P1 or \
         P2 license."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let filter = options.filter()?;
        entraid(ctx)
            .audit_log(AuditStream::SignIns, filter, options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Entra ID Sign-in Logs"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct EntraIdAuditLogsOptions {
    /// Activity category, e.g. "UserManagement" or "GroupManagement".
    #[serde(default)]
    pub category: String,
    /// Only activities initiated by this user (object ID).
    #[serde(default)]
    pub initiated_by: String,
    /// Only activities touching this target object ID.
    #[serde(default)]
    pub target_resource: String,
    /// Extra OData filter.
    #[serde(default)]
    pub filter_query: String,
    /// Maximum number of entries to return (1-999).
    #[serde(default = "default_top")]
    #[validate(range(min = 1, max = 999))]
    pub top: u32,
}

impl EntraIdAuditLogsOptions {
    fn filter(&self) -> Result<Option<String>, ToolError> {
        optional_guid(&self.initiated_by, "initiated_by")?;
        optional_guid(&self.target_resource, "target_resource")?;
        let mut clauses = Vec::new();
        if !self.category.is_empty() {
            clauses.push(format!("category eq {}", odata_string(&self.category)));
        }
        if !self.initiated_by.is_empty() {
            clauses.push(format!(
                "initiatedBy/user/id eq {}",
                odata_string(&self.initiated_by)
            ));
        }
        if !self.target_resource.is_empty() {
            clauses.push(format!(
                "targetResources/any(t: t/id eq {})",
                odata_string(&self.target_resource)
            ));
        }
        Ok(and_filters(&clauses, &self.filter_query))
    }
}

#[derive(Debug, Default)]
pub struct EntraIdAuditLogsTool;

#[async_trait]
impl AzureTool for EntraIdAuditLogsTool {
    type Options = EntraIdAuditLogsOptions;

    fn name(&self) -> &'static str {
        "entraid_audit_logs"
    }

    fn description(&self) -> &'static str {
        "List Entra ID directory audit events, newest first. Requires an Entra ID \
         P1 or P2 license."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        let filter = options.filter()?;
        entraid(ctx)
            .audit_log(AuditStream::DirectoryAudits, filter, options.top)
            .await
            .map(Value::Array)
            .map_err(failure("Entra ID Audit Logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::parse_options;
    use crate::tools::raw;
    use serde_json::json;

    #[test]
    fn list_defaults() {
        let opts: DirectoryListOptions = parse_options(raw(json!({}))).unwrap();
        assert_eq!(opts.top, 50);
        assert_eq!(opts.detail_level, DetailLevel::Summary);
        assert!(opts.select.is_empty());
    }

    #[test]
    fn top_is_capped_at_graph_page_size() {
        let err = parse_options::<DirectoryListOptions>(raw(json!({ "top": 1000 }))).unwrap_err();
        assert_eq!(err.to_dict()["field"], "top");
    }

    #[test]
    fn security_detail_parses() {
        let opts: EntraIdUserGetOptions = parse_options(raw(json!({
            "user_id": "ann@contoso.com",
            "detail_level": "security",
        })))
        .unwrap();
        assert_eq!(opts.detail_level, DetailLevel::Security);
    }

    #[test]
    fn list_options_build_a_query() {
        let opts: DirectoryListOptions =
            parse_options(raw(json!({ "search": "ann", "top": 5 }))).unwrap();
        let query = opts.query(DirectoryObject::User);
        assert_eq!(query.top, 5);
        assert_eq!(query.search, "ann");
    }
    #[test]
    fn sign_in_filters_combine_ids_and_free_text() {
        let opts: EntraIdSignInLogsOptions = parse_options(raw(json!({
            "user_id": "11111111-2222-3333-4444-555555555555",
            "filter_query": "status/errorCode ne 0",
        })))
        .unwrap();
        assert_eq!(
            opts.filter().unwrap().unwrap(),
            "userId eq '11111111-2222-3333-4444-555555555555' and (status/errorCode ne 0)"
        );
    }

    #[test]
    fn filter_ids_must_be_guids() {
        let opts: EntraIdSignInLogsOptions =
            parse_options(raw(json!({ "app_id": "x' or true or 'a" }))).unwrap();
        assert_eq!(opts.filter().unwrap_err().to_dict()["field"], "app_id");

        let opts: EntraIdRoleAssignmentsOptions =
            parse_options(raw(json!({ "principal_id": "ann@contoso.com" }))).unwrap();
        assert_eq!(opts.filter().unwrap_err().to_dict()["field"], "principal_id");
    }

    #[test]
    fn audit_categories_are_quoted() {
        let opts: EntraIdAuditLogsOptions = parse_options(raw(json!({
            "category": "User'Management",
            "target_resource": "11111111-2222-3333-4444-555555555555",
        })))
        .unwrap();
        assert_eq!(
            opts.filter().unwrap().unwrap(),
            "category eq 'User''Management' and \
             targetResources/any(t: t/id eq '11111111-2222-3333-4444-555555555555')"
        );
    }

    #[test]
    fn unfiltered_role_assignments_send_no_filter() {
        let opts: EntraIdRoleAssignmentsOptions = parse_options(raw(json!({}))).unwrap();
        assert_eq!(opts.filter().unwrap(), None);
        assert_eq!(opts.top, 50);
    }

    #[test]
    fn every_directory_tool_is_read_only() {
        let mut registry = ToolRegistry::new();
        register(&mut registry);
        assert_eq!(registry.len(), 18);
        for tool in registry.list_tools(None) {
            assert!(tool.metadata().read_only, "{}", tool.name());
        }
    }
}
