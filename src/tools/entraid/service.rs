use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use url::Url;

use crate::azure_error::{AzureFailure, AzureResult};
use crate::error::ToolError;
use crate::service::AzureService;

use super::DetailLevel;

const USER_SUMMARY: &[&str] = &[
    "id",
    "displayName",
    "userPrincipalName",
    "mail",
    "jobTitle",
    "department",
    "accountEnabled",
    "userType",
    "createdDateTime",
];

const USER_FULL: &[&str] = &[
    "id",
    "displayName",
    "givenName",
    "surname",
    "userPrincipalName",
    "mail",
    "mailNickname",
    "otherMails",
    "proxyAddresses",
    "accountEnabled",
    "userType",
    "creationType",
    "createdDateTime",
    "jobTitle",
    "department",
    "companyName",
    "employeeId",
    "employeeType",
    "employeeHireDate",
    "officeLocation",
    "mobilePhone",
    "businessPhones",
    "city",
    "state",
    "country",
    "postalCode",
    "streetAddress",
    "usageLocation",
    "lastPasswordChangeDateTime",
    "passwordPolicies",
    "onPremisesSyncEnabled",
    "onPremisesLastSyncDateTime",
    "onPremisesSamAccountName",
    "onPremisesUserPrincipalName",
    "externalUserState",
    "externalUserStateChangeDateTime",
];

// signInActivity needs AuditLog.Read.All and a premium license.
const USER_SECURITY: &[&str] = &[
    "id",
    "displayName",
    "userPrincipalName",
    "accountEnabled",
    "signInActivity",
    "lastPasswordChangeDateTime",
    "createdDateTime",
    "creationType",
    "userType",
    "externalUserState",
    "onPremisesSyncEnabled",
    "onPremisesLastSyncDateTime",
    "passwordPolicies",
];

const GROUP_SUMMARY: &[&str] = &[
    "id",
    "displayName",
    "description",
    "mail",
    "mailEnabled",
    "securityEnabled",
    "groupTypes",
    "membershipRule",
    "createdDateTime",
];

const GROUP_FULL: &[&str] = &[
    "id",
    "displayName",
    "description",
    "mail",
    "mailNickname",
    "mailEnabled",
    "securityEnabled",
    "groupTypes",
    "membershipRule",
    "membershipRuleProcessingState",
    "createdDateTime",
    "renewedDateTime",
    "expirationDateTime",
    "visibility",
    "onPremisesSyncEnabled",
    "onPremisesLastSyncDateTime",
    "onPremisesSamAccountName",
    "proxyAddresses",
    "isAssignableToRole",
];

const APP_SUMMARY: &[&str] = &[
    "id",
    "appId",
    "displayName",
    "createdDateTime",
    "signInAudience",
];

const APP_FULL: &[&str] = &[
    "id",
    "appId",
    "displayName",
    "description",
    "createdDateTime",
    "signInAudience",
    "identifierUris",
    "publisherDomain",
    "web",
    "spa",
    "publicClient",
    "requiredResourceAccess",
    "passwordCredentials",
    "keyCredentials",
];

const SP_SUMMARY: &[&str] = &[
    "id",
    "appId",
    "displayName",
    "servicePrincipalType",
    "accountEnabled",
    "createdDateTime",
];

const SP_FULL: &[&str] = &[
    "id",
    "appId",
    "displayName",
    "description",
    "servicePrincipalType",
    "accountEnabled",
    "createdDateTime",
    "appOwnerOrganizationId",
    "appRoleAssignmentRequired",
    "loginUrl",
    "logoutUrl",
    "replyUrls",
    "servicePrincipalNames",
    "tags",
    "passwordCredentials",
    "keyCredentials",
];

/// Directory object collections the service can list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryObject {
    User,
    Group,
    Application,
    ServicePrincipal,
}

impl DirectoryObject {
    fn collection(self) -> &'static str {
        match self {
            DirectoryObject::User => "users",
            DirectoryObject::Group => "groups",
            DirectoryObject::Application => "applications",
            DirectoryObject::ServicePrincipal => "servicePrincipals",
        }
    }

    /// `$select` fields for a detail level. Only users have a security view;
    /// other objects treat it as `full`.
    pub fn fields(self, detail: DetailLevel) -> &'static [&'static str] {
        match (self, detail) {
            (DirectoryObject::User, DetailLevel::Summary) => USER_SUMMARY,
            (DirectoryObject::User, DetailLevel::Full) => USER_FULL,
            (DirectoryObject::User, DetailLevel::Security) => USER_SECURITY,
            (DirectoryObject::Group, DetailLevel::Summary) => GROUP_SUMMARY,
            (DirectoryObject::Group, _) => GROUP_FULL,
            (DirectoryObject::Application, DetailLevel::Summary) => APP_SUMMARY,
            (DirectoryObject::Application, _) => APP_FULL,
            (DirectoryObject::ServicePrincipal, DetailLevel::Summary) => SP_SUMMARY,
            (DirectoryObject::ServicePrincipal, _) => SP_FULL,
        }
    }

    /// `$search` expression. Users also match on mail.
    pub fn search_expression(self, term: &str) -> String {
        let term = term.replace('"', "");
        match self {
            DirectoryObject::User => format!("\"displayName:{term}\" OR \"mail:{term}\""),
            _ => format!("\"displayName:{term}\""),
        }
    }
}

/// Parameters of a directory listing.
#[derive(Debug, Clone)]
pub struct DirectoryQuery<'a> {
    pub object: DirectoryObject,
    pub filter: &'a str,
    pub search: &'a str,
    pub detail: DetailLevel,
    pub select: &'a [String],
    pub top: u32,
}

impl DirectoryQuery<'_> {
    fn select_clause(&self) -> String {
        if self.select.is_empty() {
            self.object.fields(self.detail).join(",")
        } else {
            self.select.join(",")
        }
    }

    /// Query-string pairs, in request order.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("$select", self.select_clause()),
            // Graph pages cap at 999.
            ("$top", self.top.min(999).to_string()),
        ];
        if !self.filter.is_empty() {
            params.push(("$filter", self.filter.to_string()));
        }
        if !self.search.is_empty() {
            params.push(("$search", self.object.search_expression(self.search)));
        }
        params
    }

    /// `$search` only works with eventual consistency.
    fn needs_eventual_consistency(&self) -> bool {
        !self.search.is_empty()
    }
}

/// Reduce a directory object returned from a membership listing.
pub fn member_summary(member: &Value) -> Value {
    let kind = member["@odata.type"]
        .as_str()
        .map(|t| t.trim_start_matches("#microsoft.graph."))
        .unwrap_or("directoryObject");
    json!({
        "id": member["id"],
        "type": kind,
        "displayName": member["displayName"],
        "userPrincipalName": member["userPrincipalName"],
        "mail": member["mail"],
        "appId": member["appId"],
    })
}

/// Join OData filter clauses with `and`. Free-form clauses are parenthesized
/// so their own `or` cannot escape.
pub fn and_filters(clauses: &[String], extra: &str) -> Option<String> {
    let mut parts: Vec<String> = clauses.to_vec();
    if !extra.trim().is_empty() {
        parts.push(if parts.is_empty() {
            extra.to_string()
        } else {
            format!("({extra})")
        });
    }
    (!parts.is_empty()).then(|| parts.join(" and "))
}

/// Quote a value as an OData string literal.
pub fn odata_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn shape_license(license: &Value) -> Value {
    let plans: Vec<Value> = license["servicePlans"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|plan| {
            json!({
                "servicePlanName": plan["servicePlanName"],
                "provisioningStatus": plan["provisioningStatus"],
                "appliesTo": plan["appliesTo"],
            })
        })
        .collect();
    json!({
        "id": license["id"],
        "skuId": license["skuId"],
        "skuPartNumber": license["skuPartNumber"],
        "servicePlans": plans,
    })
}

fn needs_premium(code: Option<&str>, message: &str) -> bool {
    let text = format!("{} {}", code.unwrap_or_default(), message).to_lowercase();
    text.contains("premium") || text.contains("license")
}

/// Sign-in and audit logs are refused with 403 on tenants without an
/// Entra ID P1/P2 license. Report that as its own error code.
pub fn premium_failure(failure: AzureFailure, operation: &str) -> AzureFailure {
    match failure {
        AzureFailure::Http {
            status: 403,
            code,
            message,
            ..
        } if needs_premium(code.as_deref(), &message) => ToolError::authorization(format!(
            "Operation '{operation}' requires an Entra ID P1 or P2 license. Sign-in \
             logs and audit logs are premium features. Details: {message}"
        ))
        .with_code(LICENSE_REQUIRED)
        .into(),
        other => other,
    }
}

pub const LICENSE_REQUIRED: &str = "LicenseRequired";

/// Which audit log stream to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStream {
    SignIns,
    DirectoryAudits,
}

impl AuditStream {
    fn segment(self) -> &'static str {
        match self {
            AuditStream::SignIns => "signIns",
            AuditStream::DirectoryAudits => "directoryAudits",
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            AuditStream::SignIns => "createdDateTime desc",
            AuditStream::DirectoryAudits => "activityDateTime desc",
        }
    }

    fn operation(self) -> &'static str {
        match self {
            AuditStream::SignIns => "list_signin_logs",
            AuditStream::DirectoryAudits => "list_audit_logs",
        }
    }
}

pub struct EntraIdService {
    base: AzureService,
}

impl EntraIdService {
    pub fn new(base: AzureService) -> Self {
        Self { base }
    }

    fn graph_base(&self) -> &str {
        self.base
            .context()
            .config
            .endpoints
            .graph
            .trim_end_matches('/')
    }

    pub fn graph_scope(&self) -> String {
        format!("{}/.default", self.graph_base())
    }

    /// Build `<graph>/v1.0/<segments...>?<params>` with each segment
    /// percent-encoded, so UPNs like `x#EXT#@contoso.com` survive.
    pub fn graph_url(&self, segments: &[&str], params: &[(&str, String)]) -> AzureResult<String> {
        let mut url = Url::parse(&format!("{}/v1.0/", self.graph_base()))
            .map_err(|err| AzureFailure::Other(format!("Invalid Graph endpoint: {err}")))?;
        url.path_segments_mut()
            .map_err(|()| AzureFailure::Other("Graph endpoint cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(segments);
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url.into())
    }

    pub async fn list(&self, query: &DirectoryQuery<'_>) -> AzureResult<Vec<Value>> {
        let url = self.graph_url(&[query.object.collection()], &query.params())?;
        let mut headers = HeaderMap::new();
        if query.needs_eventual_consistency() {
            headers.insert(
                HeaderName::from_static("consistencylevel"),
                HeaderValue::from_static("eventual"),
            );
        }
        self.base
            .get_paged(&url, &self.graph_scope(), headers, Some(query.top as usize))
            .await
    }

    pub async fn get(
        &self,
        object: DirectoryObject,
        id: &str,
        detail: DetailLevel,
        select: &[String],
    ) -> AzureResult<Value> {
        let select = if select.is_empty() {
            object.fields(detail).join(",")
        } else {
            select.join(",")
        };
        let url = self.graph_url(&[object.collection(), id], &[("$select", select)])?;
        self.base
            .request_json(Method::GET, &url, &self.graph_scope(), None)
            .await
    }

    pub async fn group_members(&self, group_id: &str, top: u32) -> AzureResult<Vec<Value>> {
        let url = self.graph_url(
            &["groups", group_id, "members"],
            &[("$top", top.min(999).to_string())],
        )?;
        let members = self
            .base
            .get_paged(&url, &self.graph_scope(), HeaderMap::new(), Some(top as usize))
            .await?;
        Ok(members.iter().map(member_summary).collect())
    }

    /// Directory objects linked to `id` through a navigation property such
    /// as `owners`, `directReports` or `memberOf`.
    pub async fn related(
        &self,
        collection: &str,
        id: &str,
        relation: &str,
        top: u32,
    ) -> AzureResult<Vec<Value>> {
        let url = self.graph_url(&[collection, id, relation], &[])?;
        let related = self
            .base
            .get_paged(&url, &self.graph_scope(), HeaderMap::new(), Some(top as usize))
            .await?;
        Ok(related.iter().map(member_summary).collect())
    }

    /// The user's manager, or an empty object when none is set.
    pub async fn user_manager(&self, user_id: &str) -> AzureResult<Value> {
        let url = self.graph_url(
            &["users", user_id, "manager"],
            &[("$select", USER_SUMMARY.join(","))],
        )?;
        match self
            .base
            .request_json(Method::GET, &url, &self.graph_scope(), None)
            .await
        {
            Ok(manager) => Ok(manager),
            Err(AzureFailure::NotFound { .. }) => Ok(json!({})),
            Err(err) => Err(err),
        }
    }

    pub async fn user_licenses(&self, user_id: &str) -> AzureResult<Vec<Value>> {
        let url = self.graph_url(&["users", user_id, "licenseDetails"], &[])?;
        let licenses = self
            .base
            .get_paged(&url, &self.graph_scope(), HeaderMap::new(), None)
            .await?;
        Ok(licenses.iter().map(shape_license).collect())
    }

    /// Activated directory roles. The collection does not support `$top`.
    pub async fn directory_roles(&self, top: u32) -> AzureResult<Vec<Value>> {
        let url = self.graph_url(&["directoryRoles"], &[])?;
        self.base
            .get_paged(&url, &self.graph_scope(), HeaderMap::new(), Some(top as usize))
            .await
    }

    pub async fn role_assignments(&self, filter: Option<String>, top: u32) -> AzureResult<Vec<Value>> {
        let mut params = vec![
            ("$top", top.min(999).to_string()),
            ("$expand", "principal,roleDefinition".to_string()),
        ];
        if let Some(filter) = filter {
            params.push(("$filter", filter));
        }
        let url = self.graph_url(&["roleManagement", "directory", "roleAssignments"], &params)?;
        self.base
            .get_paged(&url, &self.graph_scope(), HeaderMap::new(), Some(top as usize))
            .await
    }

    /// Newest entries first from a premium audit log stream.
    pub async fn audit_log(
        &self,
        stream: AuditStream,
        filter: Option<String>,
        top: u32,
    ) -> AzureResult<Vec<Value>> {
        let mut params = vec![
            ("$top", top.min(999).to_string()),
            ("$orderby", stream.order_by().to_string()),
        ];
        if let Some(filter) = filter {
            params.push(("$filter", filter));
        }
        let url = self.graph_url(&["auditLogs", stream.segment()], &params)?;
        self.base
            .get_paged(&url, &self.graph_scope(), HeaderMap::new(), Some(top as usize))
            .await
            .map_err(|failure| premium_failure(failure, stream.operation()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AzureContext;

    fn service() -> EntraIdService {
        EntraIdService::new(AzureService::new(&AzureContext::for_tests()))
    }

    #[test]
    fn detail_levels_pick_field_sets() {
        let user = DirectoryObject::User;
        assert!(user.fields(DetailLevel::Security).contains(&"signInActivity"));
        assert!(!user.fields(DetailLevel::Summary).contains(&"signInActivity"));
        assert_eq!(
            DirectoryObject::Group.fields(DetailLevel::Security),
            DirectoryObject::Group.fields(DetailLevel::Full)
        );
    }

    #[test]
    fn user_search_matches_name_and_mail() {
        assert_eq!(
            DirectoryObject::User.search_expression("ann"),
            "\"displayName:ann\" OR \"mail:ann\""
        );
        assert_eq!(
            DirectoryObject::Group.search_expression("ops\""),
            "\"displayName:ops\""
        );
    }

    #[test]
    fn explicit_select_overrides_detail_level() {
        let select = vec!["id".to_string(), "mail".to_string()];
        let query = DirectoryQuery {
            object: DirectoryObject::User,
            filter: "",
            search: "",
            detail: DetailLevel::Full,
            select: &select,
            top: 5000,
        };
        let params = query.params();
        assert_eq!(params[0], ("$select", "id,mail".to_string()));
        assert_eq!(params[1], ("$top", "999".to_string()));
        assert_eq!(params.len(), 2);
        assert!(!query.needs_eventual_consistency());
    }

    #[test]
    fn search_requires_eventual_consistency() {
        let query = DirectoryQuery {
            object: DirectoryObject::Group,
            filter: "securityEnabled eq true",
            search: "ops",
            detail: DetailLevel::Summary,
            select: &[],
            top: 10,
        };
        assert!(query.needs_eventual_consistency());
        let keys: Vec<_> = query.params().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, ["$select", "$top", "$filter", "$search"]);
    }

    #[test]
    fn guest_upns_are_path_encoded() {
        let url = service()
            .graph_url(&["users", "ann_contoso.com#EXT#@fabrikam.com"], &[])
            .unwrap();
        assert_eq!(
            url,
            "https://graph.microsoft.com/v1.0/users/ann_contoso.com%23EXT%23@fabrikam.com"
        );
    }

    #[test]
    fn members_report_their_object_type() {
        let member = member_summary(&json!({
            "@odata.type": "#microsoft.graph.servicePrincipal",
            "id": "sp-1",
            "displayName": "build-agent",
            "appId": "app-1",
        }));
        assert_eq!(member["type"], "servicePrincipal");
        assert_eq!(member["appId"], "app-1");
    }

    #[test]
    fn filters_are_joined_and_free_form_clauses_grouped() {
        let clauses = vec![format!("userId eq {}", odata_string("u1"))];
        assert_eq!(
            and_filters(&clauses, "status/errorCode eq 0 or riskState eq 'none'"),
            Some("userId eq 'u1' and (status/errorCode eq 0 or riskState eq 'none')".into())
        );
        assert_eq!(and_filters(&[], "x eq 1"), Some("x eq 1".into()));
        assert_eq!(and_filters(&[], "  "), None);
        assert_eq!(odata_string("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn non_premium_tenants_get_a_license_error() {
        let failure = AzureFailure::from_status(
            403,
            Some("Authentication_RequestFromNonPremiumTenantOrB2CTenant".into()),
            "Neither tenant is B2C or tenant doesn't have premium license",
            None,
        );
        let err = crate::azure_error::handle_azure_error(
            premium_failure(failure, "list_signin_logs"),
            None,
        );
        assert_eq!(err.kind_name(), "AuthorizationError");
        assert_eq!(err.to_dict()["code"], LICENSE_REQUIRED);
        assert!(err.message.contains("list_signin_logs"));
    }

    #[test]
    fn other_forbidden_responses_pass_through() {
        let failure = AzureFailure::from_status(403, None, "Insufficient privileges", None);
        assert!(matches!(
            premium_failure(failure, "list_audit_logs"),
            AzureFailure::Http { status: 403, .. }
        ));
    }

    #[test]
    fn licenses_keep_plan_names() {
        let license = shape_license(&json!({
            "id": "l1",
            "skuId": "sku",
            "skuPartNumber": "ENTERPRISEPACK",
            "servicePlans": [{ "servicePlanName": "EXCHANGE_S_ENTERPRISE", "provisioningStatus": "Success" }],
        }));
        assert_eq!(license["skuPartNumber"], "ENTERPRISEPACK");
        assert_eq!(license["servicePlans"][0]["servicePlanName"], "EXCHANGE_S_ENTERPRISE");
    }

    #[test]
    fn service_principals_have_their_own_field_sets() {
        let sp = DirectoryObject::ServicePrincipal;
        assert!(sp.fields(DetailLevel::Summary).contains(&"servicePrincipalType"));
        assert!(sp.fields(DetailLevel::Full).contains(&"keyCredentials"));
        assert_eq!(sp.collection(), "servicePrincipals");
    }

    #[test]
    fn audit_streams_sort_newest_first() {
        assert_eq!(AuditStream::SignIns.order_by(), "createdDateTime desc");
        assert_eq!(AuditStream::DirectoryAudits.segment(), "directoryAudits");
    }
}
