//! Azure Communication Services: resource discovery, phone numbers, SMS and
//! email.

use async_trait::async_trait;
use reqwest::Method;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::{Validate, ValidateEmail, ValidationError};

use super::failure;
use crate::azure_error::AzureResult;
use crate::context::AzureContext;
use crate::error::{ToolError, ToolResult};
use crate::registry::ToolRegistry;
use crate::service::{endpoint_url, escape_kql, AzureService};
use crate::tool::{AzureTool, ToolMetadata};

const COMMUNICATION_SCOPE: &str = "https://communication.azure.com/.default";
const EMAIL_API_VERSION: &str = "2023-03-31";
const PHONE_NUMBERS_API_VERSION: &str = "2022-12-01";
const SMS_API_VERSION: &str = "2021-03-07";
const MAX_PHONE_NUMBER_PAGES: usize = 20;

pub(crate) fn register(registry: &mut ToolRegistry) {
    registry.register::<CommunicationResourceListTool>("communication", Some("resource"));
    registry.register::<CommunicationResourceGetTool>("communication", Some("resource"));
    registry.register::<CommunicationPhoneNumberListTool>("communication", Some("phonenumber"));
    registry.register::<CommunicationPhoneNumberGetTool>("communication", Some("phonenumber"));
    registry.register::<CommunicationSmsSendTool>("communication", Some("sms"));
    registry.register::<CommunicationEmailSendTool>("communication", Some("email"));
    registry.register::<CommunicationEmailStatusTool>("communication", Some("email"));
}

fn all_emails(addresses: &Vec<String>) -> Result<(), ValidationError> {
    match addresses.iter().find(|a| !a.validate_email()) {
        Some(bad) => {
            let mut err = ValidationError::new("email");
            err.message = Some(format!("'{bad}' is not a valid email address").into());
            Err(err)
        }
        None => Ok(()),
    }
}

/// `+` followed by 2 to 15 digits, no leading zero.
pub fn is_e164(number: &str) -> bool {
    match number.strip_prefix('+') {
        Some(digits) => {
            (2..=15).contains(&digits.len())
                && !digits.starts_with('0')
                && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

fn e164(number: &str) -> Result<(), ValidationError> {
    if is_e164(number) {
        Ok(())
    } else {
        let mut err = ValidationError::new("e164");
        err.message = Some(format!("'{number}' is not an E.164 number like +14255550100").into());
        Err(err)
    }
}

fn all_e164(numbers: &Vec<String>) -> Result<(), ValidationError> {
    numbers.iter().try_for_each(|n| e164(n))
}

fn shape_phone_number(phone: &Value) -> Value {
    let mut shaped = json!({
        "phone_number": phone["phoneNumber"],
        "country_code": phone["countryCode"],
        "phone_number_type": phone["phoneNumberType"],
        "capabilities": {
            "calling": phone["capabilities"]["calling"],
            "sms": phone["capabilities"]["sms"],
        },
        "assignment_type": phone["assignmentType"],
        "purchase_date": phone["purchaseDate"],
    });
    if let Some(cost) = phone.get("cost").filter(|c| !c.is_null()) {
        shaped["cost"] = json!({
            "amount": cost["amount"],
            "currency_code": cost["currencyCode"],
            "billing_frequency": cost["billingFrequency"],
        });
    }
    shaped
}

fn shape_sms_results(raw: &Value) -> Vec<Value> {
    raw["value"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|r| {
            let successful = r["successful"].as_bool().unwrap_or(false);
            json!({
                "to": r["to"],
                "message_id": r["messageId"],
                "successful": successful,
                "http_status_code": r["httpStatusCode"],
                "error_message": if successful { Value::Null } else { r["errorMessage"].clone() },
            })
        })
        .collect()
}

fn recipients(addresses: &[String]) -> Value {
    addresses
        .iter()
        .map(|a| json!({ "address": a }))
        .collect()
}

pub struct CommunicationService {
    base: AzureService,
}

impl CommunicationService {
    pub fn new(base: AzureService) -> Self {
        Self { base }
    }

    pub async fn list_resources(
        &self,
        subscription: &str,
        resource_group: &str,
        limit: u32,
    ) -> AzureResult<Vec<Value>> {
        let sub_id = self.base.resolve_subscription(subscription, None).await?;
        let query = resource_query(resource_group, None, limit);
        let result = self
            .base
            .execute_resource_graph_query(&query, &[sub_id], &[], 0, limit)
            .await?;
        Ok(result["data"].as_array().cloned().unwrap_or_default())
    }

    pub async fn get_resource(
        &self,
        subscription: &str,
        resource_group: &str,
        name: &str,
    ) -> AzureResult<Value> {
        let sub_id = self.base.resolve_subscription(subscription, None).await?;
        let query = resource_query(resource_group, Some(name), 1);
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
                    "Communication Services resource '{name}' not found"
                ))
                .into()
            })
    }

    /// Purchased numbers, following `nextLink` for a bounded number of pages.
    pub async fn list_phone_numbers(&self, endpoint: &str) -> AzureResult<Vec<Value>> {
        let mut next = Some(
            endpoint_url(endpoint, &["phoneNumbers"], PHONE_NUMBERS_API_VERSION)?.to_string(),
        );
        let mut numbers = Vec::new();
        let mut pages = 0;
        while let Some(url) = next.take() {
            let page = self
                .base
                .request_json(Method::GET, &url, COMMUNICATION_SCOPE, None)
                .await?;
            numbers.extend(
                page["phoneNumbers"]
                    .as_array()
                    .map(Vec::as_slice)
                    .unwrap_or_default()
                    .iter()
                    .map(shape_phone_number),
            );
            pages += 1;
            if pages >= MAX_PHONE_NUMBER_PAGES {
                tracing::warn!(pages, "stopped following phone number pages");
                break;
            }
            next = page["nextLink"]
                .as_str()
                .filter(|link| link.starts_with(endpoint.trim_end_matches('/')))
                .map(str::to_string);
        }
        Ok(numbers)
    }

    pub async fn get_phone_number(&self, endpoint: &str, phone_number: &str) -> AzureResult<Value> {
        let url = endpoint_url(
            endpoint,
            &["phoneNumbers", phone_number],
            PHONE_NUMBERS_API_VERSION,
        )?;
        let phone = self
            .base
            .request_json(Method::GET, url.as_str(), COMMUNICATION_SCOPE, None)
            .await?;
        Ok(shape_phone_number(&phone))
    }

    /// One result per recipient. A rejected recipient does not fail the call.
    pub async fn send_sms(&self, endpoint: &str, request: &Value) -> AzureResult<Vec<Value>> {
        let url = endpoint_url(endpoint, &["sms"], SMS_API_VERSION)?;
        let raw = self
            .base
            .request_json(Method::POST, url.as_str(), COMMUNICATION_SCOPE, Some(request))
            .await?;
        Ok(shape_sms_results(&raw))
    }

    /// Queue an email. Returns the operation id and its initial status
    /// without waiting for delivery.
    pub async fn send_email(&self, endpoint: &str, message: &Value) -> AzureResult<Value> {
        let url = endpoint_url(endpoint, &["emails:send"], EMAIL_API_VERSION)?;
        let result = self
            .base
            .request_json(Method::POST, url.as_str(), COMMUNICATION_SCOPE, Some(message))
            .await?;
        Ok(json!({
            "operation_id": result["id"],
            "status": result["status"],
        }))
    }

    pub async fn email_status(&self, endpoint: &str, operation_id: &str) -> AzureResult<Value> {
        let url = endpoint_url(
            endpoint,
            &["emails", "operations", operation_id],
            EMAIL_API_VERSION,
        )?;
        let result = self
            .base
            .request_json(Method::GET, url.as_str(), COMMUNICATION_SCOPE, None)
            .await?;
        let mut status = json!({
            "operation_id": result["id"],
            "status": result["status"],
        });
        if let Some(error) = result.get("error").filter(|e| !e.is_null()) {
            status["error"] = json!({ "code": error["code"], "message": error["message"] });
        }
        Ok(status)
    }
}

fn resource_query(resource_group: &str, name: Option<&str>, limit: u32) -> String {
    let mut query =
        String::from("resources | where type =~ 'microsoft.communication/communicationservices'");
    if !resource_group.is_empty() {
        query.push_str(&format!(
            " | where resourceGroup =~ '{}'",
            escape_kql(resource_group)
        ));
    }
    if let Some(name) = name {
        query.push_str(&format!(" | where name =~ '{}'", escape_kql(name)));
    }
    query.push_str(&format!(
        " | project name, id, resourceGroup, location, subscriptionId, \
         endpoint = strcat('https://', properties.hostName), \
         dataLocation = properties.dataLocation, \
         provisioningState = properties.provisioningState, tags \
         | order by name asc | limit {limit}"
    ));
    query
}

fn communication(ctx: &AzureContext) -> CommunicationService {
    CommunicationService::new(AzureService::new(ctx))
}

fn default_limit() -> u32 {
    50
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CommunicationResourceListOptions {
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
pub struct CommunicationResourceListTool;

#[async_trait]
impl AzureTool for CommunicationResourceListTool {
    type Options = CommunicationResourceListOptions;

    fn name(&self) -> &'static str {
        "communication_resource_list"
    }

    fn description(&self) -> &'static str {
        "List Azure Communication Services resources with the endpoints used by \
         the email tools."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        communication(ctx)
            .list_resources(&options.subscription, &options.resource_group, options.limit)
            .await
            .map(Value::Array)
            .map_err(failure("Communication Services"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CommunicationResourceGetOptions {
    /// Azure subscription ID or display name.
    #[validate(length(min = 1))]
    pub subscription: String,
    /// Name of the Communication Services resource.
    #[validate(length(min = 1))]
    pub resource_name: String,
    /// Resource group containing the resource. Leave empty to search all.
    #[serde(default)]
    pub resource_group: String,
}

#[derive(Debug, Default)]
pub struct CommunicationResourceGetTool;

#[async_trait]
impl AzureTool for CommunicationResourceGetTool {
    type Options = CommunicationResourceGetOptions;

    fn name(&self) -> &'static str {
        "communication_resource_get"
    }

    fn description(&self) -> &'static str {
        "Get one Azure Communication Services resource, including the endpoint \
         the phone number, SMS and email tools need."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        communication(ctx)
            .get_resource(
                &options.subscription,
                &options.resource_group,
                &options.resource_name,
            )
            .await
            .map_err(failure("Communication Services"))
    }
}

// ---------------------------------------------------------------------------
// Phone numbers and SMS
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CommunicationPhoneNumberListOptions {
    /// Communication Services endpoint, e.g. 'https://myacs.communication.azure.com'.
    #[validate(url)]
    pub endpoint: String,
}

#[derive(Debug, Default)]
pub struct CommunicationPhoneNumberListTool;

#[async_trait]
impl AzureTool for CommunicationPhoneNumberListTool {
    type Options = CommunicationPhoneNumberListOptions;

    fn name(&self) -> &'static str {
        "communication_phonenumber_list"
    }

    fn description(&self) -> &'static str {
        "List phone numbers purchased for a Communication Services resource with \
         their calling and SMS capabilities."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        communication(ctx)
            .list_phone_numbers(&options.endpoint)
            .await
            .map(Value::Array)
            .map_err(failure("Phone Numbers"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CommunicationPhoneNumberGetOptions {
    /// Communication Services endpoint.
    #[validate(url)]
    pub endpoint: String,
    /// Phone number in E.164 format, e.g. '+14255550100'.
    #[validate(custom(function = "e164"))]
    pub phone_number: String,
}

#[derive(Debug, Default)]
pub struct CommunicationPhoneNumberGetTool;

#[async_trait]
impl AzureTool for CommunicationPhoneNumberGetTool {
    type Options = CommunicationPhoneNumberGetOptions;

    fn name(&self) -> &'static str {
        "communication_phonenumber_get"
    }

    fn description(&self) -> &'static str {
        "Get one purchased phone number with its capabilities, assignment type \
         and monthly cost."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        communication(ctx)
            .get_phone_number(&options.endpoint, &options.phone_number)
            .await
            .map_err(failure("Phone Number"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CommunicationSmsSendOptions {
    /// Communication Services endpoint.
    #[validate(url)]
    pub endpoint: String,
    /// SMS-enabled number purchased for this resource, in E.164 format.
    #[validate(custom(function = "e164"))]
    pub from_number: String,
    /// Recipient numbers in E.164 format.
    #[validate(length(min = 1, max = 100), custom(function = "all_e164"))]
    pub to: Vec<String>,
    /// Message text.
    #[validate(length(min = 1))]
    pub message: String,
    /// Request delivery reports through Event Grid.
    #[serde(default)]
    pub enable_delivery_report: bool,
    /// Tag attached to delivery reports.
    #[serde(default)]
    pub tag: String,
}

impl CommunicationSmsSendOptions {
    /// SMS REST payload.
    pub fn request(&self) -> Value {
        let mut send_options = json!({ "enableDeliveryReport": self.enable_delivery_report });
        if !self.tag.is_empty() {
            send_options["tag"] = json!(self.tag);
        }
        json!({
            "from": self.from_number,
            "smsRecipients": self.to.iter().map(|to| json!({ "to": to })).collect::<Vec<_>>(),
            "message": self.message,
            "smsSendOptions": send_options,
        })
    }
}

#[derive(Debug, Default)]
pub struct CommunicationSmsSendTool;

#[async_trait]
impl AzureTool for CommunicationSmsSendTool {
    type Options = CommunicationSmsSendOptions;

    fn name(&self) -> &'static str {
        "communication_sms_send"
    }

    fn description(&self) -> &'static str {
        "Send an SMS to one or more numbers from a number purchased for the \
         resource. Returns a status per recipient. WARNING: every call sends new \
         messages."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::WRITE
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        tracing::info!(recipients = options.to.len(), "sending sms");
        communication(ctx)
            .send_sms(&options.endpoint, &options.request())
            .await
            .map(Value::Array)
            .map_err(failure("Communication SMS"))
    }
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CommunicationEmailSendOptions {
    /// Communication Services endpoint, e.g. 'https://myacs.communication.azure.com'.
    #[validate(url)]
    pub endpoint: String,
    /// Sender address on a verified domain, e.g. 'DoNotReply@contoso.com'.
    #[validate(email)]
    pub from_address: String,
    /// Recipient addresses.
    #[validate(length(min = 1, max = 50), custom(function = "all_emails"))]
    pub to: Vec<String>,
    /// Subject line.
    #[validate(length(min = 1))]
    pub subject: String,
    /// Message body.
    #[validate(length(min = 1))]
    pub body: String,
    /// Treat body as HTML instead of plain text.
    #[serde(default)]
    pub is_html: bool,
    #[serde(default)]
    #[validate(custom(function = "all_emails"))]
    pub cc: Vec<String>,
    #[serde(default)]
    #[validate(custom(function = "all_emails"))]
    pub bcc: Vec<String>,
    #[serde(default)]
    #[validate(custom(function = "all_emails"))]
    pub reply_to: Vec<String>,
}

impl CommunicationEmailSendOptions {
    /// Email REST payload.
    pub fn message(&self) -> Value {
        let mut recipient_lists = json!({ "to": recipients(&self.to) });
        if !self.cc.is_empty() {
            recipient_lists["cc"] = recipients(&self.cc);
        }
        if !self.bcc.is_empty() {
            recipient_lists["bcc"] = recipients(&self.bcc);
        }

        let content = if self.is_html {
            json!({ "subject": self.subject, "html": self.body })
        } else {
            json!({ "subject": self.subject, "plainText": self.body })
        };

        let mut message = json!({
            "senderAddress": self.from_address,
            "recipients": recipient_lists,
            "content": content,
        });
        if !self.reply_to.is_empty() {
            message["replyTo"] = recipients(&self.reply_to);
        }
        message
    }
}

#[derive(Debug, Default)]
pub struct CommunicationEmailSendTool;

#[async_trait]
impl AzureTool for CommunicationEmailSendTool {
    type Options = CommunicationEmailSendOptions;

    fn name(&self) -> &'static str {
        "communication_email_send"
    }

    fn description(&self) -> &'static str {
        "Send an email through Azure Communication Services. Returns an \
         operation_id for communication_email_status. WARNING: every call sends \
         a new email."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::WRITE
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        tracing::info!(
            recipients = options.to.len() + options.cc.len() + options.bcc.len(),
            "sending email"
        );
        communication(ctx)
            .send_email(&options.endpoint, &options.message())
            .await
            .map_err(failure("Communication Email"))
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CommunicationEmailStatusOptions {
    /// Communication Services endpoint.
    #[validate(url)]
    pub endpoint: String,
    /// operation_id returned by communication_email_send.
    #[validate(length(min = 1))]
    pub operation_id: String,
}

#[derive(Debug, Default)]
pub struct CommunicationEmailStatusTool;

#[async_trait]
impl AzureTool for CommunicationEmailStatusTool {
    type Options = CommunicationEmailStatusOptions;

    fn name(&self) -> &'static str {
        "communication_email_status"
    }

    fn description(&self) -> &'static str {
        "Check the status of an email send operation: NotStarted, Running, \
         Succeeded, Failed or Canceled."
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::READ_ONLY
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value> {
        communication(ctx)
            .email_status(&options.endpoint, &options.operation_id)
            .await
            .map_err(failure("Communication Email Operation"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::parse_options;
    use crate::tools::raw;

    fn send_options(extra: Value) -> ToolResult<CommunicationEmailSendOptions> {
        let mut base = json!({
            "endpoint": "https://acs.communication.azure.com",
            "from_address": "DoNotReply@contoso.com",
            "to": ["ann@contoso.com"],
            "subject": "Build finished",
            "body": "All green.",
        });
        if let (Some(obj), Value::Object(more)) = (base.as_object_mut(), extra) {
            obj.extend(more);
        }
        parse_options(raw(base))
    }

    #[test]
    fn plain_text_message() {
        let message = send_options(json!({})).unwrap().message();
        assert_eq!(message["senderAddress"], "DoNotReply@contoso.com");
        assert_eq!(message["recipients"]["to"][0]["address"], "ann@contoso.com");
        assert_eq!(message["content"]["plainText"], "All green.");
        assert!(message["content"].get("html").is_none());
        assert!(message["recipients"].get("cc").is_none());
        assert!(message.get("replyTo").is_none());
    }

    #[test]
    fn html_message_with_copies() {
        let message = send_options(json!({
            "is_html": true,
            "cc": ["bob@contoso.com"],
            "reply_to": ["team@contoso.com"],
        }))
        .unwrap()
        .message();
        assert_eq!(message["content"]["html"], "All green.");
        assert_eq!(message["recipients"]["cc"][0]["address"], "bob@contoso.com");
        assert_eq!(message["replyTo"][0]["address"], "team@contoso.com");
    }

    #[test]
    fn bad_recipient_is_reported_on_its_field() {
        let err = send_options(json!({ "cc": ["not-an-address"] })).unwrap_err();
        assert_eq!(err.to_dict()["field"], "cc");
    }

    #[test]
    fn at_least_one_recipient() {
        let err = send_options(json!({ "to": [] })).unwrap_err();
        assert_eq!(err.to_dict()["field"], "to");
    }

    #[test]
    fn e164_numbers() {
        assert!(is_e164("+14255550100"));
        assert!(is_e164("+447911123456"));
        for bad in ["14255550100", "+0425", "+1", "+1 425 555 0100", "+1234567890123456"] {
            assert!(!is_e164(bad), "{bad}");
        }
    }

    #[test]
    fn endpoint_paths_are_encoded() {
        let url = endpoint_url(
            "https://acs.communication.azure.com/",
            &["phoneNumbers", "+14255550100"],
            PHONE_NUMBERS_API_VERSION,
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://acs.communication.azure.com/phoneNumbers/+14255550100?api-version=2022-12-01"
        );

        let url = endpoint_url(
            "https://acs.communication.azure.com",
            &["emails", "operations", "../../phoneNumbers?x"],
            EMAIL_API_VERSION,
        )
        .unwrap();
        assert_eq!(
            url.path(),
            "/emails/operations/..%2F..%2FphoneNumbers%3Fx"
        );
    }

    #[test]
    fn plain_http_endpoints_are_rejected() {
        let err = endpoint_url("http://acs.example.com", &["sms"], SMS_API_VERSION).unwrap_err();
        assert_eq!(err.to_dict()["field"], "endpoint");
    }

    #[test]
    fn sms_request_shape() {
        let opts: CommunicationSmsSendOptions = parse_options(raw(json!({
            "endpoint": "https://acs.communication.azure.com",
            "from_number": "+18005550100",
            "to": ["+14255550100", "+14255550101"],
            "message": "Deploy done",
            "tag": "ci",
        })))
        .unwrap();
        let request = opts.request();
        assert_eq!(request["from"], "+18005550100");
        assert_eq!(request["smsRecipients"][1]["to"], "+14255550101");
        assert_eq!(request["smsSendOptions"]["enableDeliveryReport"], false);
        assert_eq!(request["smsSendOptions"]["tag"], "ci");
    }

    #[test]
    fn sms_recipients_must_be_e164() {
        let err = parse_options::<CommunicationSmsSendOptions>(raw(json!({
            "endpoint": "https://acs.communication.azure.com",
            "from_number": "+18005550100",
            "to": ["425-555-0100"],
            "message": "hi",
        })))
        .unwrap_err();
        assert_eq!(err.to_dict()["field"], "to");
    }

    #[test]
    fn sms_results_keep_errors_only_for_failures() {
        let results = shape_sms_results(&json!({ "value": [
            { "to": "+1", "messageId": "m1", "httpStatusCode": 202, "successful": true, "errorMessage": "" },
            { "to": "+2", "httpStatusCode": 400, "successful": false, "errorMessage": "Invalid number" },
        ]}));
        assert_eq!(results[0]["error_message"], Value::Null);
        assert_eq!(results[1]["error_message"], "Invalid number");
        assert_eq!(results[1]["successful"], false);
    }

    #[test]
    fn phone_number_shape() {
        let phone = shape_phone_number(&json!({
            "phoneNumber": "+18005550100",
            "countryCode": "US",
            "phoneNumberType": "tollFree",
            "capabilities": { "calling": "outbound", "sms": "inbound+outbound" },
            "assignmentType": "application",
            "purchaseDate": "2024-01-02T00:00:00Z",
            "cost": { "amount": 2.0, "currencyCode": "USD", "billingFrequency": "monthly" },
        }));
        assert_eq!(phone["capabilities"]["sms"], "inbound+outbound");
        assert_eq!(phone["cost"]["currency_code"], "USD");
        assert!(shape_phone_number(&json!({ "phoneNumber": "+1" })).get("cost").is_none());
    }

    #[test]
    fn resource_lookup_query_is_escaped() {
        let query = resource_query("", Some("acs'prod"), 1);
        assert!(query.contains("| where name =~ 'acs''prod'"));
        assert!(!query.contains("resourceGroup =~"));
    }

    #[test]
    fn send_is_not_idempotent() {
        let meta = AzureTool::metadata(&CommunicationEmailSendTool);
        assert!(!meta.read_only);
        assert!(!meta.idempotent);
    }
}
