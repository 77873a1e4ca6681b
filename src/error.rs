//! Typed tool errors.
//!
//! Every tool either returns a JSON value or one of these errors.  The error
//! kind tells the calling agent what went wrong (bad input, missing resource,
//! throttling, ...) and [`ToolError::to_dict`] is the shape sent back over MCP.

use serde_json::{json, Map, Value};
use thiserror::Error;

pub type ToolResult<T> = Result<T, ToolError>;

/// Error category plus the fields that only make sense for that category.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolErrorKind {
    /// Caller supplied invalid options.
    Validation { field: Option<String> },
    /// The requested resource does not exist.
    NotFound,
    /// The credential chain was exhausted or the token was rejected.
    Authentication,
    /// Permission denied (HTTP 403).
    Authorization { permission: Option<String> },
    /// An Azure resource is in a state that prevents the operation.
    AzureResource {
        resource_type: Option<String>,
        resource_name: Option<String>,
    },
    /// Connectivity failure talking to an Azure endpoint.
    Network { endpoint: Option<String> },
    /// Throttled (HTTP 429).  `retry_after` is in seconds.
    RateLimit { retry_after: Option<u64> },
    /// Missing or invalid server setup.
    Configuration { setting: Option<String> },
    /// Catch-all.
    Tool,
}

impl ToolErrorKind {
    /// Name reported in the `error` field of [`ToolError::to_dict`].
    pub fn name(&self) -> &'static str {
        match self {
            ToolErrorKind::Validation { .. } => "ValidationError",
            ToolErrorKind::NotFound => "NotFoundError",
            ToolErrorKind::Authentication => "AuthenticationError",
            ToolErrorKind::Authorization { .. } => "AuthorizationError",
            ToolErrorKind::AzureResource { .. } => "AzureResourceError",
            ToolErrorKind::Network { .. } => "NetworkError",
            ToolErrorKind::RateLimit { .. } => "RateLimitError",
            ToolErrorKind::Configuration { .. } => "ConfigurationError",
            ToolErrorKind::Tool => "ToolError",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
    pub code: Option<String>,
    pub details: Option<Map<String, Value>>,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            details: None,
        }
    }

    /// Generic tool failure.
    pub fn tool(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Tool, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Validation { field: None }, message)
    }

    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(
            ToolErrorKind::Validation {
                field: Some(field.into()),
            },
            message,
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Authentication, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Authorization { permission: None }, message)
    }

    pub fn azure_resource(
        message: impl Into<String>,
        resource_type: Option<String>,
        resource_name: Option<String>,
    ) -> Self {
        Self::new(
            ToolErrorKind::AzureResource {
                resource_type,
                resource_name,
            },
            message,
        )
    }

    pub fn network(message: impl Into<String>, endpoint: Option<String>) -> Self {
        Self::new(ToolErrorKind::Network { endpoint }, message)
    }

    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::new(ToolErrorKind::RateLimit { retry_after }, message)
    }

    pub fn configuration(message: impl Into<String>, setting: Option<&str>) -> Self {
        Self::new(
            ToolErrorKind::Configuration {
                setting: setting.map(str::to_string),
            },
            message,
        )
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    /// Serialize for the calling agent.
    ///
    /// `code`, `details` and the kind-specific fields are only present when set.
    pub fn to_dict(&self) -> Value {
        let mut out = Map::new();
        out.insert("error".into(), json!(self.kind.name()));
        out.insert("message".into(), json!(self.message));
        if let Some(code) = &self.code {
            out.insert("code".into(), json!(code));
        }
        if let Some(details) = &self.details {
            out.insert("details".into(), Value::Object(details.clone()));
        }

        match &self.kind {
            ToolErrorKind::Validation { field } => put_opt(&mut out, "field", field),
            ToolErrorKind::Authorization { permission } => {
                put_opt(&mut out, "permission", permission)
            }
            ToolErrorKind::AzureResource {
                resource_type,
                resource_name,
            } => {
                put_opt(&mut out, "resource_type", resource_type);
                put_opt(&mut out, "resource_name", resource_name);
            }
            ToolErrorKind::Network { endpoint } => put_opt(&mut out, "endpoint", endpoint),
            ToolErrorKind::Configuration { setting } => put_opt(&mut out, "setting", setting),
            ToolErrorKind::RateLimit { retry_after } => {
                if let Some(secs) = retry_after {
                    out.insert("retry_after".into(), json!(secs));
                }
            }
            ToolErrorKind::NotFound | ToolErrorKind::Authentication | ToolErrorKind::Tool => {}
        }

        Value::Object(out)
    }
}

fn put_opt(out: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        out.insert(key.to_string(), json!(v));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_error_has_no_code_or_details() {
        let err = ToolError::tool("Test error");
        assert_eq!(err.to_string(), "Test error");
        assert!(err.code.is_none());
        assert!(err.details.is_none());
    }

    #[test]
    fn to_dict_includes_code_and_details() {
        let err = ToolError::tool("Test")
            .with_code("CODE")
            .with_detail("key", "val");
        let d = err.to_dict();
        assert_eq!(d["error"], "ToolError");
        assert_eq!(d["message"], "Test");
        assert_eq!(d["code"], "CODE");
        assert_eq!(d["details"], json!({ "key": "val" }));
    }

    #[test]
    fn validation_error_reports_field() {
        let d = ToolError::validation_field("Invalid input", "name").to_dict();
        assert_eq!(d["error"], "ValidationError");
        assert_eq!(d["field"], "name");
    }

    #[test]
    fn rate_limit_error_reports_retry_after() {
        let d = ToolError::rate_limit("Too many requests", Some(60)).to_dict();
        assert_eq!(d["error"], "RateLimitError");
        assert_eq!(d["retry_after"], 60);

        let d = ToolError::rate_limit("Too many requests", None).to_dict();
        assert!(d.get("retry_after").is_none());
    }

    #[test]
    fn resource_and_network_fields_serialize() {
        let d = ToolError::azure_resource(
            "Not ready",
            Some("Microsoft.Storage/storageAccounts".into()),
            Some("myaccount".into()),
        )
        .to_dict();
        assert_eq!(d["resource_type"], "Microsoft.Storage/storageAccounts");
        assert_eq!(d["resource_name"], "myaccount");

        let d = ToolError::network("Connection failed", Some("https://example.com".into()))
            .to_dict();
        assert_eq!(d["error"], "NetworkError");
        assert_eq!(d["endpoint"], "https://example.com");
    }

    #[test]
    fn optional_fields_are_omitted() {
        let d = ToolError::authentication("Auth failed").to_dict();
        let obj = d.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(d["error"], "AuthenticationError");
    }
}
