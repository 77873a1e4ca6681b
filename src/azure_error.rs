//! Classification of Azure SDK and REST failures, and the mapping from those
//! failures onto [`ToolError`].
//!
//! Failures are first turned into an [`AzureFailure`] at the call site (from an
//! `azure_core::Error`, a `reqwest::Error`, or a non-success HTTP response).
//! [`handle_azure_error`] is then a plain match over that enum.  It never
//! retries and never performs I/O.

use azure_core::error::ErrorKind;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;

use crate::error::ToolError;

pub type AzureResult<T> = Result<T, AzureFailure>;

/// Hint appended to authentication failures.
const LOGIN_HINT: &str = "Please run 'az login' to sign in";

/// Outcome of a failed Azure call, classified by shape.
#[derive(Debug)]
pub enum AzureFailure {
    /// Already a typed tool error; passed through untouched.
    Typed(ToolError),
    /// The target resource does not exist (HTTP 404 or SDK equivalent).
    NotFound { message: String },
    /// Token acquisition failed or the token was rejected (HTTP 401).
    Authentication { message: String },
    /// Any other HTTP failure.
    Http {
        status: u16,
        code: Option<String>,
        message: String,
        retry_after: Option<String>,
    },
    /// The endpoint could not be reached.
    Network {
        message: String,
        endpoint: Option<String>,
    },
    /// Anything else.
    Other(String),
}

impl AzureFailure {
    /// Classify an HTTP status.  404 and 401 get their own shapes.
    pub fn from_status(
        status: u16,
        code: Option<String>,
        message: impl Into<String>,
        retry_after: Option<String>,
    ) -> Self {
        let message = message.into();
        match status {
            404 => AzureFailure::NotFound { message },
            401 => AzureFailure::Authentication { message },
            _ => AzureFailure::Http {
                status,
                code,
                message,
                retry_after,
            },
        }
    }

    /// Build a failure from a non-success HTTP response, reading the
    /// `Retry-After` header and the Azure error envelope from the body.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();

        let (code, message) = parse_error_body(&body);
        let message = message.unwrap_or_else(|| {
            let reason = status.canonical_reason().unwrap_or("request failed");
            if body.trim().is_empty() {
                format!("{} {} ({url})", status.as_u16(), reason)
            } else {
                format!("{} {}: {}", status.as_u16(), reason, body.trim())
            }
        });

        Self::from_status(status.as_u16(), code, message, retry_after)
    }
}

/// Extract `(code, message)` from the common Azure error envelopes:
/// ARM / Graph `{"error": {"code", "message"}}` and data planes `{"code", "message"}`.
fn parse_error_body(body: &str) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return (None, None);
    };
    let envelope = value.get("error").filter(|e| e.is_object()).unwrap_or(&value);
    let text = |keys: [&str; 2]| {
        keys.iter()
            .find_map(|k| envelope.get(*k))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    (text(["code", "Code"]), text(["message", "Message"]))
}

impl From<ToolError> for AzureFailure {
    fn from(err: ToolError) -> Self {
        AzureFailure::Typed(err)
    }
}

impl From<azure_core::Error> for AzureFailure {
    fn from(err: azure_core::Error) -> Self {
        match err.kind() {
            ErrorKind::HttpResponse {
                status, error_code, ..
            } => AzureFailure::from_status(
                u16::from(*status),
                error_code.clone(),
                err.to_string(),
                None,
            ),
            ErrorKind::Credential => AzureFailure::Authentication {
                message: err.to_string(),
            },
            ErrorKind::Io => AzureFailure::Network {
                message: err.to_string(),
                endpoint: None,
            },
            _ => AzureFailure::Other(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for AzureFailure {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err.url().map(|u| u.to_string());
        if err.is_connect() || err.is_timeout() || err.is_request() {
            return AzureFailure::Network {
                message: err.to_string(),
                endpoint,
            };
        }
        if let Some(status) = err.status() {
            return AzureFailure::from_status(status.as_u16(), None, err.to_string(), None);
        }
        AzureFailure::Other(err.to_string())
    }
}

fn with_resource(resource: Option<&str>, message: &str) -> String {
    match resource {
        Some(r) => format!("{r}: {message}"),
        None => message.to_string(),
    }
}

/// Map a classified failure onto the tool error taxonomy.
///
/// Precedence: already-typed, not found, authentication, HTTP status,
/// network, fallback.  `resource` names what was being accessed and is
/// folded into the message for not-found and unrecognised failures.
pub fn handle_azure_error(failure: impl Into<AzureFailure>, resource: Option<&str>) -> ToolError {
    match failure.into() {
        AzureFailure::Typed(err) => err,
        AzureFailure::NotFound { message } => match resource {
            Some(r) => ToolError::not_found(format!("{r} not found: {message}")),
            None => ToolError::not_found(message),
        },
        AzureFailure::Authentication { message } => ToolError::authentication(format!(
            "Authentication failed. {LOGIN_HINT}. Details: {message}"
        )),
        AzureFailure::Http {
            status: 403,
            code,
            message,
            ..
        } => {
            let err = ToolError::authorization(with_resource(resource, &message));
            match code {
                Some(code) => err.with_code(code),
                None => err,
            }
        }
        AzureFailure::Http {
            status: 429,
            message,
            retry_after,
            ..
        } => {
            let retry_after = retry_after.and_then(|v| v.trim().parse::<u64>().ok());
            ToolError::rate_limit(with_resource(resource, &message), retry_after)
        }
        AzureFailure::Http {
            status,
            code,
            message,
            ..
        } => ToolError::tool(with_resource(resource, &message))
            .with_detail("status", status)
            .with_detail("azure_error", code.map(Value::String).unwrap_or(Value::Null)),
        AzureFailure::Network { message, endpoint } => {
            ToolError::network(format!("Azure service unavailable: {message}"), endpoint)
        }
        AzureFailure::Other(message) => ToolError::tool(with_resource(resource, &message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolErrorKind;

    fn http(status: u16, retry_after: Option<&str>) -> AzureFailure {
        AzureFailure::from_status(
            status,
            Some("SomeCode".into()),
            "upstream said no",
            retry_after.map(str::to_string),
        )
    }

    #[test]
    fn typed_error_passes_through_unchanged() {
        let original = ToolError::validation_field("Test", "name").with_code("X1");
        let result = handle_azure_error(original.clone(), Some("Storage Account"));
        assert_eq!(result, original);
    }

    #[test]
    fn not_found_prefixes_resource() {
        let err = handle_azure_error(http(404, None), Some("Storage Account"));
        assert_eq!(err.kind, ToolErrorKind::NotFound);
        assert!(err.message.starts_with("Storage Account not found"));
    }

    #[test]
    fn unauthorized_maps_to_authentication_with_hint() {
        let err = handle_azure_error(http(401, None), None);
        assert_eq!(err.kind, ToolErrorKind::Authentication);
        assert!(err.message.contains("az login"));
    }

    #[test]
    fn forbidden_maps_to_authorization() {
        let err = handle_azure_error(http(403, None), None);
        assert_eq!(err.kind_name(), "AuthorizationError");
        assert_eq!(err.code.as_deref(), Some("SomeCode"));
    }

    #[test]
    fn throttled_parses_retry_after() {
        let err = handle_azure_error(http(429, Some("30")), None);
        assert_eq!(err.kind, ToolErrorKind::RateLimit { retry_after: Some(30) });
    }

    #[test]
    fn non_numeric_retry_after_is_absent() {
        let err = handle_azure_error(http(429, Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
        assert_eq!(err.kind, ToolErrorKind::RateLimit { retry_after: None });
    }

    #[test]
    fn other_status_carries_upstream_code() {
        let err = handle_azure_error(http(500, None), None);
        assert_eq!(err.kind, ToolErrorKind::Tool);
        let details = err.details.unwrap();
        assert_eq!(details["azure_error"], "SomeCode");
        assert_eq!(details["status"], 500);
    }

    #[test]
    fn network_failure_maps_to_network_error() {
        let err = handle_azure_error(
            AzureFailure::Network {
                message: "connection refused".into(),
                endpoint: Some("https://management.azure.com".into()),
            },
            None,
        );
        assert_eq!(
            err.kind,
            ToolErrorKind::Network {
                endpoint: Some("https://management.azure.com".into())
            }
        );
    }

    #[test]
    fn unknown_failure_keeps_message_and_resource() {
        let err = handle_azure_error(
            AzureFailure::Other("Something went wrong".into()),
            Some("Storage Account"),
        );
        assert_eq!(err.kind, ToolErrorKind::Tool);
        assert_eq!(err.message, "Storage Account: Something went wrong");
    }

    #[test]
    fn credential_error_is_authentication_shaped() {
        let sdk = azure_core::Error::new(ErrorKind::Credential, "no credential available");
        let err = handle_azure_error(sdk, None);
        assert_eq!(err.kind, ToolErrorKind::Authentication);
    }

    #[test]
    fn error_body_envelopes_are_parsed() {
        let (code, message) =
            parse_error_body(r#"{"error":{"code":"AuthorizationFailed","message":"nope"}}"#);
        assert_eq!(code.as_deref(), Some("AuthorizationFailed"));
        assert_eq!(message.as_deref(), Some("nope"));

        let (code, message) = parse_error_body(r#"{"code":"BadRequest","message":"bad"}"#);
        assert_eq!(code.as_deref(), Some("BadRequest"));
        assert_eq!(message.as_deref(), Some("bad"));

        assert_eq!(parse_error_body("<html/>"), (None, None));
    }

    #[tokio::test]
    async fn throttled_response_is_classified_from_headers() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/throttled")
            .with_status(429)
            .with_header("Retry-After", "30")
            .with_body(r#"{"error":{"code":"TooManyRequests","message":"slow down"}}"#)
            .create_async()
            .await;

        let response = reqwest::get(format!("{}/throttled", server.url()))
            .await
            .unwrap();
        let err = handle_azure_error(AzureFailure::from_response(response).await, None);

        assert_eq!(err.kind, ToolErrorKind::RateLimit { retry_after: Some(30) });
        assert_eq!(err.message, "slow down");
    }

    #[tokio::test]
    async fn missing_resource_response_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body(r#"{"error":{"code":"ResourceNotFound","message":"gone"}}"#)
            .create_async()
            .await;

        let response = reqwest::get(format!("{}/missing", server.url()))
            .await
            .unwrap();
        let err = handle_azure_error(AzureFailure::from_response(response).await, Some("Blob"));

        assert_eq!(err.kind, ToolErrorKind::NotFound);
        assert_eq!(err.message, "Blob not found: gone");
    }
}
