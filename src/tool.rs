//! Tool contract shared by every tool family.
//!
//! Tools implement [`AzureTool`] with a typed `Options` struct. The blanket
//! [`DynTool`] impl turns that into an object-safe shape the registry and the
//! MCP handler can store and call with raw JSON arguments.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::context::AzureContext;
use crate::error::{ToolError, ToolResult};

/// Safety descriptor shown to the calling agent. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToolMetadata {
    pub read_only: bool,
    pub destructive: bool,
    pub idempotent: bool,
}

/// Tools that do not declare otherwise are assumed to be unsafe writes.
impl Default for ToolMetadata {
    fn default() -> Self {
        Self {
            read_only: false,
            destructive: true,
            idempotent: false,
        }
    }
}

impl ToolMetadata {
    /// List, get and query tools.
    pub const READ_ONLY: Self = Self {
        read_only: true,
        destructive: false,
        idempotent: true,
    };

    /// Writes that can be repeated safely (upserts, overwrites).
    pub const IDEMPOTENT_WRITE: Self = Self {
        read_only: false,
        destructive: false,
        idempotent: true,
    };

    /// Writes with a side effect each time they run (sending email).
    pub const WRITE: Self = Self {
        read_only: false,
        destructive: false,
        idempotent: false,
    };

    /// Deletes and destructive overwrites.
    pub const DESTRUCTIVE: Self = Self {
        read_only: false,
        destructive: true,
        idempotent: true,
    };

    /// Shape advertised to MCP clients.
    pub fn to_dict(&self) -> Value {
        json!({
            "readOnly": { "value": self.read_only },
            "destructive": { "value": self.destructive },
            "idempotent": { "value": self.idempotent },
        })
    }
}

/// A named operation with typed options.
///
/// Implementations hold no state; `Default` builds a fresh instance.
#[async_trait]
pub trait AzureTool: Send + Sync {
    type Options: DeserializeOwned + JsonSchema + Validate + Send;

    /// Stable identifier, `{family}_{resource}_{action}`.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::default()
    }

    async fn execute(&self, ctx: &AzureContext, options: Self::Options) -> ToolResult<Value>;
}

/// Object-safe view over an [`AzureTool`].
#[async_trait]
pub trait DynTool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn metadata(&self) -> ToolMetadata;

    /// JSON Schema of the options object.
    fn input_schema(&self) -> Value;

    /// Validate raw arguments, then execute.
    async fn run(&self, ctx: &AzureContext, raw: Map<String, Value>) -> ToolResult<Value>;
}

#[async_trait]
impl<T: AzureTool> DynTool for T {
    fn name(&self) -> &'static str {
        AzureTool::name(self)
    }

    fn description(&self) -> &'static str {
        AzureTool::description(self)
    }

    fn metadata(&self) -> ToolMetadata {
        AzureTool::metadata(self)
    }

    fn input_schema(&self) -> Value {
        options_schema::<T::Options>()
    }

    async fn run(&self, ctx: &AzureContext, raw: Map<String, Value>) -> ToolResult<Value> {
        let options = parse_options::<T::Options>(raw)?;
        AzureTool::execute(self, ctx, options).await
    }
}

/// Deserialize and validate raw options.
///
/// Every failure becomes a `ValidationError` whose message embeds the
/// underlying error text; `field` is set when the offending field is known.
pub fn parse_options<O>(raw: Map<String, Value>) -> ToolResult<O>
where
    O: DeserializeOwned + Validate,
{
    let options: O = serde_json::from_value(Value::Object(raw)).map_err(|err| {
        let message = format!("Invalid options: {err}");
        match serde_field(&err.to_string()) {
            Some(field) => ToolError::validation_field(message, field),
            None => ToolError::validation(message),
        }
    })?;

    options.validate().map_err(|errors| {
        let message = format!("Invalid options: {errors}");
        match first_invalid_field(&errors) {
            Some(field) => ToolError::validation_field(message, field),
            None => ToolError::validation(message),
        }
    })?;

    Ok(options)
}

/// Field named in a serde message such as ``missing field `value` ``.
fn serde_field(message: &str) -> Option<String> {
    let rest = message
        .strip_prefix("missing field `")
        .or_else(|| message.strip_prefix("unknown field `"))?;
    rest.split('`').next().map(str::to_string)
}

/// Direct fields win; otherwise descend into nested structs and lists so a
/// flattened option group reports its own field name.
fn first_invalid_field(errors: &ValidationErrors) -> Option<String> {
    if let Some(field) = errors.field_errors().keys().map(|k| k.to_string()).min() {
        return Some(field);
    }
    let mut nested: Vec<_> = errors.errors().iter().collect();
    nested.sort_by(|a, b| a.0.cmp(b.0));
    nested.into_iter().find_map(|(name, kind)| match kind {
        ValidationErrorsKind::Field(_) => Some(name.to_string()),
        ValidationErrorsKind::Struct(inner) => first_invalid_field(inner),
        ValidationErrorsKind::List(items) => items
            .values()
            .find_map(|inner| first_invalid_field(inner))
            .or_else(|| Some(name.to_string())),
    })
}

fn options_schema<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| json!({ "type": "object", "properties": {} }));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
    }
    schema
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ToolErrorKind;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema, Validate)]
    pub struct EchoOptions {
        /// Value echoed back.
        pub value: String,
        #[validate(range(min = 1, max = 10))]
        #[serde(default = "default_repeat")]
        pub repeat: u32,
    }

    fn default_repeat() -> u32 {
        1
    }

    #[derive(Default)]
    pub struct EchoTool;

    #[async_trait]
    impl AzureTool for EchoTool {
        type Options = EchoOptions;

        fn name(&self) -> &'static str {
            "test_echo_run"
        }

        fn description(&self) -> &'static str {
            "Echo the supplied value"
        }

        fn metadata(&self) -> ToolMetadata {
            ToolMetadata::READ_ONLY
        }

        async fn execute(&self, _ctx: &AzureContext, options: EchoOptions) -> ToolResult<Value> {
            Ok(json!({ "value": options.value.repeat(options.repeat as usize) }))
        }
    }

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn run_returns_execute_result() {
        let ctx = AzureContext::for_tests();
        let result = EchoTool.run(&ctx, raw(json!({ "value": "x" }))).await.unwrap();
        assert_eq!(result, json!({ "value": "x" }));
    }

    #[tokio::test]
    async fn missing_field_is_a_validation_error() {
        let ctx = AzureContext::for_tests();
        let err = EchoTool.run(&ctx, Map::new()).await.unwrap_err();
        assert_eq!(
            err.kind,
            ToolErrorKind::Validation {
                field: Some("value".into())
            }
        );
        assert!(err.message.contains("value"));
    }

    #[tokio::test]
    async fn out_of_range_is_a_validation_error() {
        let ctx = AzureContext::for_tests();
        let err = EchoTool
            .run(&ctx, raw(json!({ "value": "x", "repeat": 50 })))
            .await
            .unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
        assert_eq!(
            err.kind,
            ToolErrorKind::Validation {
                field: Some("repeat".into())
            }
        );
    }

    #[tokio::test]
    async fn wrong_type_is_a_validation_error() {
        let ctx = AzureContext::for_tests();
        let err = EchoTool
            .run(&ctx, raw(json!({ "value": 42 })))
            .await
            .unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
        assert!(err.message.starts_with("Invalid options:"));
    }

    #[test]
    fn schema_describes_options() {
        let schema = EchoTool.input_schema();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["value"].is_object());
        assert!(schema.get("$schema").is_none());
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("value")));
    }

    #[test]
    fn metadata_is_advertised() {
        let meta = DynTool::metadata(&EchoTool);
        assert_eq!(meta, ToolMetadata::READ_ONLY);
        assert_eq!(
            meta.to_dict(),
            json!({
                "readOnly": { "value": true },
                "destructive": { "value": false },
                "idempotent": { "value": true },
            })
        );
    }

    #[test]
    fn undeclared_metadata_is_conservative() {
        let meta = ToolMetadata::default();
        assert!(!meta.read_only);
        assert!(meta.destructive);
        assert!(!meta.idempotent);
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Window {
        #[validate(range(min = 1, max = 10))]
        top: u32,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct WindowedOptions {
        #[serde(flatten)]
        #[validate(nested)]
        window: Window,
        #[validate(length(min = 1))]
        query: String,
    }

    #[test]
    fn flattened_groups_report_their_own_field() {
        let err = parse_options::<WindowedOptions>(raw(json!({ "top": 50, "query": "q" })))
            .unwrap_err();
        assert_eq!(err.to_dict()["field"], "top");

        let err = parse_options::<WindowedOptions>(raw(json!({ "top": 50, "query": "" })))
            .unwrap_err();
        assert_eq!(err.to_dict()["field"], "query");
    }

    #[test]
    fn serde_field_extraction() {
        assert_eq!(serde_field("missing field `name`").as_deref(), Some("name"));
        assert_eq!(serde_field("invalid type: integer"), None);
    }
}
