use anyhow::{bail, Context, Result};
use azure_core::credentials::Secret;

use crate::error::ToolError;

pub const DEFAULT_RESOURCE_MANAGER_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com";
pub const DEFAULT_LOG_ANALYTICS_ENDPOINT: &str = "https://api.loganalytics.io";
pub const DEFAULT_BING_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0";

/// Which authentication strategies go into the credential chain.
///
/// Selected with `AZURE_TOKEN_CREDENTIALS`:
/// - unset / `all`: service principal, managed identity, developer tool, Azure CLI
/// - `dev`: service principal, developer tool, Azure CLI
/// - `prod`: service principal, managed identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CredentialMode {
    #[default]
    All,
    Dev,
    Prod,
}

impl CredentialMode {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(CredentialMode::All),
            "dev" => Ok(CredentialMode::Dev),
            "prod" => Ok(CredentialMode::Prod),
            other => bail!(
                "Unsupported AZURE_TOKEN_CREDENTIALS value '{other}' \
                 (expected 'dev', 'prod' or 'all')"
            ),
        }
    }
}

/// Service principal and managed identity settings.
///
/// - `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`: when all three
///   are set the chain starts with a client-secret credential.
/// - `AZURE_CLIENT_ID` on its own selects a user-assigned managed identity.
#[derive(Debug, Clone, Default)]
pub struct CredentialSettings {
    pub mode: CredentialMode,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<Secret>,
}

impl CredentialSettings {
    /// True when the service-principal strategy can be built.
    pub fn has_service_principal(&self) -> bool {
        self.tenant_id.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }
}

/// Base URLs for the Azure planes the tools talk to.  Overridable for
/// sovereign clouds.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub resource_manager: String,
    pub graph: String,
    pub log_analytics: String,
    pub bing: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            resource_manager: DEFAULT_RESOURCE_MANAGER_ENDPOINT.into(),
            graph: DEFAULT_GRAPH_ENDPOINT.into(),
            log_analytics: DEFAULT_LOG_ANALYTICS_ENDPOINT.into(),
            bing: DEFAULT_BING_ENDPOINT.into(),
        }
    }
}

/// Default Azure Cosmos DB account.
///
/// - `COSMOS_ENDPOINT`, e.g. `https://myaccount.documents.azure.com:443/`
/// - `COSMOS_KEY`: optional account key.  Without it the credential chain is used.
/// - `COSMOS_DEFAULT_DATABASE`: database used when callers omit `database`.
#[derive(Debug, Clone)]
pub struct CosmosConfig {
    pub endpoint: String,
    pub key: Option<Secret>,
    pub default_database: Option<String>,
}

/// Top-level server configuration assembled from environment variables at startup.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub credentials: CredentialSettings,
    pub endpoints: Endpoints,
    pub cosmos: Option<CosmosConfig>,
    /// Tool groups to expose (`AZURE_MCP_GROUPS`); `None` exposes every group.
    pub enabled_groups: Option<Vec<String>>,
}

impl Config {
    /// Build configuration from the current process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode = match var("AZURE_TOKEN_CREDENTIALS") {
            Some(v) => CredentialMode::parse(&v).context("Invalid credential configuration")?,
            None => CredentialMode::default(),
        };
        let credentials = CredentialSettings {
            mode,
            tenant_id: var("AZURE_TENANT_ID"),
            client_id: var("AZURE_CLIENT_ID"),
            client_secret: var("AZURE_CLIENT_SECRET").map(Secret::from),
        };
        if credentials.has_service_principal() {
            tracing::info!("Service principal credentials found, trying them first");
        }

        let defaults = Endpoints::default();
        let endpoints = Endpoints {
            resource_manager: var("AZURE_RESOURCE_MANAGER_ENDPOINT")
                .unwrap_or(defaults.resource_manager),
            graph: var("AZURE_GRAPH_ENDPOINT").unwrap_or(defaults.graph),
            log_analytics: var("AZURE_LOG_ANALYTICS_ENDPOINT").unwrap_or(defaults.log_analytics),
            bing: var("BING_API_ENDPOINT").unwrap_or(defaults.bing),
        };

        let cosmos = var("COSMOS_ENDPOINT").map(|endpoint| {
            let key = var("COSMOS_KEY").map(Secret::from);
            if key.is_some() {
                tracing::info!("Cosmos DB endpoint + account key found, using key auth");
            } else {
                tracing::info!(
                    "COSMOS_ENDPOINT is set without COSMOS_KEY; \
                     Cosmos DB tools will authenticate with the credential chain"
                );
            }
            CosmosConfig {
                endpoint,
                key,
                default_database: var("COSMOS_DEFAULT_DATABASE"),
            }
        });

        let enabled_groups = var("AZURE_MCP_GROUPS").map(|groups| {
            groups
                .split(',')
                .map(|g| g.trim().to_ascii_lowercase())
                .filter(|g| !g.is_empty())
                .collect::<Vec<_>>()
        });

        Ok(Config {
            credentials,
            endpoints,
            cosmos,
            enabled_groups,
        })
    }

    /// Whether tools of `group` should be exposed.
    pub fn group_enabled(&self, group: &str) -> bool {
        match &self.enabled_groups {
            Some(groups) => groups.iter().any(|g| g == group),
            None => true,
        }
    }

    /// Resolve the Cosmos DB endpoint: explicit value first, then `COSMOS_ENDPOINT`.
    pub fn cosmos_endpoint(&self, explicit: Option<&str>) -> Result<String, ToolError> {
        explicit
            .map(str::to_string)
            .or_else(|| self.cosmos.as_ref().map(|c| c.endpoint.clone()))
            .ok_or_else(|| {
                ToolError::configuration(
                    "account_endpoint is required when COSMOS_ENDPOINT is not set",
                    Some("COSMOS_ENDPOINT"),
                )
            })
    }

    /// Resolve the Cosmos DB database: explicit value first, then `COSMOS_DEFAULT_DATABASE`.
    pub fn cosmos_database(&self, explicit: Option<&str>) -> Result<String, ToolError> {
        explicit
            .map(str::to_string)
            .or_else(|| {
                self.cosmos
                    .as_ref()
                    .and_then(|c| c.default_database.clone())
            })
            .ok_or_else(|| {
                ToolError::configuration(
                    "database parameter is required when COSMOS_DEFAULT_DATABASE is not set",
                    Some("COSMOS_DEFAULT_DATABASE"),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.credentials.mode, CredentialMode::All);
        assert!(!cfg.credentials.has_service_principal());
        assert_eq!(cfg.endpoints.resource_manager, DEFAULT_RESOURCE_MANAGER_ENDPOINT);
        assert!(cfg.cosmos.is_none());
        assert!(cfg.group_enabled("storage"));
    }

    #[test]
    fn credential_mode_is_parsed_case_insensitively() {
        let cfg = config_from(&[("AZURE_TOKEN_CREDENTIALS", "PROD")]).unwrap();
        assert_eq!(cfg.credentials.mode, CredentialMode::Prod);
        assert!(config_from(&[("AZURE_TOKEN_CREDENTIALS", "sometimes")]).is_err());
    }

    #[test]
    fn service_principal_requires_all_three_values() {
        let cfg = config_from(&[
            ("AZURE_TENANT_ID", "t"),
            ("AZURE_CLIENT_ID", "c"),
            ("AZURE_CLIENT_SECRET", "s"),
        ])
        .unwrap();
        assert!(cfg.credentials.has_service_principal());

        let cfg = config_from(&[("AZURE_CLIENT_ID", "c")]).unwrap();
        assert!(!cfg.credentials.has_service_principal());
    }

    #[test]
    fn secrets_are_not_debug_printed() {
        let cfg = config_from(&[
            ("AZURE_CLIENT_SECRET", "hunter2"),
            ("COSMOS_ENDPOINT", "https://example.documents.azure.com:443/"),
            ("COSMOS_KEY", "dGVzdGtleQ=="),
        ])
        .unwrap();
        let printed = format!("{cfg:?}");
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("dGVzdGtleQ=="));
    }

    #[test]
    fn cosmos_fallbacks() {
        let cfg = config_from(&[
            ("COSMOS_ENDPOINT", "https://example.documents.azure.com:443/"),
            ("COSMOS_DEFAULT_DATABASE", "mydb"),
        ])
        .unwrap();
        assert_eq!(cfg.cosmos_database(None).unwrap(), "mydb");
        assert_eq!(cfg.cosmos_database(Some("other")).unwrap(), "other");
        assert_eq!(
            cfg.cosmos_endpoint(None).unwrap(),
            "https://example.documents.azure.com:443/"
        );

        let bare = config_from(&[]).unwrap();
        let err = bare.cosmos_database(None).unwrap_err();
        assert_eq!(err.kind_name(), "ConfigurationError");
    }

    #[test]
    fn group_filter_is_normalised() {
        let cfg = config_from(&[("AZURE_MCP_GROUPS", " Storage, cosmos ,,")]).unwrap();
        assert!(cfg.group_enabled("storage"));
        assert!(cfg.group_enabled("cosmos"));
        assert!(!cfg.group_enabled("monitor"));
    }
}
