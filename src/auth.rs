//! Credential chain with per-tenant caching.
//!
//! [`CredentialProvider::get_credential`] builds a [`ChainedCredential`] the
//! first time a tenant is requested and hands out the same `Arc` afterwards.
//! Building a chain only assembles credential objects; no token is requested
//! until a caller asks for one.

use std::sync::Arc;

use async_trait::async_trait;
use azure_core::credentials::{AccessToken, TokenCredential, TokenRequestOptions};
use azure_core::error::ErrorKind;
use azure_identity::{
    AzureCliCredential, AzureCliCredentialOptions, AzureDeveloperCliCredential,
    AzureDeveloperCliCredentialOptions, ClientSecretCredential, ManagedIdentityCredential,
    ManagedIdentityCredentialOptions, UserAssignedId,
};
use dashmap::DashMap;
use tracing::debug;

use crate::config::{CredentialMode, CredentialSettings};

/// Cache key used when no tenant is given.
pub const DEFAULT_TENANT: &str = "default";

/// Tries each strategy in order and returns the first token obtained.
/// When every strategy fails the last failure is returned.
#[derive(Debug)]
pub struct ChainedCredential {
    sources: Vec<(&'static str, Arc<dyn TokenCredential>)>,
}

impl ChainedCredential {
    pub fn new(sources: Vec<(&'static str, Arc<dyn TokenCredential>)>) -> Self {
        Self { sources }
    }

    /// Strategy names in the order they are tried.
    pub fn strategies(&self) -> Vec<&'static str> {
        self.sources.iter().map(|(name, _)| *name).collect()
    }
}

#[async_trait]
impl TokenCredential for ChainedCredential {
    async fn get_token(
        &self,
        scopes: &[&str],
        options: Option<TokenRequestOptions<'_>>,
    ) -> azure_core::Result<AccessToken> {
        let mut last_error = None;
        for (name, source) in &self.sources {
            match source.get_token(scopes, options.clone()).await {
                Ok(token) => {
                    debug!(strategy = name, "acquired token");
                    return Ok(token);
                }
                Err(err) => {
                    debug!(strategy = name, error = %err, "credential strategy failed");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            azure_core::Error::new(
                ErrorKind::Credential,
                "no credential strategies are configured",
            )
        }))
    }
}

/// Builds and caches one credential chain per tenant.
#[derive(Debug)]
pub struct CredentialProvider {
    settings: CredentialSettings,
    credentials: DashMap<String, Arc<ChainedCredential>>,
}

impl CredentialProvider {
    pub fn new(settings: CredentialSettings) -> Self {
        Self {
            settings,
            credentials: DashMap::new(),
        }
    }

    /// Credential for `tenant` (or the default tenant), built on first use.
    pub fn get_credential(&self, tenant: Option<&str>) -> Arc<ChainedCredential> {
        let key = tenant.unwrap_or(DEFAULT_TENANT).to_string();
        self.credentials
            .entry(key)
            .or_insert_with(|| Arc::new(self.build_chain(tenant)))
            .clone()
    }

    /// Drop every cached chain; the next request rebuilds.
    pub fn clear_cache(&self) {
        self.credentials.clear();
    }

    pub fn cached_tenants(&self) -> usize {
        self.credentials.len()
    }

    fn build_chain(&self, tenant: Option<&str>) -> ChainedCredential {
        let tenant = tenant.map(str::to_string).or_else(|| self.settings.tenant_id.clone());
        let mode = self.settings.mode;
        let mut sources: Vec<(&'static str, Arc<dyn TokenCredential>)> = Vec::new();

        if let Some(source) = self.service_principal(tenant.as_deref()) {
            sources.push(("service_principal", source));
        }
        if mode != CredentialMode::Dev {
            let options = ManagedIdentityCredentialOptions {
                user_assigned_id: self.settings.client_id.clone().map(UserAssignedId::ClientId),
                ..Default::default()
            };
            push_built(
                &mut sources,
                "managed_identity",
                ManagedIdentityCredential::new(Some(options)),
            );
        }
        if mode != CredentialMode::Prod {
            let options = AzureDeveloperCliCredentialOptions {
                tenant_id: tenant.clone(),
                ..Default::default()
            };
            push_built(
                &mut sources,
                "developer_cli",
                AzureDeveloperCliCredential::new(Some(options)),
            );

            let options = AzureCliCredentialOptions {
                tenant_id: tenant.clone(),
                ..Default::default()
            };
            push_built(&mut sources, "azure_cli", AzureCliCredential::new(Some(options)));
        }

        let chain = ChainedCredential::new(sources);
        debug!(
            tenant = tenant.as_deref().unwrap_or(DEFAULT_TENANT),
            strategies = ?chain.strategies(),
            "built credential chain"
        );
        chain
    }

    fn service_principal(&self, tenant: Option<&str>) -> Option<Arc<dyn TokenCredential>> {
        if !self.settings.has_service_principal() {
            return None;
        }
        let tenant = tenant?;
        let client_id = self.settings.client_id.clone()?;
        let secret = self.settings.client_secret.clone()?;
        match ClientSecretCredential::new(tenant, client_id, secret, None) {
            Ok(credential) => Some(credential as Arc<dyn TokenCredential>),
            Err(err) => {
                debug!(error = %err, "skipping service principal credential");
                None
            }
        }
    }
}

fn push_built<C>(
    sources: &mut Vec<(&'static str, Arc<dyn TokenCredential>)>,
    name: &'static str,
    built: azure_core::Result<Arc<C>>,
) where
    C: TokenCredential + 'static,
{
    match built {
        Ok(credential) => sources.push((name, credential as Arc<dyn TokenCredential>)),
        Err(err) => debug!(strategy = name, error = %err, "skipping credential strategy"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Failing(&'static str);

    #[async_trait]
    impl TokenCredential for Failing {
        async fn get_token(
            &self,
            _scopes: &[&str],
            _options: Option<TokenRequestOptions<'_>>,
        ) -> azure_core::Result<AccessToken> {
            Err(azure_core::Error::new(ErrorKind::Credential, self.0))
        }
    }

    fn provider(mode: CredentialMode) -> CredentialProvider {
        CredentialProvider::new(CredentialSettings {
            mode,
            ..Default::default()
        })
    }

    #[test]
    fn same_tenant_returns_same_handle() {
        let provider = provider(CredentialMode::All);
        let a = provider.get_credential(Some("tenant-a"));
        let again = provider.get_credential(Some("tenant-a"));
        assert!(Arc::ptr_eq(&a, &again));
    }

    #[test]
    fn distinct_tenants_get_distinct_handles() {
        let provider = provider(CredentialMode::All);
        let a = provider.get_credential(Some("tenant-a"));
        let b = provider.get_credential(Some("tenant-b"));
        let default = provider.get_credential(None);
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &default));
        assert_eq!(provider.cached_tenants(), 3);
    }

    #[test]
    fn clear_cache_forces_rebuild() {
        let provider = provider(CredentialMode::All);
        let before = provider.get_credential(None);
        provider.clear_cache();
        let after = provider.get_credential(None);
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn mode_selects_strategies() {
        let all = provider(CredentialMode::All).get_credential(None).strategies();
        assert_eq!(all, vec!["managed_identity", "developer_cli", "azure_cli"]);

        let prod = provider(CredentialMode::Prod).get_credential(None).strategies();
        assert_eq!(prod, vec!["managed_identity"]);

        let dev = provider(CredentialMode::Dev).get_credential(None).strategies();
        assert_eq!(dev, vec!["developer_cli", "azure_cli"]);
    }

    #[test]
    fn service_principal_goes_first() {
        let provider = CredentialProvider::new(CredentialSettings {
            mode: CredentialMode::All,
            tenant_id: Some("00000000-0000-0000-0000-000000000001".into()),
            client_id: Some("00000000-0000-0000-0000-000000000002".into()),
            client_secret: Some("secret".to_string().into()),
        });
        let strategies = provider.get_credential(None).strategies();
        assert_eq!(strategies.first(), Some(&"service_principal"));
        assert_eq!(strategies.len(), 4);
    }

    #[tokio::test]
    async fn exhausted_chain_returns_last_failure() {
        let chain = ChainedCredential::new(vec![
            ("first", Arc::new(Failing("first failed"))),
            ("second", Arc::new(Failing("second failed"))),
        ]);
        let err = chain
            .get_token(&["https://management.azure.com/.default"], None)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Credential));
        assert!(err.to_string().contains("second failed"));
    }

    #[tokio::test]
    async fn empty_chain_is_a_credential_error() {
        let chain = ChainedCredential::new(Vec::new());
        let err = chain
            .get_token(&["https://management.azure.com/.default"], None)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Credential));
    }
}
