use std::sync::Arc;

use crate::auth::CredentialProvider;
use crate::cache::TtlCache;
use crate::config::Config;

/// Everything a tool needs at execution time.
///
/// Cheap to clone; all shared state sits behind `Arc`s.
#[derive(Debug, Clone)]
pub struct AzureContext {
    pub config: Arc<Config>,
    pub credentials: Arc<CredentialProvider>,
    pub cache: Arc<TtlCache>,
    pub http: reqwest::Client,
}

impl AzureContext {
    pub fn new(config: Config) -> Self {
        let credentials = CredentialProvider::new(config.credentials.clone());
        Self {
            config: Arc::new(config),
            credentials: Arc::new(credentials),
            cache: Arc::new(TtlCache::new()),
            http: reqwest::Client::new(),
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::new(Config::default())
    }
}
