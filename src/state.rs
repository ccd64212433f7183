use crate::application::resolver::HybridResolver;
use crate::domain::error::RegistryError;
use crate::domain::matcher::FuzzyMatcher;
use crate::domain::traits::RemoteTransport;
use crate::infrastructure::config::Config;
use crate::infrastructure::network::client::RemoteClient;
use crate::infrastructure::network::http::{create_client, HttpTransport};
use crate::infrastructure::network::rate_limit::RateLimiter;
use crate::infrastructure::storage::dataset::BulkDataset;
use std::sync::Arc;
use tracing::info;

/// Everything the core needs, built once by the caller and passed around
/// explicitly.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub limiter: Arc<RateLimiter>,
    pub remote: Arc<RemoteClient>,
    pub dataset: Arc<BulkDataset>,
    pub resolver: Arc<HybridResolver>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, RegistryError> {
        config.validate()?;
        let http_client = create_client(&config.remote)?;
        let transport: Arc<dyn RemoteTransport> =
            Arc::new(HttpTransport::new(http_client.clone(), &config.remote.base_url));
        let dataset = BulkDataset::from_config(
            &config.dataset,
            http_client,
            FuzzyMatcher::new(config.matcher.max_edit_distance),
        )?;
        Self::with_parts(config, transport, dataset)
    }

    /// Assembles the core around a given transport and dataset.
    pub fn with_parts(
        config: Config,
        transport: Arc<dyn RemoteTransport>,
        dataset: BulkDataset,
    ) -> Result<Self, RegistryError> {
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.max_requests_per_minute,
            config.rate_limit.mode,
        )?);
        let remote = Arc::new(RemoteClient::new(
            transport,
            limiter.clone(),
            config.cache.ttl(),
            config.cache.enabled,
            config.remote.clone(),
        ));
        let dataset = Arc::new(dataset);
        let resolver = Arc::new(HybridResolver::new(
            remote.clone(),
            dataset.clone(),
            config.batch.max_concurrent,
        ));

        Ok(Self {
            config: Arc::new(config),
            limiter,
            remote,
            dataset,
            resolver,
        })
    }

    /// Releases the loaded snapshot and cached responses.
    pub fn shutdown(&self) {
        self.dataset.unload();
        self.remote.clear_cache();
        info!("Core shut down");
    }
}
