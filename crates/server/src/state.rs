use std::sync::Arc;

use streamvault_core::{Config, MetadataStore, ProviderClient, SanitizedConfig};

use crate::pipelines::Pipelines;

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<dyn MetadataStore>,
    pipelines: Arc<Pipelines>,
    providers: Vec<Arc<dyn ProviderClient>>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn MetadataStore>,
        pipelines: Arc<Pipelines>,
        providers: Vec<Arc<dyn ProviderClient>>,
    ) -> Self {
        Self {
            config,
            store,
            pipelines,
            providers,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn store(&self) -> &dyn MetadataStore {
        self.store.as_ref()
    }

    pub fn pipelines(&self) -> &Pipelines {
        &self.pipelines
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }
}
