use super::ProviderAdapter;
use crate::apis::playtomic::PlaytomicAdapter;
use crate::common::bounded::bounded_probe;
use crate::common::constants::PLAYTOMIC_PROVIDER;
use crate::config::PlaytomicConfig;
use crate::domain::Sport;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub name: String,
    pub supported_sports: Vec<Sport>,
}

/// The configured set of provider adapters, constructed once at startup.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self { adapters }
    }

    /// Build the registry from configuration. Unknown names are ignored with a warning.
    pub fn from_names(names: &[String], playtomic: &PlaytomicConfig) -> Self {
        let adapters = names
            .iter()
            .filter_map(|name| create_adapter(name, playtomic))
            .collect();
        Self { adapters }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.iter().find(|a| a.name() == name).cloned()
    }

    /// First adapter that serves `sport`
    pub fn for_sport(&self, sport: Sport) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.iter().find(|a| a.supports(sport)).cloned()
    }

    pub fn supports(&self, sport: Sport) -> bool {
        self.adapters.iter().any(|a| a.supports(sport))
    }

    pub fn names_for_sport(&self, sport: Sport) -> Vec<String> {
        self.adapters
            .iter()
            .filter(|a| a.supports(sport))
            .map(|a| a.name().to_string())
            .collect()
    }

    pub fn adapters(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.adapters
    }

    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.adapters
            .iter()
            .map(|a| ProviderDescriptor {
                name: a.name().to_string(),
                supported_sports: a.supported_sports().to_vec(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Probe every adapter concurrently. A timed-out or panicked probe reads as false.
    pub async fn probe_health(&self, limit: Duration) -> BTreeMap<String, bool> {
        let handles: Vec<_> = self
            .adapters
            .iter()
            .map(|adapter| {
                let adapter = adapter.clone();
                let name = adapter.name();
                let handle = tokio::spawn(async move {
                    bounded_probe("provider health check", limit, adapter.health_check()).await
                });
                (name, handle)
            })
            .collect();

        let mut health = BTreeMap::new();
        for (name, handle) in handles {
            health.insert(name.to_string(), handle.await.unwrap_or(false));
        }
        health
    }
}

/// Factory function to create adapters by provider name
pub fn create_adapter(name: &str, playtomic: &PlaytomicConfig) -> Option<Arc<dyn ProviderAdapter>> {
    match name {
        PLAYTOMIC_PROVIDER => Some(Arc::new(PlaytomicAdapter::new(playtomic.clone()))),
        other => {
            tracing::warn!("Unknown provider '{}' in configuration, skipping", other);
            None
        }
    }
}
