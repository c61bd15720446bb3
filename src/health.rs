use crate::apis::ProviderRegistry;
use crate::common::bounded::bounded_probe;
use crate::common::constants::{DEGRADED_SUCCESS_RATE, HEALTHY_SUCCESS_RATE};
use crate::common::error::Result;
use crate::config::HealthConfig;
use crate::storage::CacheStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Ordered so that the worst status compares greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    /// Worst of all statuses; an empty set is healthy.
    pub fn worst<I: IntoIterator<Item = HealthStatus>>(statuses: I) -> HealthStatus {
        statuses.into_iter().max().unwrap_or(HealthStatus::Healthy)
    }

    pub fn for_success_rate(rate: f64) -> HealthStatus {
        if rate >= HEALTHY_SUCCESS_RATE {
            HealthStatus::Healthy
        } else if rate >= DEGRADED_SUCCESS_RATE {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Component {
    Cache,
    Providers,
    Collection,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::Cache, Component::Providers, Component::Collection];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Cache => "cache",
            Component::Providers => "providers",
            Component::Collection => "collection",
        }
    }
}

impl FromStr for Component {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cache" => Ok(Component::Cache),
            "providers" => Ok(Component::Providers),
            "collection" => Ok(Component::Collection),
            other => Err(format!(
                "Unknown component '{other}', expected one of: cache, providers, collection"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ComponentHealth {
    fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, detailed: bool, details: serde_json::Value) -> Self {
        if detailed {
            self.details = Some(details);
        }
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Combines cache, provider and collection checks into one report.
pub struct HealthAggregator {
    store: Arc<dyn CacheStore>,
    providers: ProviderRegistry,
    config: HealthConfig,
    probe_timeout: Duration,
}

impl HealthAggregator {
    pub fn new(
        store: Arc<dyn CacheStore>,
        providers: ProviderRegistry,
        config: HealthConfig,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            store,
            providers,
            config,
            probe_timeout,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    pub async fn check_cache(&self, detailed: bool) -> ComponentHealth {
        if !bounded_probe("cache health check", self.probe_timeout, self.store.health_check()).await {
            return ComponentHealth::new(HealthStatus::Unhealthy, "Cache store is unreachable");
        }
        match self.store.get_cache_stats().await {
            Ok(stats) if stats.active_entries == 0 => ComponentHealth::new(
                HealthStatus::Degraded,
                "Cache store is reachable but holds no live entries",
            )
            .with_details(detailed, json!(stats)),
            Ok(stats) => ComponentHealth::new(
                HealthStatus::Healthy,
                format!(
                    "{} live entries covering {} slots",
                    stats.active_entries, stats.total_slots
                ),
            )
            .with_details(detailed, json!(stats)),
            Err(e) => ComponentHealth::new(HealthStatus::Unhealthy, format!("Cache stats failed: {e}")),
        }
    }

    pub async fn check_providers(&self, detailed: bool) -> ComponentHealth {
        let health = self.providers.probe_health(self.probe_timeout).await;
        let total = health.len();
        let reachable = health.values().filter(|ok| **ok).count();

        let status = match (reachable, total) {
            (_, 0) | (0, _) => HealthStatus::Unhealthy,
            (r, t) if r == t => HealthStatus::Healthy,
            _ => HealthStatus::Degraded,
        };
        let message = if total == 0 {
            "No providers configured".to_string()
        } else {
            format!("{reachable}/{total} providers reachable")
        };
        ComponentHealth::new(status, message).with_details(detailed, json!(health))
    }

    pub async fn check_collection(&self, detailed: bool) -> ComponentHealth {
        match self.collection_stats().await {
            Ok((rate, last_success, avg_ms)) => {
                let mut status = HealthStatus::for_success_rate(rate);
                let mut message = format!(
                    "{rate:.1}% success over the last {}h",
                    self.config.success_window_hours
                );
                let threshold = chrono::Duration::minutes(self.config.freshness_threshold_mins);
                let stale = last_success.map_or(true, |at| Utc::now() - at > threshold);
                if status == HealthStatus::Healthy && stale {
                    status = HealthStatus::Degraded;
                    message.push_str("; last successful collection is stale");
                }
                ComponentHealth::new(status, message).with_details(
                    detailed,
                    json!({
                        "successRate": rate,
                        "lastSuccessfulCollection": last_success,
                        "averageExecutionTimeMs": avg_ms,
                        "windowHours": self.config.success_window_hours,
                    }),
                )
            }
            Err(e) => ComponentHealth::new(
                HealthStatus::Unhealthy,
                format!("Collection log unavailable: {e}"),
            ),
        }
    }

    async fn collection_stats(&self) -> Result<(f64, Option<DateTime<Utc>>, f64)> {
        let window = self.config.success_window_hours;
        let rate = self.store.get_collection_success_rate(window).await?;
        let last_success = self.store.get_last_successful_collection().await?;
        let avg_ms = self.store.get_average_execution_time(window).await?;
        Ok((rate, last_success, avg_ms))
    }

    pub async fn component(&self, component: Component, detailed: bool) -> ComponentHealth {
        match component {
            Component::Cache => self.check_cache(detailed).await,
            Component::Providers => self.check_providers(detailed).await,
            Component::Collection => self.check_collection(detailed).await,
        }
    }

    /// Full report, or a single component when `only` is set.
    pub async fn report(&self, detailed: bool, only: Option<Component>) -> HealthReport {
        let components: Vec<Component> = match only {
            Some(c) => vec![c],
            None => Component::ALL.to_vec(),
        };

        let mut checked = BTreeMap::new();
        for component in components {
            let health = self.component(component, detailed).await;
            if health.status != HealthStatus::Healthy {
                warn!("Health component {} is {}: {}", component.as_str(), health.status.as_str(), health.message);
            }
            checked.insert(component.as_str().to_string(), health);
        }

        HealthReport {
            status: HealthStatus::worst(checked.values().map(|c| c.status)),
            timestamp: Utc::now(),
            components: checked,
        }
    }

    /// Produce a full detailed report and persist it as a snapshot.
    pub async fn snapshot(&self) -> Result<HealthReport> {
        let report = self.report(true, None).await;
        self.store
            .record_health_snapshot(report.status.as_str(), &json!(report))
            .await?;
        info!("Recorded health snapshot: {}", report.status.as_str());
        Ok(report)
    }
}
