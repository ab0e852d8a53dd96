//! Named channels and their queue policies.
//!
//! # Responsibilities
//! - Describe the five well-known channels (durability, TTL, max length)
//! - Apply configuration overrides to the built-in policies
//! - Provision every channel against a broker provider
//!
//! # Design Decisions
//! - The registry is immutable after construction; it is re-provisioned on every connect
//! - One failing declare never aborts the others

use std::collections::BTreeMap;

use crate::broker::BrokerProvider;
use crate::config::schema::{ChannelOverride, ChannelsConfig};
use crate::observability::metrics;

const HOUR_MS: u64 = 60 * 60 * 1000;
const DAY_MS: u64 = 24 * HOUR_MS;

/// The well-known channels every service publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelKind {
    Log,
    Metrics,
    Events,
    BusinessEvents,
    Performance,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 5] = [
        ChannelKind::Log,
        ChannelKind::Metrics,
        ChannelKind::Events,
        ChannelKind::BusinessEvents,
        ChannelKind::Performance,
    ];

    pub fn default_name(&self) -> &'static str {
        match self {
            ChannelKind::Log => "log-messages",
            ChannelKind::Metrics => "metrics",
            ChannelKind::Events => "events",
            ChannelKind::BusinessEvents => "business-events",
            ChannelKind::Performance => "performance",
        }
    }
}

/// Queue declaration policy for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub durable: bool,
    /// Message time-to-live (`x-message-ttl`).
    pub ttl_millis: u64,
    /// Queue length bound (`x-max-length`).
    pub max_length: u64,
    pub auto_delete: bool,
}

impl ChannelSpec {
    /// Built-in policy for a channel.
    pub fn well_known(kind: ChannelKind) -> Self {
        let (ttl_millis, max_length) = match kind {
            ChannelKind::Log => (DAY_MS, 10_000),
            ChannelKind::Metrics => (7 * DAY_MS, 50_000),
            ChannelKind::Events => (30 * DAY_MS, 100_000),
            ChannelKind::BusinessEvents => (7 * DAY_MS, 25_000),
            ChannelKind::Performance => (DAY_MS, 15_000),
        };
        Self {
            name: kind.default_name().to_string(),
            durable: true,
            ttl_millis,
            max_length,
            auto_delete: false,
        }
    }

    fn with_override(mut self, o: &ChannelOverride) -> Self {
        if let Some(name) = o.name.as_ref().filter(|n| !n.is_empty()) {
            self.name = name.clone();
        }
        if let Some(ttl) = o.ttl_millis {
            self.ttl_millis = ttl;
        }
        if let Some(max) = o.max_length {
            self.max_length = max;
        }
        self
    }
}

/// Result of provisioning every channel once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub declared: Vec<String>,
    pub failed: Vec<String>,
}

impl ProvisionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The fixed set of channels a service publishes to.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    specs: BTreeMap<ChannelKind, ChannelSpec>,
}

impl ChannelRegistry {
    pub fn well_known() -> Self {
        Self {
            specs: ChannelKind::ALL
                .into_iter()
                .map(|kind| (kind, ChannelSpec::well_known(kind)))
                .collect(),
        }
    }

    pub fn from_config(config: &ChannelsConfig) -> Self {
        let override_for = |kind: ChannelKind| match kind {
            ChannelKind::Log => &config.log,
            ChannelKind::Metrics => &config.metrics,
            ChannelKind::Events => &config.events,
            ChannelKind::BusinessEvents => &config.business_events,
            ChannelKind::Performance => &config.performance,
        };
        Self {
            specs: ChannelKind::ALL
                .into_iter()
                .map(|kind| {
                    let spec = ChannelSpec::well_known(kind).with_override(override_for(kind));
                    (kind, spec)
                })
                .collect(),
        }
    }

    pub fn spec(&self, kind: ChannelKind) -> &ChannelSpec {
        // every kind is inserted at construction
        &self.specs[&kind]
    }

    /// Queue name a channel resolves to.
    pub fn name(&self, kind: ChannelKind) -> &str {
        &self.spec(kind).name
    }

    pub fn specs(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.specs.values()
    }

    /// Declare every channel. Failures are logged and reported, never propagated.
    pub async fn provision(&self, provider: &dyn BrokerProvider) -> ProvisionReport {
        let mut report = ProvisionReport::default();

        for spec in self.specs() {
            let ok = provider.create_queue(&spec.name, spec).await;
            metrics::record_provision(&spec.name, ok);
            if ok {
                tracing::debug!(queue = %spec.name, ttl_ms = spec.ttl_millis, max_length = spec.max_length, "Channel declared");
                report.declared.push(spec.name.clone());
            } else {
                tracing::warn!(queue = %spec.name, provider = provider.name(), "Channel declaration failed");
                report.failed.push(spec.name.clone());
            }
        }

        tracing::info!(
            declared = report.declared.len(),
            failed = report.failed.len(),
            "Channel provisioning finished"
        );
        report
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::well_known()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_policies() {
        let registry = ChannelRegistry::well_known();
        let log = registry.spec(ChannelKind::Log);
        assert_eq!(log.name, "log-messages");
        assert_eq!(log.ttl_millis, 86_400_000);
        assert_eq!(log.max_length, 10_000);

        let events = registry.spec(ChannelKind::Events);
        assert_eq!(events.ttl_millis, 2_592_000_000);
        assert_eq!(events.max_length, 100_000);

        assert_eq!(registry.spec(ChannelKind::Metrics).ttl_millis, 604_800_000);
        assert_eq!(registry.spec(ChannelKind::BusinessEvents).max_length, 25_000);
        assert_eq!(registry.spec(ChannelKind::Performance).max_length, 15_000);

        for spec in registry.specs() {
            assert!(spec.durable);
            assert!(!spec.auto_delete);
        }
        assert_eq!(registry.specs().count(), 5);
    }

    #[test]
    fn test_config_overrides() {
        let config = ChannelsConfig {
            metrics: ChannelOverride {
                name: Some("orders-metrics".to_string()),
                ttl_millis: None,
                max_length: Some(10),
            },
            ..Default::default()
        };
        let registry = ChannelRegistry::from_config(&config);

        let metrics = registry.spec(ChannelKind::Metrics);
        assert_eq!(metrics.name, "orders-metrics");
        assert_eq!(metrics.max_length, 10);
        assert_eq!(metrics.ttl_millis, 604_800_000);
        assert_eq!(registry.name(ChannelKind::Log), "log-messages");
    }
}
