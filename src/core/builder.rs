use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    core::Config,
    events::Bus,
    metrics::MetricsCounters,
    subscribers::{Subscribe, SubscriberSet},
};

use super::{
    gateway::Gateway, query::QueryHandle, reconciler::Reconciler, registry::Registry,
    service::StateService,
};

/// Builder for a [`StateService`] with optional features.
pub struct ServiceBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    metrics: Option<Arc<MetricsCounters>>,
}

impl ServiceBuilder {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            metrics: None,
        }
    }

    /// Sets notice subscribers.
    ///
    /// Subscribers are driven by dedicated workers, so building with a
    /// non-empty list requires a Tokio runtime.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Shares existing counters instead of creating fresh ones.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCounters>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the service:
    /// - notice bus and registry
    /// - reconciler bound to a child of the service token
    /// - gateway and detached query handle
    /// - subscriber workers and their bus listener (if any subscribers)
    pub fn build(self) -> Arc<StateService> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let token = CancellationToken::new();
        let registry = Registry::shared(&self.cfg);
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(MetricsCounters::new()));

        let reconciler = Reconciler::new(
            Arc::clone(&registry),
            bus.clone(),
            self.cfg.grace_delay(),
            token.child_token(),
        );
        let gateway = Gateway::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            bus.clone(),
            Arc::clone(&reconciler),
        );
        let query = QueryHandle::new(Arc::downgrade(&registry));
        let subs = (!self.subscribers.is_empty())
            .then(|| Arc::new(SubscriberSet::new(self.subscribers, bus.clone())));

        let svc = Arc::new(StateService::new_internal(
            self.cfg, bus, registry, metrics, gateway, reconciler, query, subs, token,
        ));
        svc.subscriber_listener();
        svc
    }
}
