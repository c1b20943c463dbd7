//! Prometheus metrics for the disruption controller

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::Result;

/// Controller metrics, registered on a private registry
pub struct Metrics {
    registry: Registry,
    /// Events that produced a reconcile request, by kind
    pub events_enqueued: IntCounterVec,
    /// Events filtered out or dropped, by kind and reason
    pub events_skipped: IntCounterVec,
    /// Budget lifecycle outcomes, by action
    pub budget_actions: IntCounterVec,
    /// Monitor budget validation results, by outcome
    pub validations: IntCounterVec,
    /// Failed reconcile passes
    pub reconcile_errors: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let events_enqueued = IntCounterVec::new(
            Opts::new(
                "disruption_events_enqueued_total",
                "Watch events that produced a reconcile request",
            ),
            &["kind"],
        )?;
        let events_skipped = IntCounterVec::new(
            Opts::new(
                "disruption_events_skipped_total",
                "Watch events that did not produce a reconcile request",
            ),
            &["kind", "reason"],
        )?;
        let budget_actions = IntCounterVec::new(
            Opts::new(
                "disruption_budget_actions_total",
                "Outcomes of monitor disruption budget reconciliation",
            ),
            &["action"],
        )?;
        let validations = IntCounterVec::new(
            Opts::new(
                "disruption_budget_validations_total",
                "Monitor budget consistency checks against the quorum size",
            ),
            &["outcome"],
        )?;
        let reconcile_errors = IntCounter::new(
            "disruption_reconcile_errors_total",
            "Reconcile passes that returned an error",
        )?;

        registry.register(Box::new(events_enqueued.clone()))?;
        registry.register(Box::new(events_skipped.clone()))?;
        registry.register(Box::new(budget_actions.clone()))?;
        registry.register(Box::new(validations.clone()))?;
        registry.register(Box::new(reconcile_errors.clone()))?;

        Ok(Self {
            registry,
            events_enqueued,
            events_skipped,
            budget_actions,
            validations,
            reconcile_errors,
        })
    }

    /// Encode all metrics in the text exposition format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::error::Error::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        let metrics = Metrics::new().unwrap();
        metrics.events_enqueued.with_label_values(&["Deployment"]).inc();
        metrics.budget_actions.with_label_values(&["created"]).inc();
        metrics.validations.with_label_values(&["invalid"]).inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("disruption_events_enqueued_total{kind=\"Deployment\"} 1"));
        assert!(text.contains("disruption_budget_actions_total{action=\"created\"} 1"));
        assert!(text.contains("disruption_budget_validations_total{outcome=\"invalid\"} 1"));
    }
}
