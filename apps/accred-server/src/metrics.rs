//! Prometheus metrics for accred-server.
//!
//! Exposes server metrics in Prometheus format at the `/metrics` endpoint.

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder and return a handle for rendering.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    describe_counter!(
        "accred_invite_transitions_total",
        "Invite lifecycle transitions by kind"
    );
    describe_counter!(
        "accred_campaign_recipients_total",
        "Campaign recipient outcomes of the send step"
    );

    handle
}

/// Record an invite lifecycle transition (created, viewed, accepted,
/// declined, extended, revoked).
pub fn record_invite_transition(kind: &'static str) {
    counter!("accred_invite_transitions_total", "kind" => kind).increment(1);
}

/// Record a campaign send outcome per recipient.
pub fn record_campaign_outcome(outcome: &'static str) {
    counter!("accred_campaign_recipients_total", "outcome" => outcome).increment(1);
}
