//! Adapter metrics

use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static::lazy_static! {
    pub static ref PROVIDER_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "payment_provider_requests_total",
        "Total payment provider requests",
        &["provider", "operation", "status"]
    )
    .unwrap();

    pub static ref PROVIDER_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "payment_provider_request_duration_seconds",
        "Payment provider request duration",
        &["provider", "operation"]
    )
    .unwrap();

    pub static ref WEBHOOK_VERIFICATIONS_TOTAL: CounterVec = register_counter_vec!(
        "payment_webhook_verifications_total",
        "Webhook signature verifications",
        &["outcome"]
    )
    .unwrap();
}
