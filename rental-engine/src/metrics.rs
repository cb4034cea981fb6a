//! Engine metrics

use prometheus::{register_counter_vec, register_int_counter, CounterVec, IntCounter};

lazy_static::lazy_static! {
    pub static ref TRANSITIONS_TOTAL: CounterVec = register_counter_vec!(
        "rental_transitions_total",
        "Transaction status transitions",
        &["from", "to", "origin"]
    )
    .unwrap();

    pub static ref PAYMENT_INTENTS_TOTAL: CounterVec = register_counter_vec!(
        "rental_payment_intents_total",
        "Payment intent creation attempts",
        &["outcome"]
    )
    .unwrap();

    pub static ref WEBHOOK_EVENTS_TOTAL: CounterVec = register_counter_vec!(
        "rental_webhook_events_total",
        "Payment webhook events by type and outcome",
        &["event_type", "outcome"]
    )
    .unwrap();

    pub static ref CARBON_RECORDS_TOTAL: IntCounter = register_int_counter!(
        "rental_carbon_records_total",
        "Carbon records written"
    )
    .unwrap();

    pub static ref INSURANCE_EVENTS_TOTAL: CounterVec = register_counter_vec!(
        "rental_insurance_events_total",
        "Insurance policies and claims by action",
        &["action"]
    )
    .unwrap();

    pub static ref DISPUTES_TOTAL: CounterVec = register_counter_vec!(
        "rental_disputes_total",
        "Dispute lifecycle events",
        &["action"]
    )
    .unwrap();

    pub static ref NOTIFICATION_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "rental_notification_failures_total",
        "Notification sink failures (swallowed)",
        &["kind"]
    )
    .unwrap();
}
