//! Prometheus metrics for the folio services.
//!
//! Covers order dispatch, execution outcomes, channel reconnects, broker
//! submissions, loop cycles and risk exits.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, a fatal configuration error that should crash
//! at first use. These panics only occur during static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, register_int_gauge_vec,
    CounterVec, Encoder, Gauge, HistogramVec, IntGaugeVec, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Orders sent over the order channel.
/// Labels: kind (buy/sell), origin (primary/follow_up)
pub static ORDERS_DISPATCHED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "folio_orders_dispatched_total",
        "Orders sent over the order channel",
        &["kind", "origin"]
    )
    .unwrap()
});

/// Outcomes received or produced.
/// Labels: status (success/failed/pending)
pub static ORDER_OUTCOMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "folio_order_outcomes_total",
        "Order outcomes by status",
        &["status"]
    )
    .unwrap()
});

/// Order channel state (1 = connected).
pub static CHANNEL_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("folio_channel_connected", "Order channel state (1=connected)").unwrap()
});

/// Order channel reconnects.
/// Labels: reason (disconnect/connect_failed)
pub static CHANNEL_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "folio_channel_reconnect_total",
        "Order channel reconnects",
        &["reason"]
    )
    .unwrap()
});

/// Brokerage submission attempts.
/// Labels: result (accepted/rejected/transport_error/credential_error)
pub static BROKER_SUBMITS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "folio_broker_submits_total",
        "Brokerage submission attempts",
        &["result"]
    )
    .unwrap()
});

/// Loop cycles.
/// Labels: loop (decision/risk), result (ok/error/skipped)
pub static CYCLE_RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "folio_cycle_runs_total",
        "Scheduled loop cycles",
        &["loop", "result"]
    )
    .unwrap()
});

/// Supervisor restarts of a background loop.
/// Labels: loop (decision/risk)
pub static LOOP_RESTARTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "folio_loop_restarts_total",
        "Background loop restarts after failure",
        &["loop"]
    )
    .unwrap()
});

/// Consecutive aborted cycles per loop; 0 once a cycle succeeds.
/// Labels: loop (decision/risk)
pub static LOOP_FAILURE_STREAK: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "folio_loop_failure_streak",
        "Consecutive aborted cycles of a background loop",
        &["loop"]
    )
    .unwrap()
});

/// Risk exits issued.
/// Labels: trigger (stop_loss/take_profit)
pub static RISK_EXITS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "folio_risk_exits_total",
        "Full-exit sells issued by the risk monitor",
        &["trigger"]
    )
    .unwrap()
});

/// Dispatch round-trip latency in milliseconds.
pub static DISPATCH_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "folio_dispatch_latency_ms",
        "Order round-trip latency in milliseconds",
        &["status"],
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn order_dispatched(kind: &str, origin: &str) {
        ORDERS_DISPATCHED_TOTAL
            .with_label_values(&[kind, origin])
            .inc();
    }

    pub fn order_outcome(status: &str) {
        ORDER_OUTCOMES_TOTAL.with_label_values(&[status]).inc();
    }

    pub fn channel_connected() {
        CHANNEL_CONNECTED.set(1.0);
    }

    pub fn channel_disconnected() {
        CHANNEL_CONNECTED.set(0.0);
    }

    pub fn channel_reconnect(reason: &str) {
        CHANNEL_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn broker_submit(result: &str) {
        BROKER_SUBMITS_TOTAL.with_label_values(&[result]).inc();
    }

    pub fn cycle_run(loop_name: &str, result: &str) {
        CYCLE_RUNS_TOTAL.with_label_values(&[loop_name, result]).inc();
    }

    pub fn loop_restart(loop_name: &str) {
        LOOP_RESTARTS_TOTAL.with_label_values(&[loop_name]).inc();
    }

    pub fn loop_failure_streak(loop_name: &str, streak: u32) {
        LOOP_FAILURE_STREAK
            .with_label_values(&[loop_name])
            .set(i64::from(streak));
    }

    pub fn risk_exit(trigger: &str) {
        RISK_EXITS_TOTAL.with_label_values(&[trigger]).inc();
    }

    pub fn dispatch_latency(status: &str, latency_ms: f64) {
        DISPATCH_LATENCY_MS
            .with_label_values(&[status])
            .observe(latency_ms);
    }
}

/// Encode every registered metric in the Prometheus text format.
pub fn render() -> TelemetryResult<String> {
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut buffer)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_metrics() {
        Metrics::order_dispatched("buy", "primary");
        Metrics::broker_submit("accepted");
        Metrics::dispatch_latency("success", 42.0);

        let text = render().unwrap();
        assert!(text.contains("folio_orders_dispatched_total"));
        assert!(text.contains("folio_broker_submits_total"));
        assert!(text.contains("folio_dispatch_latency_ms_bucket"));

        Metrics::loop_failure_streak("render_test", 3);
        assert!(render().unwrap().contains("folio_loop_failure_streak{loop=\"render_test\"} 3"));
    }

    #[test]
    fn test_channel_gauge() {
        Metrics::channel_connected();
        assert_eq!(CHANNEL_CONNECTED.get(), 1.0);
        Metrics::channel_disconnected();
        assert_eq!(CHANNEL_CONNECTED.get(), 0.0);
    }
}
