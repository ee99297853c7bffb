//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Request outcomes and latency per remote address
//! - Retries and reconnect attempts
//! - Reconnect rate limiting
//! - Transport event fan-out
//! - Journal decode failures
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `journal_rpc_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! No recorder is installed by this crate; without one every call is a no-op.
//!
//! # Usage
//!
//! ```rust,no_run
//! use journal_rpc::metrics;
//! use std::time::Duration;
//!
//! metrics::record_request("10.0.0.2:7000", "sync", "success");
//! metrics::record_sync_latency("10.0.0.2:7000", 2, Duration::from_millis(12));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record the outcome of a transport call (`sync`, `async`, `oneway`, `acknowledge`).
pub fn record_request(address: &str, mode: &'static str, outcome: &str) {
    counter!(
        "journal_rpc_requests_total",
        "address" => address.to_string(),
        "mode" => mode,
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record end-to-end latency of a `sync` call, retries included.
pub fn record_sync_latency(address: &str, attempts: usize, duration: Duration) {
    histogram!("journal_rpc_sync_duration_seconds", "address" => address.to_string())
        .record(duration.as_secs_f64());
    histogram!("journal_rpc_sync_attempts", "address" => address.to_string())
        .record(attempts as f64);
}

/// Record a retried attempt, labelled by the fault that caused it.
pub fn record_retry(address: &str, reason: &'static str) {
    counter!("journal_rpc_retries_total", "address" => address.to_string(), "reason" => reason)
        .increment(1);
}

/// Record a reconnect attempt and how long it took.
pub fn record_reconnect(address: &str, success: bool, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    counter!("journal_rpc_reconnects_total", "address" => address.to_string(), "status" => status)
        .increment(1);
    histogram!("journal_rpc_reconnect_duration_seconds", "address" => address.to_string())
        .record(duration.as_secs_f64());
}

/// Record a reconnect request refused because the retry delay has not elapsed.
pub fn record_reconnect_rate_limited(address: &str) {
    counter!("journal_rpc_reconnect_rate_limited_total", "address" => address.to_string())
        .increment(1);
}

/// Set the number of consecutive failed reconnects for an address.
pub fn set_reconnect_failures(address: &str, failures: usize) {
    gauge!("journal_rpc_reconnect_failures", "address" => address.to_string())
        .set(failures as f64);
}

/// Record reconnect state (Live=0, Checking=1, Reconnecting=2, Failed=3).
pub fn set_reconnect_state(address: &str, state: &str) {
    let value = match state {
        "live" => 0.0,
        "checking" => 1.0,
        "reconnecting" => 2.0,
        "failed" => 3.0,
        _ => -1.0,
    };
    gauge!("journal_rpc_reconnect_state", "address" => address.to_string()).set(value);
}

/// Record a transport event publication and how many subscribers received it.
pub fn record_event_published(event_type: &'static str, receivers: usize) {
    counter!("journal_rpc_events_published_total", "event_type" => event_type).increment(1);
    if receivers == 0 {
        counter!("journal_rpc_events_unobserved_total", "event_type" => event_type).increment(1);
    }
}

/// Record a stale connection that failed to stop cleanly.
pub fn record_stop_failure(address: &str) {
    counter!("journal_rpc_stop_failures_total", "address" => address.to_string()).increment(1);
}

/// Record a journal entry that failed to decode.
pub fn record_journal_decode_error(kind: &'static str) {
    counter!("journal_rpc_journal_decode_errors_total", "kind" => kind).increment(1);
}

/// Record the result of scanning a journal buffer.
pub fn record_journal_scan(entries: usize, valid_bytes: usize, clean: bool) {
    counter!("journal_rpc_journal_entries_scanned_total").increment(entries as u64);
    histogram!("journal_rpc_journal_scan_bytes").record(valid_bytes as f64);
    if !clean {
        counter!("journal_rpc_journal_scan_stopped_total").increment(1);
    }
}
