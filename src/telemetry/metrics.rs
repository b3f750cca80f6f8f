//! Metric instrument factories for sanus-node.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without one installed these are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("sanus-node")
}

/// Counter: captures accepted into the dispatch queue.
pub fn captures_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("sanus.captures.enqueued")
        .with_description("Captures accepted into the dispatch queue")
        .build()
}

/// Counter: per-person detection outcomes.
/// Labels: `outcome` ("no_face" | "unidentified" | "suppressed" | "accepted").
pub fn detections() -> Counter<u64> {
    meter()
        .u64_counter("sanus.detections")
        .with_description("Recognition results by outcome")
        .build()
}

/// Counter: abandoned recognition calls.
/// Labels: `call` ("entry" | "recheck"), `reason` ("timeout" | "error").
pub fn recognition_failures() -> Counter<u64> {
    meter()
        .u64_counter("sanus.recognition.failures")
        .with_description("Recognition calls that timed out or failed")
        .build()
}

/// Histogram: recognition round-trip in milliseconds.
/// Labels: `call`.
pub fn recognition_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("sanus.recognition.duration_ms")
        .with_description("Recognition call duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: recheck batches sent.
pub fn rechecks_fired() -> Counter<u64> {
    meter()
        .u64_counter("sanus.rechecks.fired")
        .with_description("Coalesced recheck batches sent to the recognition service")
        .build()
}

/// Counter: batch acknowledgments. Labels: `kind` ("reminder" | "clean").
pub fn alerts() -> Counter<u64> {
    meter()
        .u64_counter("sanus.alerts")
        .with_description("Audible acknowledgments after a recheck")
        .build()
}

/// Counter: telemetry post results.
/// Labels: `result` ("ok" | "buffered" | "replayed" | "dropped").
pub fn events_posted() -> Counter<u64> {
    meter()
        .u64_counter("sanus.events.posted")
        .with_description("Telemetry events by delivery result")
        .build()
}
