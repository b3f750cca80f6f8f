//! Span helpers for the two pipeline paths.

use tracing::Span;

use crate::model::{CaptureId, Timestamp};

/// Span covering one capture from dequeue through reconciliation.
///
/// `dispatch.outcome` is declared empty; fill it with [`record_outcome`].
pub fn start_dispatch_span(capture_id: &CaptureId, node_id: &str, captured_at: Timestamp) -> Span {
    tracing::info_span!(
        "capture.dispatch",
        "capture.id" = %capture_id,
        "node.id" = node_id,
        "capture.timestamp" = captured_at,
        "dispatch.outcome" = tracing::field::Empty,
    )
}

/// Span covering one coalesced recheck batch.
pub fn start_recheck_span(fire_at: Timestamp, identities: usize) -> Span {
    tracing::info_span!(
        "recheck.fire",
        "recheck.fire_at" = fire_at,
        "recheck.identities" = identities,
        "dispatch.outcome" = tracing::field::Empty,
    )
}

/// Record how a capture or batch ended.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("dispatch.outcome", outcome);
}
