//! Entry dispatch: drain captures in timestamp order, identify who is in each
//! one, and reconcile the answer against the dedup ledger.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use super::pipeline::Shared;
use crate::model::{
    DispatchRequest, EventType, RecheckEntry, RecognitionResult, ResponseMessage, TelemetryEvent,
    Timestamp,
};
use crate::telemetry::metrics;
use crate::telemetry::spans::{record_outcome, start_dispatch_span};

/// What the ledger gate made of one recognition result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Detection {
    NoFace,
    Unidentified,
    Suppressed { identity: String },
    Accepted { identity: String, compliant: Option<bool> },
}

impl Detection {
    fn label(&self) -> &'static str {
        match self {
            Detection::NoFace => "no_face",
            Detection::Unidentified => "unidentified",
            Detection::Suppressed { .. } => "suppressed",
            Detection::Accepted { .. } => "accepted",
        }
    }
}

/// Dispatch loop. Each dequeued capture gets its own task holding one
/// in-flight permit, so a slow recognition call never holds up the queue
/// beyond the in-flight cap.
pub(crate) async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    info!("dispatch worker started");

    loop {
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&shared.in_flight).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let (_, request) = tokio::select! {
            _ = cancel.cancelled() => break,
            head = shared.dispatch.pop_wait() => head,
        };

        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let _permit = permit;
            handle_capture(&task_shared, request).await;
        });
    }

    info!("dispatch worker stopped");
}

/// Identify, gate and report one capture. Any recognition failure drops the
/// capture.
pub(crate) async fn handle_capture(shared: &Shared, request: DispatchRequest) {
    let capture = &request.capture;
    let span = start_dispatch_span(&capture.id, &capture.node_id, capture.timestamp);

    async {
        let started = Instant::now();
        let call = tokio::time::timeout(
            shared.config.remote_timeout,
            shared.recognition.identify(&request),
        );

        let results = match call.await {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                warn!(
                    capture_id = %capture.id,
                    error = %e,
                    transient = e.is_transient(),
                    "recognition failed, dropping capture"
                );
                metrics::recognition_failures().add(
                    1,
                    &[KeyValue::new("call", "entry"), KeyValue::new("reason", "error")],
                );
                record_outcome(&span, "failed");
                return;
            }
            Err(_) => {
                warn!(
                    capture_id = %capture.id,
                    timeout_secs = shared.config.remote_timeout.as_secs_f64(),
                    "recognition timed out, dropping capture"
                );
                metrics::recognition_failures().add(
                    1,
                    &[KeyValue::new("call", "entry"), KeyValue::new("reason", "timeout")],
                );
                record_outcome(&span, "timeout");
                return;
            }
        };
        metrics::recognition_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("call", "entry")],
        );

        let now = shared.clock.now();
        let mut recheck = BTreeSet::new();
        let mut accepted = 0usize;

        for result in &results {
            let detection = gate(shared, result, now);
            metrics::detections().add(1, &[KeyValue::new("outcome", detection.label())]);

            match detection {
                Detection::NoFace => debug!(capture_id = %capture.id, "no face in capture"),
                Detection::Unidentified => {
                    debug!(capture_id = %capture.id, "face found but not identified")
                }
                Detection::Suppressed { identity } => debug!(
                    capture_id = %capture.id,
                    %identity,
                    "seen within suppression window, skipping"
                ),
                Detection::Accepted {
                    identity,
                    compliant,
                } => {
                    accepted += 1;
                    report_entry(shared, &capture.node_id, &identity, compliant).await;
                    if compliant != Some(true) {
                        recheck.insert(identity);
                    }
                }
            }
        }

        let fire_at = capture.timestamp + shared.config.alert_time_delay.as_secs_f64();
        if !recheck.is_empty() && !fire_at.is_finite() {
            warn!(
                capture_id = %capture.id,
                timestamp = capture.timestamp,
                identities = ?recheck,
                "capture timestamp is not a finite time, recheck not scheduled"
            );
        } else if !recheck.is_empty() {
            info!(
                capture_id = %capture.id,
                identities = ?recheck,
                fire_at,
                "recheck scheduled"
            );
            let entry = RecheckEntry::new(fire_at, recheck, request.context());
            shared.rechecks.push(fire_at, entry);
        }

        record_outcome(
            &span,
            if accepted > 0 { "accepted" } else { "nothing_to_do" },
        );
    }
    .instrument(span.clone())
    .await
}

/// Classify a result and, for a fresh identity, record it in the ledger.
pub(crate) fn gate(shared: &Shared, result: &RecognitionResult, now: Timestamp) -> Detection {
    if !result.face_found {
        return Detection::NoFace;
    }
    let Some(ref identity) = result.identity else {
        return Detection::Unidentified;
    };
    if !shared.ledger.admit(identity, now) {
        return Detection::Suppressed {
            identity: identity.clone(),
        };
    }
    Detection::Accepted {
        identity: identity.clone(),
        compliant: result.compliant,
    }
}

/// Welcome the visitor and post the Entry event.
async fn report_entry(shared: &Shared, node_id: &str, identity: &str, compliant: Option<bool>) {
    // Welcome is queued ahead of the telemetry post.
    if shared.welcomes.send(identity.to_string()).is_err() {
        debug!(identity, "welcome worker gone, skipping welcome");
    }

    let staff = shared.resolve_staff(identity).await;
    let node = shared.resolve_node(node_id).await;
    let message = ResponseMessage::entry(compliant == Some(true));
    info!(identity, %message, "entry");

    let event = TelemetryEvent::build(EventType::Entry, shared.now_utc(), &node, &staff, message);
    shared.forwarder.post(event).await;
}
