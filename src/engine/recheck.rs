//! Compliance recheck: once an entry's grace period has passed, ask the
//! recognition service again and sound one reminder or clean acknowledgment
//! per batch.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use super::pipeline::Shared;
use crate::model::{
    EventType, RecheckEntry, RecheckRequest, ResponseMessage, TelemetryEvent, Timestamp, Verdict,
};
use crate::notify::reminder_message;
use crate::telemetry::metrics;
use crate::telemetry::spans::{record_outcome, start_recheck_span};

// Floor on the wait for a future head, so float rounding can't spin the loop.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Recheck loop. Sleeps until the head is due or a new entry arrives.
pub(crate) async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    info!("recheck worker started");

    loop {
        let wait = match shared.rechecks.peek_at() {
            None => None,
            Some(fire_at) => {
                let now = shared.clock.now();
                if fire_at <= now {
                    let due = shared.rechecks.pop_due(now);
                    if !due.is_empty() {
                        fire(&shared, due).await;
                    }
                    continue;
                }
                Some(shared.clock.until(fire_at).max(MIN_WAIT))
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.rechecks.changed() => {}
            _ = sleep_for(wait) => {}
        }
    }

    info!("recheck worker stopped");
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

/// Merge entries that share a fire time into one request.
pub(crate) fn coalesce(
    node_id: &str,
    due: Vec<(Timestamp, RecheckEntry)>,
    now: Timestamp,
) -> Option<RecheckRequest> {
    let mut entries = due.into_iter().map(|(_, entry)| entry);
    let first = entries.next()?;

    let mut identities: BTreeSet<String> = first.identities;
    let mut capture_ids = vec![first.context.capture_id];
    let mut captured_at = first.context.captured_at;
    let headers = first.context.headers;
    let node_id = if first.context.node_id.is_empty() {
        node_id.to_string()
    } else {
        first.context.node_id
    };

    for entry in entries {
        identities.extend(entry.identities);
        capture_ids.push(entry.context.capture_id);
        captured_at = captured_at.min(entry.context.captured_at);
    }

    Some(RecheckRequest {
        node_id,
        identities: identities.into_iter().collect(),
        timestamp: now,
        captured_at,
        capture_ids,
        headers,
    })
}

async fn fire(shared: &Shared, due: Vec<(Timestamp, RecheckEntry)>) {
    let fire_at = due.first().map(|(at, _)| *at).unwrap_or_default();
    let now = shared.clock.now();
    let Some(request) = coalesce(&shared.config.node_id, due, now) else {
        return;
    };

    let span = start_recheck_span(fire_at, request.identities.len());
    async {
        metrics::rechecks_fired().add(1, &[]);
        info!(
            identities = ?request.identities,
            captures = request.capture_ids.len(),
            late_by_secs = now - fire_at,
            "recheck due"
        );

        let started = Instant::now();
        let call = tokio::time::timeout(
            shared.config.remote_timeout,
            shared.recognition.recheck(&request),
        );
        let verdicts = match call.await {
            Ok(Ok(verdicts)) => verdicts,
            Ok(Err(e)) => {
                warn!(
                    identities = ?request.identities,
                    error = %e,
                    transient = e.is_transient(),
                    "recheck failed, dropping batch"
                );
                metrics::recognition_failures().add(
                    1,
                    &[KeyValue::new("call", "recheck"), KeyValue::new("reason", "error")],
                );
                record_outcome(&span, "failed");
                return;
            }
            Err(_) => {
                warn!(
                    identities = ?request.identities,
                    timeout_secs = shared.config.remote_timeout.as_secs_f64(),
                    "recheck timed out, dropping batch"
                );
                metrics::recognition_failures().add(
                    1,
                    &[KeyValue::new("call", "recheck"), KeyValue::new("reason", "timeout")],
                );
                record_outcome(&span, "timeout");
                return;
            }
        };
        metrics::recognition_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("call", "recheck")],
        );

        let verdicts = requested_only(&request, verdicts);
        if verdicts.is_empty() {
            info!(identities = ?request.identities, "recheck returned no verdicts");
            record_outcome(&span, "no_verdicts");
            return;
        }

        let reminded = report_verdicts(shared, &request, &verdicts).await;
        acknowledge(shared, reminded);
        record_outcome(&span, "decided");
    }
    .instrument(span.clone())
    .await
}

/// Drop verdicts for identities that were not asked about.
fn requested_only(request: &RecheckRequest, verdicts: Vec<Verdict>) -> Vec<Verdict> {
    verdicts
        .into_iter()
        .filter(|v| {
            let asked = request.identities.contains(&v.identity);
            if !asked {
                warn!(identity = %v.identity, "verdict for identity not in batch, ignoring");
            }
            asked
        })
        .collect()
}

/// Post one Alert event per verdict and notify non-compliant staff.
/// Returns the non-compliant identities.
async fn report_verdicts(
    shared: &Shared,
    request: &RecheckRequest,
    verdicts: &[Verdict],
) -> Vec<String> {
    let node = shared.resolve_node(&request.node_id).await;
    let mut reminded = Vec::new();

    for verdict in verdicts {
        let staff = shared.resolve_staff(&verdict.identity).await;
        let message = ResponseMessage::alert(verdict.compliant);
        info!(identity = %verdict.identity, %message, "recheck verdict");

        let event =
            TelemetryEvent::build(EventType::Alert, shared.now_utc(), &node, &staff, message);
        shared.forwarder.post(event).await;

        if !verdict.compliant {
            reminded.push(verdict.identity.clone());
            if let Some(ref notifier) = shared.notifier {
                let text = reminder_message(&staff);
                let call = tokio::time::timeout(
                    shared.config.remote_timeout,
                    notifier.notify(&staff, &text),
                );
                match call.await {
                    Ok(Ok(())) => debug!(identity = %staff.identity, "staff notified"),
                    Ok(Err(e)) => warn!(identity = %staff.identity, error = %e, "staff notification failed"),
                    Err(_) => warn!(identity = %staff.identity, "staff notification timed out"),
                }
            }
        }
    }

    reminded
}

/// One audible acknowledgment for the whole batch, played off the worker.
fn acknowledge(shared: &Shared, reminded: Vec<String>) {
    let annunciator = Arc::clone(&shared.annunciator);
    let all_clean = reminded.is_empty();
    metrics::alerts().add(
        1,
        &[KeyValue::new("kind", if all_clean { "clean" } else { "reminder" })],
    );

    tokio::spawn(
        async move {
            let played = if all_clean {
                annunciator.clean().await
            } else {
                annunciator.reminder(&reminded).await
            };
            if let Err(e) = played {
                warn!(error = %e, "acknowledgment playback failed");
            }
        }
        .in_current_span(),
    );
}
