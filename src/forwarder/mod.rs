//! Telemetry forwarder: best-effort delivery of compliance events.
//!
//! A failed post is buffered and the caller moves on. The next successful
//! post takes the whole buffer and replays it once on a background task,
//! whatever the replay results; an event whose replay fails is dropped.

pub mod http;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::error::{Error, Result};
use crate::model::TelemetryEvent;
use crate::telemetry::metrics;

pub use http::HttpEventSink;

/// Where telemetry events are written.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn post(&self, event: &TelemetryEvent) -> Result<()>;
}

/// What happened to a posted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// Written to the sink; `replayed` buffered events were handed to a
    /// background replay.
    Delivered { replayed: usize },
    /// The sink was unreachable; the event waits in the buffer.
    Buffered,
}

pub struct TelemetryForwarder {
    sink: Arc<dyn EventSink>,
    timeout: Duration,
    capacity: usize,
    failed: Mutex<VecDeque<TelemetryEvent>>,
    replays: Mutex<Vec<JoinHandle<()>>>,
}

impl TelemetryForwarder {
    pub fn new(sink: Arc<dyn EventSink>, timeout: Duration, capacity: usize) -> Self {
        Self {
            sink,
            timeout,
            capacity: capacity.max(1),
            failed: Mutex::new(VecDeque::new()),
            replays: Mutex::new(Vec::new()),
        }
    }

    /// Post one event. Never fails: sink errors end up in the buffer.
    pub async fn post(&self, event: TelemetryEvent) -> PostOutcome {
        match self.attempt(&event).await {
            Ok(()) => {
                debug!(
                    event_type = %event.event_type,
                    identity = %event.identity,
                    message = %event.response_message,
                    "telemetry event posted"
                );
                metrics::events_posted().add(1, &[KeyValue::new("result", "ok")]);
                let replayed = self.replay_buffer();
                PostOutcome::Delivered { replayed }
            }
            Err(e) => {
                warn!(
                    event_type = %event.event_type,
                    identity = %event.identity,
                    error = %e,
                    "telemetry post failed, buffering event"
                );
                metrics::events_posted().add(1, &[KeyValue::new("result", "buffered")]);
                self.buffer(event);
                PostOutcome::Buffered
            }
        }
    }

    /// Number of events waiting for replay.
    pub fn buffered(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of the buffered events, oldest first.
    pub fn buffered_events(&self) -> Vec<TelemetryEvent> {
        self.lock().iter().cloned().collect()
    }

    /// Wait for every replay started so far to finish.
    pub async fn wait_for_replay(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .replays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "telemetry replay task ended abnormally");
            }
        }
    }

    async fn attempt(&self, event: &TelemetryEvent) -> Result<()> {
        attempt(self.sink.as_ref(), self.timeout, event).await
    }

    /// Take the whole buffer and post each event once on a spawned task.
    /// Returns how many were taken.
    fn replay_buffer(&self) -> usize {
        let backlog: Vec<TelemetryEvent> = self.lock().drain(..).collect();
        let count = backlog.len();
        if count == 0 {
            return 0;
        }

        info!(count, "replaying buffered telemetry events");
        let sink = Arc::clone(&self.sink);
        let timeout = self.timeout;
        let handle = tokio::spawn(
            async move {
                for event in &backlog {
                    match attempt(sink.as_ref(), timeout, event).await {
                        Ok(()) => {
                            metrics::events_posted()
                                .add(1, &[KeyValue::new("result", "replayed")]);
                        }
                        Err(e) => {
                            warn!(
                                identity = %event.identity,
                                time = %event.time,
                                error = %e,
                                "replay failed, dropping event"
                            );
                            metrics::events_posted()
                                .add(1, &[KeyValue::new("result", "dropped")]);
                        }
                    }
                }
            }
            .in_current_span(),
        );

        let mut replays = self.replays.lock().unwrap_or_else(|e| e.into_inner());
        replays.retain(|h| !h.is_finished());
        replays.push(handle);
        count
    }

    fn buffer(&self, event: TelemetryEvent) {
        let mut failed = self.lock();
        if failed.len() >= self.capacity {
            if let Some(oldest) = failed.pop_front() {
                warn!(
                    capacity = self.capacity,
                    identity = %oldest.identity,
                    time = %oldest.time,
                    "failed-event buffer full, dropping oldest"
                );
            }
        }
        failed.push_back(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<TelemetryEvent>> {
        self.failed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn attempt(sink: &dyn EventSink, timeout: Duration, event: &TelemetryEvent) -> Result<()> {
    match tokio::time::timeout(timeout, sink.post(event)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: "telemetry post",
            secs: timeout.as_secs_f64(),
        }),
    }
}
