//! The pipeline instance: owns the queues, the ledger and the forwarder for
//! one device, and starts the workers that drain them.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{dispatch, recheck, welcome};
use crate::annunciator::Annunciator;
use crate::clock::Clock;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::forwarder::{EventSink, TelemetryForwarder};
use crate::ledger::DedupLedger;
use crate::model::{
    CaptureEvent, CaptureId, DispatchRequest, NodeProfile, RecheckEntry, StaffProfile, Timestamp,
};
use crate::notify::StaffNotifier;
use crate::profile::ProfileStore;
use crate::queue::TimedQueue;
use crate::recognition::RecognitionClient;
use crate::telemetry::metrics;

/// External services the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub recognition: Arc<dyn RecognitionClient>,
    pub profiles: Arc<dyn ProfileStore>,
    pub sink: Arc<dyn EventSink>,
    pub annunciator: Arc<dyn Annunciator>,
    pub notifier: Option<Arc<dyn StaffNotifier>>,
}

/// State shared by every worker and response task.
pub(crate) struct Shared {
    pub config: PipelineConfig,
    pub clock: Clock,
    pub dispatch: TimedQueue<DispatchRequest>,
    pub rechecks: TimedQueue<RecheckEntry>,
    pub welcomes: mpsc::UnboundedSender<String>,
    pub ledger: DedupLedger,
    pub forwarder: TelemetryForwarder,
    pub in_flight: Arc<Semaphore>,
    pub recognition: Arc<dyn RecognitionClient>,
    pub profiles: Arc<dyn ProfileStore>,
    pub annunciator: Arc<dyn Annunciator>,
    pub notifier: Option<Arc<dyn StaffNotifier>>,
}

impl Shared {
    /// Wall-clock time matching [`Clock::now`], for event timestamps.
    pub fn now_utc(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let secs = now.floor();
        let nanos = ((now - secs) * 1e9) as u32;
        DateTime::from_timestamp(secs as i64, nanos).unwrap_or_else(Utc::now)
    }

    /// Staff profile for `identity`, or a placeholder if the store has none
    /// or does not answer in time.
    pub async fn resolve_staff(&self, identity: &str) -> StaffProfile {
        let lookup = tokio::time::timeout(self.config.remote_timeout, self.profiles.staff(identity));
        match lookup.await {
            Ok(Ok(Some(profile))) => profile,
            Ok(Ok(None)) => {
                warn!(identity, "no staff profile, reporting as unknown");
                StaffProfile::unknown(identity)
            }
            Ok(Err(e)) => {
                warn!(identity, error = %e, "staff profile lookup failed");
                StaffProfile::unknown(identity)
            }
            Err(_) => {
                warn!(identity, "staff profile lookup timed out");
                StaffProfile::unknown(identity)
            }
        }
    }

    /// Node profile for `node_id`, with the same fallback as [`Self::resolve_staff`].
    pub async fn resolve_node(&self, node_id: &str) -> NodeProfile {
        let lookup = tokio::time::timeout(self.config.remote_timeout, self.profiles.node(node_id));
        match lookup.await {
            Ok(Ok(Some(profile))) => profile,
            Ok(Ok(None)) => {
                warn!(node_id, "no node profile, reporting as unknown");
                NodeProfile::unknown(node_id)
            }
            Ok(Err(e)) => {
                warn!(node_id, error = %e, "node profile lookup failed");
                NodeProfile::unknown(node_id)
            }
            Err(_) => {
                warn!(node_id, "node profile lookup timed out");
                NodeProfile::unknown(node_id)
            }
        }
    }
}

/// One device's entry/alert pipeline.
///
/// Cheap to clone; clones share the same queues and ledger.
#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<Shared>,
    welcome_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<String>>>>,
    cancel: CancellationToken,
}

/// Join handles of the running workers.
pub struct Workers {
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Wait for every worker to exit (after [`Pipeline::shutdown`]).
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "pipeline worker ended abnormally");
            }
        }
    }
}

impl Pipeline {
    pub fn new(config: PipelineConfig, clock: Clock, collaborators: Collaborators) -> Self {
        let (welcome_tx, welcome_rx) = mpsc::unbounded_channel();
        let forwarder = TelemetryForwarder::new(
            collaborators.sink,
            config.telemetry_timeout,
            config.failed_event_capacity,
        );

        let shared = Shared {
            ledger: DedupLedger::new(config.suppression_window),
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            dispatch: TimedQueue::new(),
            rechecks: TimedQueue::new(),
            welcomes: welcome_tx,
            forwarder,
            recognition: collaborators.recognition,
            profiles: collaborators.profiles,
            annunciator: collaborators.annunciator,
            notifier: collaborators.notifier,
            clock,
            config,
        };

        Self {
            shared: Arc::new(shared),
            welcome_rx: Arc::new(Mutex::new(Some(welcome_rx))),
            cancel: CancellationToken::new(),
        }
    }

    /// Queue a capture for recognition. Never blocks.
    pub fn enqueue(&self, capture: CaptureEvent) -> CaptureId {
        let id = capture.id;
        let request = DispatchRequest::new(capture);
        self.shared.dispatch.push(request.timestamp, request);
        metrics::captures_enqueued().add(1, &[]);
        id
    }

    /// Spawn the dispatch, recheck and welcome workers.
    ///
    /// # Errors
    ///
    /// A pipeline can be started once; a second call fails.
    pub fn start(&self) -> Result<Workers> {
        let welcome_rx = self
            .welcome_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| Error::Other("pipeline already started".to_string()))?;

        info!(
            node_id = %self.shared.config.node_id,
            suppression_window_secs = self.shared.config.suppression_window.as_secs_f64(),
            alert_delay_secs = self.shared.config.alert_time_delay.as_secs_f64(),
            max_in_flight = self.shared.config.max_in_flight,
            "pipeline starting"
        );

        let handles = vec![
            tokio::spawn(dispatch::run(Arc::clone(&self.shared), self.cancel.clone())),
            tokio::spawn(recheck::run(Arc::clone(&self.shared), self.cancel.clone())),
            tokio::spawn(welcome::run(
                Arc::clone(&self.shared),
                welcome_rx,
                self.cancel.clone(),
            )),
        ];
        Ok(Workers { handles })
    }

    /// Signal every worker to stop. Pending queue entries are dropped with
    /// the pipeline.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn clock(&self) -> Clock {
        self.shared.clock
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.shared.ledger
    }

    pub fn forwarder(&self) -> &TelemetryForwarder {
        &self.shared.forwarder
    }

    /// Captures waiting for a dispatch slot.
    pub fn pending_captures(&self) -> usize {
        self.shared.dispatch.len()
    }

    /// Recheck entries not yet fired.
    pub fn pending_rechecks(&self) -> usize {
        self.shared.rechecks.len()
    }

    /// Fire time of the earliest pending recheck.
    pub fn next_recheck_at(&self) -> Option<Timestamp> {
        self.shared.rechecks.peek_at()
    }

    /// Telemetry events waiting for replay.
    pub fn buffered_events(&self) -> usize {
        self.shared.forwarder.buffered()
    }
}
