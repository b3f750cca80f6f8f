//! In-process fakes for the pipeline's collaborators.
//!
//! Each fake records what it was asked so tests can assert on the calls.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sanus_node::annunciator::Annunciator;
use sanus_node::clock::Clock;
use sanus_node::config::PipelineConfig;
use sanus_node::engine::{Collaborators, Pipeline, Workers};
use sanus_node::error::{Error, Result};
use sanus_node::forwarder::EventSink;
use sanus_node::model::{
    CaptureEvent, DispatchRequest, NodeProfile, RecheckRequest, RecognitionResult, StaffProfile,
    TelemetryEvent, Timestamp, Verdict,
};
use sanus_node::notify::StaffNotifier;
use sanus_node::profile::ProfileDirectory;
use sanus_node::recognition::RecognitionClient;

pub const NODE: &str = "ward3_door";

// ---------------------------------------------------------------------------
// Recognition
// ---------------------------------------------------------------------------

/// How the fake answers a recheck.
#[derive(Debug, Clone)]
pub enum RecheckMode {
    /// Answer each requested identity from the verdict table (default: non-compliant).
    Verdicts,
    Fail,
    Hang,
}

/// Answers `/entry` by image content: the image bytes are a key into
/// `entries`. An image of `b"hang"` never answers.
pub struct FakeRecognition {
    entries: Mutex<HashMap<Vec<u8>, Vec<RecognitionResult>>>,
    verdicts: Mutex<HashMap<String, bool>>,
    mode: Mutex<RecheckMode>,
    pub identify_calls: Mutex<Vec<DispatchRequest>>,
    pub recheck_calls: Mutex<Vec<RecheckRequest>>,
}

impl FakeRecognition {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            verdicts: Mutex::new(HashMap::new()),
            mode: Mutex::new(RecheckMode::Verdicts),
            identify_calls: Mutex::new(Vec::new()),
            recheck_calls: Mutex::new(Vec::new()),
        }
    }

    /// Image `image` shows these people.
    pub fn sees(&self, image: &str, results: Vec<RecognitionResult>) {
        self.entries
            .lock()
            .unwrap()
            .insert(image.as_bytes().to_vec(), results);
    }

    /// On recheck, `identity` reports `compliant`.
    pub fn verdict(&self, identity: &str, compliant: bool) {
        self.verdicts
            .lock()
            .unwrap()
            .insert(identity.to_string(), compliant);
    }

    pub fn recheck_mode(&self, mode: RecheckMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn identify_count(&self) -> usize {
        self.identify_calls.lock().unwrap().len()
    }

    pub fn rechecks(&self) -> Vec<RecheckRequest> {
        self.recheck_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecognitionClient for FakeRecognition {
    async fn identify(&self, request: &DispatchRequest) -> Result<Vec<RecognitionResult>> {
        self.identify_calls.lock().unwrap().push(request.clone());
        if request.capture.image == b"hang" {
            std::future::pending::<()>().await;
        }
        if request.capture.image == b"error" {
            return Err(Error::Recognition("entry returned 500".to_string()));
        }
        let results = self
            .entries
            .lock()
            .unwrap()
            .get(&request.capture.image)
            .cloned()
            .unwrap_or_else(|| vec![RecognitionResult::no_face()]);
        Ok(results)
    }

    async fn recheck(&self, request: &RecheckRequest) -> Result<Vec<Verdict>> {
        self.recheck_calls.lock().unwrap().push(request.clone());
        let mode = self.mode.lock().unwrap().clone();
        match mode {
            RecheckMode::Fail => Err(Error::Recognition("recheck returned 503".to_string())),
            RecheckMode::Hang => std::future::pending().await,
            RecheckMode::Verdicts => {
                let table = self.verdicts.lock().unwrap();
                Ok(request
                    .identities
                    .iter()
                    .map(|id| Verdict {
                        identity: id.clone(),
                        compliant: table.get(id).copied().unwrap_or(false),
                    })
                    .collect())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Records delivered events; fails every post while `failing` is set and
/// never answers posts for stalled identities.
#[derive(Default)]
pub struct FakeSink {
    failing: AtomicBool,
    attempts: AtomicUsize,
    stalled: Mutex<HashSet<String>>,
    delivered: Mutex<Vec<TelemetryEvent>>,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Posts for `identity` hang from now on.
    pub fn stall(&self, identity: &str) {
        self.stalled.lock().unwrap().insert(identity.to_string());
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<TelemetryEvent> {
        self.delivered.lock().unwrap().clone()
    }

    /// Delivered events as `(type, identity, message)` for compact asserts.
    pub fn summary(&self) -> Vec<(String, String, String)> {
        self.delivered()
            .into_iter()
            .map(|e| {
                (
                    e.event_type.to_string(),
                    e.identity,
                    e.response_message.to_string(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl EventSink for FakeSink {
    async fn post(&self, event: &TelemetryEvent) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let stalled = self.stalled.lock().unwrap().contains(&event.identity);
        if stalled {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Sink("connection refused".to_string()));
        }
        self.delivered.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Annunciator + notifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Welcome(String),
    Reminder(Vec<String>),
    Clean,
}

#[derive(Default)]
pub struct FakeAnnunciator {
    played: Mutex<Vec<Ack>>,
}

impl FakeAnnunciator {
    pub fn played(&self) -> Vec<Ack> {
        self.played.lock().unwrap().clone()
    }

    pub fn welcomes(&self) -> Vec<String> {
        self.played()
            .into_iter()
            .filter_map(|a| match a {
                Ack::Welcome(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn acknowledgments(&self) -> Vec<Ack> {
        self.played()
            .into_iter()
            .filter(|a| !matches!(a, Ack::Welcome(_)))
            .collect()
    }
}

#[async_trait]
impl Annunciator for FakeAnnunciator {
    async fn welcome(&self, identity: &str) -> Result<()> {
        self.played
            .lock()
            .unwrap()
            .push(Ack::Welcome(identity.to_string()));
        Ok(())
    }

    async fn reminder(&self, identities: &[String]) -> Result<()> {
        self.played
            .lock()
            .unwrap()
            .push(Ack::Reminder(identities.to_vec()));
        Ok(())
    }

    async fn clean(&self) -> Result<()> {
        self.played.lock().unwrap().push(Ack::Clean);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl FakeNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl StaffNotifier for FakeNotifier {
    async fn notify(&self, staff: &StaffProfile, message: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((staff.identity.clone(), message.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn staff(identity: &str, name: &str, title: &str) -> StaffProfile {
    StaffProfile {
        identity: identity.to_string(),
        name: Some(name.to_string()),
        title: title.to_string(),
        unit: "ICU".to_string(),
        department: Some("Critical Care".to_string()),
        phone: Some("+15550100".to_string()),
    }
}

pub fn profiles() -> ProfileDirectory {
    let mut dir = ProfileDirectory::empty();
    dir.insert_staff(staff("alice", "alice", "RN"));
    dir.insert_staff(staff("bob", "bob", "MD"));
    dir.insert_staff(staff("carol", "carol", "RT"));
    dir.insert_node(NodeProfile {
        node_id: NODE.to_string(),
        unit: "ICU".to_string(),
        room_number: "312".to_string(),
        department: Some("Critical Care".to_string()),
    });
    dir
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        node_id: NODE.to_string(),
        suppression_window: Duration::from_secs(30),
        alert_time_delay: Duration::from_secs(20),
        remote_timeout: Duration::from_secs(2),
        telemetry_timeout: Duration::from_secs(1),
        max_in_flight: 4,
        welcome_pause: Duration::from_millis(500),
        failed_event_capacity: 16,
    }
}

/// A started pipeline wired to fakes, on a clock reading 1000.0 at start.
pub struct Harness {
    pub pipeline: Pipeline,
    pub workers: Option<Workers>,
    pub recognition: Arc<FakeRecognition>,
    pub sink: Arc<FakeSink>,
    pub annunciator: Arc<FakeAnnunciator>,
    pub notifier: Arc<FakeNotifier>,
}

impl Harness {
    pub fn start(config: PipelineConfig) -> Self {
        let recognition = Arc::new(FakeRecognition::new());
        let sink = Arc::new(FakeSink::new());
        let annunciator = Arc::new(FakeAnnunciator::default());
        let notifier = Arc::new(FakeNotifier::default());

        let pipeline = Pipeline::new(
            config,
            Clock::starting_at(1000.0),
            Collaborators {
                recognition: recognition.clone(),
                profiles: Arc::new(profiles()),
                sink: sink.clone(),
                annunciator: annunciator.clone(),
                notifier: Some(notifier.clone()),
            },
        );
        let workers = pipeline.start().expect("start pipeline");

        Self {
            pipeline,
            workers: Some(workers),
            recognition,
            sink,
            annunciator,
            notifier,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.pipeline.clock().now()
    }

    /// Enqueue a capture of `image` taken now.
    pub fn capture(&self, image: &str) -> CaptureEvent {
        let capture = CaptureEvent::new(NODE, self.now(), image.as_bytes().to_vec());
        self.pipeline.enqueue(capture.clone());
        capture
    }

    /// Enqueue a capture of `image` stamped `timestamp`.
    pub fn capture_at(&self, image: &str, timestamp: Timestamp) -> CaptureEvent {
        let capture = CaptureEvent::new(NODE, timestamp, image.as_bytes().to_vec());
        self.pipeline.enqueue(capture.clone());
        capture
    }

    pub async fn stop(mut self) {
        self.pipeline.shutdown();
        if let Some(workers) = self.workers.take() {
            workers.join().await;
        }
    }
}

/// Let time pass on the paused test clock.
pub async fn advance(secs: f64) {
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}
