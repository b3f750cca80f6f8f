//! Identity dedup ledger.
//!
//! Remembers when each identity was last accepted so that a person lingering
//! in front of the camera is reported once per suppression window. Entries
//! are never evicted; staleness is judged at read time.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::model::Timestamp;

pub struct DedupLedger {
    window: f64,
    entries: Mutex<HashMap<String, Timestamp>>,
}

impl DedupLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.as_secs_f64(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// True if `identity` was accepted within the suppression window before `now`.
    pub fn seen(&self, identity: &str, now: Timestamp) -> bool {
        let entries = self.lock();
        is_suppressed(entries.get(identity).copied(), now, self.window)
    }

    /// Set `identity`'s last-seen time unconditionally.
    pub fn record(&self, identity: &str, timestamp: Timestamp) {
        self.lock().insert(identity.to_string(), timestamp);
    }

    /// Check and record under one lock. Returns `true` if the detection is
    /// accepted (and recorded at `now`), `false` if it is suppressed (and the
    /// ledger is left untouched).
    pub fn admit(&self, identity: &str, now: Timestamp) -> bool {
        let mut entries = self.lock();
        if is_suppressed(entries.get(identity).copied(), now, self.window) {
            return false;
        }
        entries.insert(identity.to_string(), now);
        true
    }

    /// Last accepted time for `identity`, if any.
    pub fn last_seen(&self, identity: &str) -> Option<Timestamp> {
        self.lock().get(identity).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Timestamp>> {
        // A poisoned map is still a valid map; keep serving it.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn is_suppressed(last_seen: Option<Timestamp>, now: Timestamp, window: f64) -> bool {
    match last_seen {
        Some(last) => now - last <= window,
        None => false,
    }
}
