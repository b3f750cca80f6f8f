//! # sanus-node
//!
//! Edge pipeline for a hand-hygiene monitoring node.
//!
//! Captures from a doorway camera are queued in timestamp order, sent to a
//! remote recognition service, and reconciled against a per-identity
//! suppression window. Each fresh entry is welcomed aloud and reported as an
//! `Entry` telemetry event; anyone not yet compliant is rechecked after a
//! grace period and reminded (or acknowledged clean) with an `Alert` event.
//! Telemetry that cannot be delivered is buffered and replayed on the next
//! successful post.

pub mod annunciator;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod forwarder;
pub mod ledger;
pub mod model;
pub mod notify;
pub mod profile;
pub mod queue;
pub mod recognition;
pub mod telemetry;
