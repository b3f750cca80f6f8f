//! Secret handling utilities.
//!
//! Re-exports secrecy types used for the telemetry sink token.

pub use secrecy::{ExposeSecret, SecretString};
