//! Recognition service adapter.
//!
//! The service maps an image to the people in it and their hand-hygiene
//! status, and answers delayed rechecks for a set of identities. The
//! pipeline only sees the [`RecognitionClient`] trait; [`HttpRecognitionClient`]
//! is the production implementation.

pub mod http;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{DispatchRequest, RecheckRequest, RecognitionResult, Verdict};

pub use http::HttpRecognitionClient;

#[async_trait]
pub trait RecognitionClient: Send + Sync {
    /// Identify everyone in the captured image.
    ///
    /// An image with nobody in it yields a single `face_found == false` result
    /// (or an empty list); both mean "nothing to do".
    async fn identify(&self, request: &DispatchRequest) -> Result<Vec<RecognitionResult>>;

    /// Ask whether each identity has performed hand hygiene since entry.
    async fn recheck(&self, request: &RecheckRequest) -> Result<Vec<Verdict>>;
}
