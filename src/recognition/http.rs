//! HTTP/JSON client for the recognition service.
//!
//! `POST {base}/entry`   `{node_id, capture_id, timestamp, image, shape}`
//!                       → `{face_found, results: [{identity, compliant}]}`
//! `POST {base}/recheck` `{node_id, identities, timestamp, captured_at, capture_ids}`
//!                       → `[{identity, compliant}]`

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::RecognitionClient;
use crate::error::{Error, Result};
use crate::model::{DispatchRequest, ImageShape, RecheckRequest, RecognitionResult, Verdict};

pub struct HttpRecognitionClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct EntryBody<'a> {
    node_id: &'a str,
    capture_id: String,
    timestamp: f64,
    image: String,
    shape: String,
}

#[derive(Debug, Deserialize)]
struct EntryResponse {
    #[serde(default)]
    face_found: bool,
    #[serde(default)]
    results: Vec<WireResult>,
}

#[derive(Debug, Deserialize)]
struct WireResult {
    #[serde(default)]
    identity: Option<String>,
    #[serde(default)]
    compliant: Option<bool>,
}

#[derive(Debug, Serialize)]
struct RecheckBody<'a> {
    node_id: &'a str,
    identities: &'a [String],
    timestamp: f64,
    captured_at: f64,
    capture_ids: Vec<String>,
}

impl HttpRecognitionClient {
    /// Create a client for the service rooted at `base_url`. `timeout` bounds
    /// each whole request, connect included.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        headers: &BTreeMap<String, String>,
    ) -> Result<R> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.http.post(&url).json(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Recognition(format!("{path} returned {status}: {text}")));
        }

        let body = response.bytes().await?;
        debug!(%url, bytes = body.len(), "recognition response");
        serde_json::from_slice(&body)
            .map_err(|e| Error::Recognition(format!("bad {path} response: {e}")))
    }
}

#[async_trait]
impl RecognitionClient for HttpRecognitionClient {
    async fn identify(&self, request: &DispatchRequest) -> Result<Vec<RecognitionResult>> {
        let capture = &request.capture;
        let body = EntryBody {
            node_id: &capture.node_id,
            capture_id: capture.id.0.to_string(),
            timestamp: capture.timestamp,
            image: base64::engine::general_purpose::STANDARD.encode(&capture.image),
            shape: shape_string(capture.shape),
        };

        let response: EntryResponse = self.post_json("/entry", &body, &request.headers).await?;
        Ok(normalize_entry(response))
    }

    async fn recheck(&self, request: &RecheckRequest) -> Result<Vec<Verdict>> {
        let body = RecheckBody {
            node_id: &request.node_id,
            identities: &request.identities,
            timestamp: request.timestamp,
            captured_at: request.captured_at,
            capture_ids: request.capture_ids.iter().map(|id| id.0.to_string()).collect(),
        };

        self.post_json("/recheck", &body, &request.headers).await
    }
}

fn normalize_entry(response: EntryResponse) -> Vec<RecognitionResult> {
    if !response.face_found {
        return vec![RecognitionResult::no_face()];
    }
    response
        .results
        .into_iter()
        .map(|r| RecognitionResult {
            identity: r.identity.filter(|id| !id.is_empty() && id != "None"),
            compliant: r.compliant,
            face_found: true,
        })
        .collect()
}

/// Numpy-style shape tuple, e.g. `(480, 640, 3)`.
fn shape_string(shape: ImageShape) -> String {
    format!("({}, {}, {})", shape.height, shape.width, shape.channels)
}
