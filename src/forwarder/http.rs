//! HTTP sink: `POST {url}` with the event as JSON, 2xx means accepted.
//! A URL without a path posts to `/telemetry-event`.

use std::time::Duration;

use async_trait::async_trait;

use super::EventSink;
use crate::config::secrets::{ExposeSecret, SecretString};
use crate::error::{Error, Result};
use crate::model::TelemetryEvent;

const DEFAULT_PATH: &str = "/telemetry-event";

pub struct HttpEventSink {
    http: reqwest::Client,
    url: reqwest::Url,
    token: Option<SecretString>,
}

impl HttpEventSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        let url = url.into();
        let mut url = reqwest::Url::parse(&url)
            .map_err(|e| Error::Config(format!("invalid telemetry sink url {url:?}: {e}")))?;
        if url.path() == "/" {
            url.set_path(DEFAULT_PATH);
        }

        Ok(Self {
            http,
            url,
            token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every post.
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn post(&self, event: &TelemetryEvent) -> Result<()> {
        let mut request = self.http.post(self.url.clone()).json(event);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(Error::Sink(format!("{} returned {status}: {text}", self.url)))
        }
    }
}
