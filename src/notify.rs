//! Direct staff notification when an alert is given.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::StaffProfile;

#[async_trait]
pub trait StaffNotifier: Send + Sync {
    async fn notify(&self, staff: &StaffProfile, message: &str) -> Result<()>;
}

/// The reminder text sent to a staff member who missed hand hygiene.
pub fn reminder_message(staff: &StaffProfile) -> String {
    format!(
        "{}, you forgot to wash your hands, please do so.",
        staff.display_name()
    )
}

/// Posts `{identity, phone, message}` JSON to a messaging webhook.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct NotifyBody<'a> {
    identity: &'a str,
    phone: &'a str,
    message: &'a str,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl StaffNotifier for WebhookNotifier {
    async fn notify(&self, staff: &StaffProfile, message: &str) -> Result<()> {
        let Some(ref phone) = staff.phone else {
            return Err(Error::Other(format!(
                "no phone number on file for {}",
                staff.identity
            )));
        };

        let response = self
            .http
            .post(&self.url)
            .json(&NotifyBody {
                identity: &staff.identity,
                phone,
                message,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Other(format!("notify webhook returned {status}")))
        }
    }
}
