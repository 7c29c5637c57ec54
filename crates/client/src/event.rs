//! Tracking event model — one observed web request's metadata.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};

/// Metadata of a single observed web request, submitted to the collector.
///
/// Transient: exists only for the duration of one submission, nothing is
/// retained across calls. The wire field names (`url`, `useragent`, `ip`,
/// `username`) are what the collector expects; `username` is omitted
/// entirely for anonymous requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackingEvent {
    /// Path or URL that was requested.
    pub url: String,
    /// User agent string of the requesting client.
    #[serde(rename = "useragent")]
    pub user_agent: String,
    /// Source IP address of the request.
    #[serde(rename = "ip")]
    pub remote_ip: String,
    /// Authenticated username, if any. `None` means anonymous.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl TrackingEvent {
    /// Create an anonymous event from the three required fields.
    pub fn new(
        url: impl Into<String>,
        user_agent: impl Into<String>,
        remote_ip: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            user_agent: user_agent.into(),
            remote_ip: remote_ip.into(),
            username: None,
        }
    }

    /// Attach a username. An empty string is treated as anonymous and
    /// leaves the field unset.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        let username = username.into();
        self.username = if username.is_empty() {
            None
        } else {
            Some(username)
        };
        self
    }

    /// Whether every field is empty. Empty events are a no-op for the
    /// client.
    pub fn is_empty(&self) -> bool {
        self.url.is_empty()
            && self.user_agent.is_empty()
            && self.remote_ip.is_empty()
            && self.username.as_deref().map_or(true, str::is_empty)
    }

    /// Serialize to the compact JSON submission payload, dropping an empty
    /// username if one slipped in through a struct literal.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        let mut event = self.clone();
        if event.username.as_deref() == Some("") {
            event.username = None;
        }
        serde_json::to_vec(&event)
            .map_err(|e| ClientError::Serialization(format!("failed to serialize event: {e}")))
    }
}
