//! Client configuration: a validated struct built by a fallible factory,
//! plus the TOML `[loadtest]` section used by the load generator.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Path of the collector's RESTful collection interface, relative to the
/// configured server URL.
pub const COLLECT_PATH: &str = "/data/collect";

/// Default HTTP timeout for event submissions.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound of the internal delivery queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Payload protection strategy. The two strategies are mutually exclusive;
/// the collector is expected to be configured for one of them per web
/// service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionMode {
    /// Send the payload base64-encoded in the clear, with an HMAC-SHA1 hex
    /// signature alongside so the server can verify authenticity.
    #[default]
    Sign,
    /// Encrypt the payload with AES-256-CFB before base64-encoding; no
    /// separate signature field is sent.
    Encrypt,
}

/// Immutable client settings, validated at construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the collector server (e.g. `http://tracker.example.com`).
    pub server_url: String,
    /// ID of the web service being monitored.
    pub wsid: u32,
    /// Shared key material used for signing or encryption.
    pub secret: String,
    /// Payload protection strategy.
    pub protection: ProtectionMode,
    /// When set, `track` delivers inline and awaits completion instead of
    /// enqueueing. For deterministic tests only; never enable in production.
    pub synchronous_delivery: bool,
    /// Bound of the internal delivery queue. Events arriving while the
    /// queue is full are dropped and logged.
    pub queue_capacity: usize,
    /// HTTP timeout applied to each submission.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Create a validated configuration with default protection (signing),
    /// queue capacity, and timeout.
    pub fn new(server_url: impl Into<String>, wsid: u32, secret: impl Into<String>) -> Result<Self> {
        let config = Self {
            server_url: server_url.into(),
            wsid,
            secret: secret.into(),
            protection: ProtectionMode::default(),
            synchronous_delivery: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            timeout: DEFAULT_TIMEOUT,
        };
        config.validate()?;
        Ok(config)
    }

    /// Select the payload protection strategy.
    pub fn with_protection(mut self, protection: ProtectionMode) -> Self {
        self.protection = protection;
        self
    }

    /// Switch to inline, awaited delivery (test determinism).
    pub fn with_synchronous_delivery(mut self, synchronous: bool) -> Self {
        self.synchronous_delivery = synchronous;
        self
    }

    /// Override the delivery queue bound.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Override the HTTP submission timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the invariants every constructed client relies on: non-empty
    /// server URL, positive web service id, non-empty secret, and a sane
    /// queue bound.
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(ClientError::InvalidSettings(
                "server URL must not be empty".into(),
            ));
        }
        if self.wsid == 0 {
            return Err(ClientError::InvalidSettings(
                "web service id must be positive".into(),
            ));
        }
        if self.secret.trim().is_empty() {
            return Err(ClientError::InvalidSettings(
                "secret must not be empty".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ClientError::InvalidSettings(
                "queue capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Full submission URL: the server URL joined with [`COLLECT_PATH`]
    /// by exactly one `/`, whether or not the server URL carries a
    /// trailing slash.
    pub fn collect_url(&self) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), COLLECT_PATH)
    }
}

/// Top-level load-test configuration file, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestConfig {
    pub loadtest: LoadTestSection,
}

/// The `[loadtest]` section: collector URL, web service id, secret, and
/// optionally the protection strategy (`sign` when absent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestSection {
    pub url: String,
    pub wsid: u32,
    pub secret: String,
    #[serde(default)]
    pub protection: ProtectionMode,
}

impl LoadTestConfig {
    /// Load and parse a load-test config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| ClientError::Config(format!("invalid config file: {e}")))
    }

    /// Convert the file contents into a validated [`ClientConfig`].
    pub fn into_client_config(self) -> Result<ClientConfig> {
        let protection = self.loadtest.protection;
        ClientConfig::new(self.loadtest.url, self.loadtest.wsid, self.loadtest.secret)
            .map(|config| config.with_protection(protection))
    }
}
