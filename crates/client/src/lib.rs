//! Beacon Client — fire-and-forget submission of web-traffic tracking
//! events to a remote collection endpoint.
//!
//! Each tracked request's metadata (URL, user agent, source IP, optional
//! username) is serialized to JSON, protected by either an HMAC-SHA1
//! signature or AES-256-CFB encryption, and POSTed to the collector from a
//! background worker pool. Delivery is best-effort and at-most-once:
//! failures are logged, never surfaced to the caller.

pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod event;

pub use client::TrackingClient;
pub use config::{ClientConfig, LoadTestConfig, ProtectionMode};
pub use error::{ClientError, Result};
pub use event::TrackingEvent;
