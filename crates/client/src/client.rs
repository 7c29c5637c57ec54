//! The tracking client: validated construction, a bounded delivery queue
//! consumed by a small worker pool, and best-effort HTTP submission.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{ClientConfig, ProtectionMode};
use crate::crypto::{encrypt_payload, sign_payload};
use crate::error::Result;
use crate::event::TrackingEvent;

/// Number of delivery workers draining the queue.
const WORKER_COUNT: usize = 4;

/// Fire-and-forget client for the Beacon tracking collector.
///
/// `track` never blocks on network I/O and never surfaces a delivery
/// failure; events are handed to a bounded internal queue drained by a
/// small worker pool. Losing an occasional event (queue full, network
/// down) is acceptable; blocking or failing the host application is not.
///
/// Example:
/// ```no_run
/// # async fn demo() -> beacon_client::Result<()> {
/// use beacon_client::{ClientConfig, TrackingClient, TrackingEvent};
///
/// let config = ClientConfig::new("http://tracker.example.com/", 1, "abcdef123456789abcdef12")?;
/// let client = TrackingClient::new(config)?;
/// client
///     .track(TrackingEvent::new("/", "Mozilla/5.0 (iPad ...", "123.123.123.123"))
///     .await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TrackingClient {
    config: Arc<ClientConfig>,
    http: Client,
    queue: mpsc::Sender<TrackingEvent>,
    workers: Vec<JoinHandle<()>>,
}

impl TrackingClient {
    /// Create a client from a validated configuration and start its worker
    /// pool. Construction is the only fallible surface of the client.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("beacon-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let config = Arc::new(config);
        let (tx, rx) = mpsc::channel::<TrackingEvent>(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..WORKER_COUNT)
            .map(|_| {
                let config = Arc::clone(&config);
                let http = http.clone();
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        let event = { rx.lock().await.recv().await };
                        match event {
                            Some(event) => deliver(&config, &http, &event).await,
                            None => break,
                        }
                    }
                })
            })
            .collect();

        Ok(Self {
            config,
            http,
            queue: tx,
            workers,
        })
    }

    /// Submit a tracking event.
    ///
    /// Returns before any network activity occurs: the event is enqueued
    /// for a delivery worker, or dropped with a warning when the queue is
    /// full. An empty event is a no-op. With
    /// [`synchronous_delivery`](ClientConfig::synchronous_delivery) set,
    /// delivers inline and awaits completion instead (test determinism).
    pub async fn track(&self, event: TrackingEvent) {
        if event.is_empty() {
            return;
        }

        if self.config.synchronous_delivery {
            deliver(&self.config, &self.http, &event).await;
            return;
        }

        match self.queue.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(url = %event.url, ip = %event.remote_ip, "delivery queue full, dropping tracking event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(url = %event.url, ip = %event.remote_ip, "delivery queue closed, dropping tracking event");
            }
        }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Close the queue and wait for in-flight deliveries, bounded by the
    /// grace period. Events still queued when the grace period expires are
    /// abandoned with a warning.
    pub async fn shutdown(self, grace: Duration) {
        let Self { queue, workers, .. } = self;
        drop(queue); // workers drain the queue, then exit

        let join_all = async {
            for worker in workers {
                let _ = worker.await;
            }
        };
        if tokio::time::timeout(grace, join_all).await.is_err() {
            warn!(
                grace_secs = grace.as_secs(),
                "shutdown grace period expired with deliveries still in flight"
            );
        }
    }
}

/// Deliver one event, absorbing any failure. The caller of `track` already
/// returned, so errors have nowhere to go but the log.
async fn deliver(config: &ClientConfig, http: &Client, event: &TrackingEvent) {
    match try_deliver(config, http, event).await {
        Ok(()) => {
            debug!(wsid = config.wsid, url = %event.url, "tracking event delivered");
        }
        Err(err) => {
            warn!(
                error = %err,
                wsid = config.wsid,
                url = %event.url,
                ip = %event.remote_ip,
                useragent = %event.user_agent,
                username = event.username.as_deref().unwrap_or(""),
                "failed to deliver tracking event"
            );
        }
    }
}

/// Serialize, protect, and POST one event to `<server_url>/data/collect`.
async fn try_deliver(config: &ClientConfig, http: &Client, event: &TrackingEvent) -> Result<()> {
    let body = event.to_payload()?;

    let (data, signature) = match config.protection {
        ProtectionMode::Sign => {
            // Signature is computed over the raw JSON bytes, not the base64.
            let signature = sign_payload(&config.secret, &body);
            (BASE64.encode(&body), Some(signature))
        }
        ProtectionMode::Encrypt => {
            let ciphertext = encrypt_payload(&config.secret, &body)?;
            (BASE64.encode(ciphertext), None)
        }
    };

    let mut form: Vec<(&str, String)> = vec![("data", data), ("wsid", config.wsid.to_string())];
    if let Some(signature) = signature {
        form.push(("signature", signature));
    }

    http.post(config.collect_url())
        .form(&form)
        .send()
        .await?
        .error_for_status()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use std::time::Instant;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn sample_event() -> TrackingEvent {
        TrackingEvent::new("/login", "Mozilla/5.0 (iPad)", "123.123.123.123")
            .with_username("jsmith")
    }

    fn sync_config(server_url: &str) -> ClientConfig {
        ClientConfig::new(server_url, 7, "abcdef123456789abcdef12")
            .unwrap()
            .with_synchronous_delivery(true)
    }

    /// Decode the base64 `data` field out of a captured form body.
    fn decoded_data_field(request: &Request) -> Vec<u8> {
        let body = String::from_utf8(request.body.clone()).unwrap();
        let data = body
            .split('&')
            .find_map(|pair| pair.strip_prefix("data="))
            .expect("form body has a data field");
        let data: String = urlencoding_decode(data);
        BASE64.decode(data).expect("data field is valid base64")
    }

    /// Minimal form-urlencoding decoder for test assertions.
    fn urlencoding_decode(s: &str) -> String {
        let mut out = Vec::new();
        let mut bytes = s.bytes();
        while let Some(b) = bytes.next() {
            match b {
                b'+' => out.push(b' '),
                b'%' => {
                    let hi = bytes.next().unwrap();
                    let lo = bytes.next().unwrap();
                    let hex = [hi, lo];
                    let hex = std::str::from_utf8(&hex).unwrap();
                    out.push(u8::from_str_radix(hex, 16).unwrap());
                }
                other => out.push(other),
            }
        }
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn construction_rejects_invalid_settings() {
        for config in [
            ClientConfig {
                server_url: String::new(),
                ..sync_config("http://example.com")
            },
            ClientConfig {
                wsid: 0,
                ..sync_config("http://example.com")
            },
            ClientConfig {
                secret: String::new(),
                ..sync_config("http://example.com")
            },
        ] {
            let err = TrackingClient::new(config).unwrap_err();
            assert!(matches!(err, ClientError::InvalidSettings(_)));
        }
    }

    #[tokio::test]
    async fn constructed_client_exposes_its_config() {
        let client = TrackingClient::new(sync_config("http://example.com")).unwrap();
        assert_eq!(client.config().wsid, 7);
        assert_eq!(client.config().collect_url(), "http://example.com/data/collect");
        // Debug formatting backs unwrap/unwrap_err in the tests below
        assert!(format!("{client:?}").contains("TrackingClient"));
    }

    #[tokio::test]
    async fn delivery_posts_signed_form_to_collect_path() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/data/collect"))
            .and(body_string_contains("wsid=7"))
            .and(body_string_contains("signature="))
            .and(body_string_contains("data="))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = TrackingClient::new(sync_config(&server.uri())).unwrap();
        client.track(sample_event()).await;
    }

    #[tokio::test]
    async fn trailing_slash_server_url_posts_to_same_path() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/data/collect"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = TrackingClient::new(sync_config(&format!("{}/", server.uri()))).unwrap();
        client.track(sample_event()).await;
    }

    #[tokio::test]
    async fn signed_payload_signature_matches_transmitted_data() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/data/collect"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = TrackingClient::new(sync_config(&server.uri())).unwrap();
        client.track(sample_event()).await;

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);

        let payload = decoded_data_field(&requests[0]);
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        let signature = body
            .split('&')
            .find_map(|pair| pair.strip_prefix("signature="))
            .unwrap();
        // Server-side verification: recompute the HMAC over the decoded payload
        assert_eq!(signature, sign_payload("abcdef123456789abcdef12", &payload));

        let json = String::from_utf8(payload).unwrap();
        assert!(json.contains("\"username\":\"jsmith\""));
    }

    #[tokio::test]
    async fn encrypted_payload_decrypts_to_original_json() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/data/collect"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = sync_config(&server.uri()).with_protection(ProtectionMode::Encrypt);
        let client = TrackingClient::new(config).unwrap();
        client.track(sample_event()).await;

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);

        // No signature field in encrypt mode
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        assert!(!body.contains("signature="));

        let ciphertext = decoded_data_field(&requests[0]);
        let plaintext =
            crate::crypto::decrypt_payload("abcdef123456789abcdef12", &ciphertext).unwrap();
        assert_eq!(plaintext, sample_event().to_payload().unwrap());
    }

    #[tokio::test]
    async fn anonymous_event_omits_username_on_the_wire() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = TrackingClient::new(sync_config(&server.uri())).unwrap();
        client
            .track(TrackingEvent::new("/", "Mozilla/5.0", "8.8.8.8").with_username(""))
            .await;

        let requests = server.received_requests().await.unwrap();
        let json = String::from_utf8(decoded_data_field(&requests[0])).unwrap();
        assert!(!json.contains("username"));
    }

    #[tokio::test]
    async fn empty_event_is_a_noop_in_both_modes() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let sync_client = TrackingClient::new(sync_config(&server.uri())).unwrap();
        sync_client.track(TrackingEvent::new("", "", "")).await;

        let async_client =
            TrackingClient::new(sync_config(&server.uri()).with_synchronous_delivery(false))
                .unwrap();
        async_client.track(TrackingEvent::new("", "", "")).await;
        async_client.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn track_latency_is_independent_of_network_latency() {
        let server = MockServer::start().await;

        // Server takes 2 seconds to respond
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let config = ClientConfig::new(server.uri(), 7, "secret").unwrap();
        let client = TrackingClient::new(config).unwrap();

        let start = Instant::now();
        client.track(sample_event()).await;
        let elapsed = start.elapsed();
        assert!(
            elapsed < Duration::from_millis(500),
            "track should return immediately, took {elapsed:?}"
        );

        // The delivery still completes in the background
        client.shutdown(Duration::from_secs(5)).await;
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn network_failure_is_absorbed() {
        // Nothing listens on port 1
        let config = ClientConfig::new("http://127.0.0.1:1", 7, "secret").unwrap();
        let client = TrackingClient::new(config).unwrap();

        client.track(sample_event()).await;
        client.shutdown(Duration::from_secs(5)).await;
        // Reaching this point at all is the assertion: no panic, no error.
    }

    #[tokio::test]
    async fn network_failure_is_absorbed_in_synchronous_mode() {
        let config = ClientConfig::new("http://127.0.0.1:1", 7, "secret")
            .unwrap()
            .with_synchronous_delivery(true);
        let client = TrackingClient::new(config).unwrap();
        client.track(sample_event()).await;
    }

    #[tokio::test]
    async fn server_error_status_is_absorbed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = TrackingClient::new(sync_config(&server.uri())).unwrap();
        client.track(sample_event()).await;
    }

    #[tokio::test]
    async fn full_queue_drops_events_without_blocking() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let config = ClientConfig::new(server.uri(), 7, "secret")
            .unwrap()
            .with_queue_capacity(1);
        let client = TrackingClient::new(config).unwrap();

        // Far more events than workers + queue slots can hold while the
        // server stalls; the excess must be dropped, not block track.
        let start = Instant::now();
        for _ in 0..50 {
            client.track(sample_event()).await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn shutdown_waits_for_queued_deliveries() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/data/collect"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = ClientConfig::new(server.uri(), 7, "secret").unwrap();
        let client = TrackingClient::new(config).unwrap();
        for _ in 0..10 {
            client.track(sample_event()).await;
        }
        client.shutdown(Duration::from_secs(5)).await;

        assert_eq!(server.received_requests().await.unwrap().len(), 10);
    }
}
