//! Load generator: drives synthetic traffic through the Beacon client for
//! manual testing of a collector deployment.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use beacon_client::{ClientError, LoadTestConfig, TrackingClient, TrackingEvent};
use clap::Parser;
use rand::seq::SliceRandom;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How long to wait for in-flight deliveries after the last request.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Virtual URLs that are "called".
const URLS: &[&str] = &["/", "/login", "/register", "/get/data"];

/// Virtual source IPs.
const IPS: &[&str] = &[
    "192.168.0.1",
    "231.71.58.1",
    "91.48.8.7",
    "8.8.8.8",
    "9.9.9.9",
    "123.45.8.91",
    "188.154.5.32",
];

/// Real user agents as test data.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (iPad; U; CPU OS 3_2_1 like Mac OS X; en-us) AppleWebKit/531.21.10 (KHTML, like Gecko) Mobile/7B405",
    "Mozilla/5.0 (Linux; U; Android 2.2.1; fr-ch; A43 Build/FROYO) AppleWebKit/533.1 (KHTML, like Gecko) Version/4.0 Mobile Safari/533.1",
    "Mozilla/5.0 (iPhone; U; CPU like Mac OS X; en) AppleWebKit/420+ (KHTML, like Gecko) Version/3.0 Mobile/1A543a Safari/419.3",
    "Mozilla/5.0 (iPod; U; CPU like Mac OS X; en) AppleWebKit/420+ (KHTML, like Gecko) Version/3.0 Mobile/1A543a Safari/419.3",
];

/// Usernames, with empty entries doubling the chances of an anonymous request.
const USERNAMES: &[&str] = &["jsmith", "fmuller", "jdoe", "", ""];

#[derive(Parser)]
#[command(
    name = "beacon-loadgen",
    about = "Fire randomized tracking events at a Beacon collector",
    version
)]
struct Cli {
    /// Number of simulated requests to fire concurrently
    requests: u32,

    /// Path to a TOML config file with a [loadtest] section (url, wsid, secret)
    config: String,
}

/// Build one randomized tracking event from the sample pools.
fn random_event() -> TrackingEvent {
    let mut rng = rand::thread_rng();
    let url = *URLS.choose(&mut rng).unwrap();
    let ip = *IPS.choose(&mut rng).unwrap();
    let ua = *USER_AGENTS.choose(&mut rng).unwrap();
    let username = *USERNAMES.choose(&mut rng).unwrap();
    TrackingEvent::new(url, ua, ip).with_username(username)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = LoadTestConfig::load(&cli.config)
        .and_then(LoadTestConfig::into_client_config)
        .with_context(|| format!("loading {}", cli.config))?;

    let client = Arc::new(TrackingClient::new(config)?);
    info!(requests = cli.requests, "starting load run");

    let tasks: Vec<_> = (0..cli.requests)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                let event = random_event();
                client.track(event).await;
            })
        })
        .collect();

    for task in tasks {
        task.await?;
    }

    if let Some(client) = Arc::into_inner(client) {
        client.shutdown(SHUTDOWN_GRACE).await;
    }

    info!(requests = cli.requests, "all requests submitted");
    println!("All done.");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let config_problem = err.chain().any(|cause| {
                matches!(
                    cause.downcast_ref::<ClientError>(),
                    Some(
                        ClientError::InvalidSettings(_)
                            | ClientError::Config(_)
                            | ClientError::Io(_)
                    )
                )
            });
            if config_problem {
                eprintln!("Please provide a valid config file! See demos/loadtest.toml for an example.");
            } else {
                eprintln!("USAGE: beacon-loadgen <number of requests> <path to config>");
            }
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
