//! Retrying HTTP probe client
//!
//! Up to `max_retries` attempts with exponential backoff; each attempt
//! is bounded by the per-request timeout. Connection-refused is
//! terminal — the host answered with a rejection, so further attempts
//! only delay the `inactive` verdict.

use std::net::Ipv4Addr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{instrument, trace};

/// Why a probe produced no HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The target actively refused the connection
    ConnectionRefused,

    /// Timeout, DNS, reset or any other transport error after all
    /// retries were exhausted
    Transport(String),
}

/// Outcome of one probe, successful or not. `attempts` is 1-based and
/// counts the attempt that settled the outcome.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub status_code: Option<u16>,
    pub failure: Option<ProbeFailure>,
    pub attempts: u32,
    /// Wall time right after the settling attempt.
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ProbeClient {
    client: reqwest::Client,
    max_retries: u32,
    initial_backoff: Duration,
}

impl ProbeClient {
    pub fn new(max_retries: u32, request_timeout: Duration, initial_backoff: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(request_timeout)
                .build()
                .expect("probe client construction is infallible with these options"),
            max_retries: max_retries.max(1),
            initial_backoff,
        }
    }

    /// Probe the server's health endpoint. Never returns an error:
    /// every way an attempt can end maps onto a `ProbeOutcome`.
    #[instrument(skip(self), fields(%ipv4, port))]
    pub async fn check(&self, ipv4: Ipv4Addr, port: u16, health_endpoint: &str) -> ProbeOutcome {
        let endpoint = if health_endpoint.starts_with('/') {
            health_endpoint.to_string()
        } else {
            format!("/{health_endpoint}")
        };
        let url = format!("http://{ipv4}:{port}{endpoint}");

        let mut backoff = self.initial_backoff;
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            trace!("attempt {attempt} for {url}");

            match self.client.get(&url).send().await {
                Ok(response) => {
                    return ProbeOutcome {
                        status_code: Some(response.status().as_u16()),
                        failure: None,
                        attempts: attempt,
                        timestamp: Utc::now(),
                    };
                }
                Err(e) if is_connection_refused(&e) => {
                    return ProbeOutcome {
                        status_code: None,
                        failure: Some(ProbeFailure::ConnectionRefused),
                        attempts: attempt,
                        timestamp: Utc::now(),
                    };
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < self.max_retries {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        ProbeOutcome {
            status_code: None,
            failure: Some(ProbeFailure::Transport(last_error)),
            attempts: self.max_retries,
            timestamp: Utc::now(),
        }
    }
}

/// Walk the source chain for an I/O connection-refused error.
fn is_connection_refused(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = cause.source();
    }
    false
}
