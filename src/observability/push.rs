//! Periodic pushgateway delivery.
//!
//! # Responsibilities
//! - Gather the local metrics snapshot every interval
//! - POST it to `{addr}/metrics/job/dbserver/instance/{instance}`
//! - Log and count failures without ever stopping the loop
//!
//! The task runs detached and is abandoned at process exit.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use url::Url;

use crate::observability::logging::error_chain;
use crate::observability::metrics::{self, Gatherer};

/// Job label used in the push path.
pub const JOB: &str = "dbserver";

/// Instance label when the host name cannot be resolved.
pub const UNKNOWN_INSTANCE: &str = "unknown";

#[derive(Debug, Error)]
pub enum PushError {
    #[error("invalid pushgateway address {0:?}")]
    Address(String),

    #[error("push request failed")]
    Request(#[from] reqwest::Error),

    #[error("pushgateway answered {0}")]
    Status(reqwest::StatusCode),
}

/// Delivers one rendered snapshot to the collector.
pub trait PushClient: Send + Sync + 'static {
    fn push(&self, url: &Url, body: String) -> impl Future<Output = Result<(), PushError>> + Send;
}

/// `reqwest`-backed push client.
#[derive(Debug, Clone, Default)]
pub struct HttpPushClient {
    client: reqwest::Client,
}

impl HttpPushClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PushClient for HttpPushClient {
    async fn push(&self, url: &Url, body: String) -> Result<(), PushError> {
        let response = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Status(status));
        }
        Ok(())
    }
}

/// Instance label derived from the host name and SQL port.
pub fn instance_name(port: u16) -> String {
    match hostname::get() {
        Ok(name) if !name.is_empty() => format!("{}_{}", name.to_string_lossy(), port),
        _ => UNKNOWN_INSTANCE.to_string(),
    }
}

/// Build the push URL. A bare `host:port` gets an `http://` scheme.
pub fn push_url(addr: &str, instance: &str) -> Result<Url, PushError> {
    let base = if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    };
    let mut url = Url::parse(&base).map_err(|_| PushError::Address(addr.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| PushError::Address(addr.to_string()))?
        .pop_if_empty()
        .extend(["metrics", "job", JOB, "instance", instance]);
    Ok(url)
}

/// Start the pusher.
///
/// Returns `None` without spawning anything when `addr` is empty, `interval`
/// is zero or the address cannot form a URL.
pub fn start_pusher<G, C>(
    addr: &str,
    interval: Duration,
    instance: &str,
    gatherer: Arc<G>,
    client: C,
) -> Option<JoinHandle<()>>
where
    G: Gatherer,
    C: PushClient,
{
    if addr.is_empty() || interval.is_zero() {
        tracing::info!(
            address = addr,
            interval = ?interval,
            "Metrics push is disabled"
        );
        return None;
    }

    let url = match push_url(addr, instance) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(error = %e, "Metrics push is disabled");
            return None;
        }
    };

    tracing::info!(url = %url, interval = ?interval, "Starting metrics pusher");

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes at once, so the first push is at startup.
        loop {
            ticker.tick().await;
            let body = gatherer.gather();
            if let Err(e) = client.push(&url, body).await {
                metrics::record_push_failure();
                tracing::error!(url = %url, error = %error_chain(&e), "Could not push metrics");
            }
        }
    }))
}
