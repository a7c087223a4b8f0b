//! Remote miner notifications
//!
//! Every time new work is pushed, each configured endpoint receives an HTTP
//! POST with either the compact work package or the full candidate header.
//! Requests run as independent tasks with a one second timeout; failures are
//! logged and otherwise ignored.

use crate::WorkPackage;
use alloy_consensus::Header;
use reqwest::{Client, header::CONTENT_TYPE};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// Timeout for a single notification request
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(1);

/// Fans new work out to notification endpoints
#[derive(Debug)]
pub struct Notifier {
    urls: Vec<String>,
    full: bool,
    client: Client,
    cancel: CancellationToken,
    requests: JoinSet<()>,
}

impl Notifier {
    /// Create a notifier for `urls`. With `full` set the candidate header is
    /// sent instead of the work package.
    pub fn new(urls: Vec<String>, full: bool) -> Self {
        let client = Client::builder().timeout(NOTIFY_TIMEOUT).build().unwrap_or_else(|err| {
            warn!(target: "liberty::notify", %err, "Falling back to default HTTP client");
            Client::new()
        });
        Self { urls, full, client, cancel: CancellationToken::new(), requests: JoinSet::new() }
    }

    /// Number of notification requests still in flight
    pub fn pending(&self) -> usize {
        self.requests.len()
    }

    /// Notify every endpoint about `work`, derived from `header`.
    pub fn notify(&mut self, work: &WorkPackage, header: &Header) {
        if self.urls.is_empty() {
            return;
        }
        let blob = if self.full { serde_json::to_vec(header) } else { serde_json::to_vec(work) };
        let blob = match blob {
            Ok(blob) => blob,
            Err(err) => {
                warn!(target: "liberty::notify", %err, "Can't encode remote miner notification");
                return;
            }
        };

        for url in &self.urls {
            let request = self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(blob.clone());
            let cancel = self.cancel.clone();
            let url = url.clone();
            let work = *work;

            self.requests.spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        trace!(target: "liberty::notify", miner = %url, "Remote miner notification cancelled");
                    }
                    res = request.send() => match res {
                        Ok(resp) if resp.status().is_success() => trace!(
                            target: "liberty::notify",
                            miner = %url,
                            hash = %work.seal_hash,
                            boundary = %work.target,
                            "Notified remote miner"
                        ),
                        Ok(resp) => warn!(
                            target: "liberty::notify",
                            miner = %url,
                            status = %resp.status(),
                            "Remote miner rejected notification"
                        ),
                        Err(err) => warn!(
                            target: "liberty::notify",
                            miner = %url,
                            %err,
                            "Failed to notify remote miner"
                        ),
                    }
                }
            });
        }
    }

    /// Wait for the next notification request to finish.
    ///
    /// Resolves to `None` immediately when nothing is in flight.
    pub async fn join_next(&mut self) -> Option<()> {
        self.requests.join_next().await.map(|res| {
            if let Err(err) = res {
                warn!(target: "liberty::notify", %err, "Notification task failed");
            }
        })
    }

    /// Cancel all in-flight requests and wait for them to finish.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        while self.join_next().await.is_some() {}
    }
}
