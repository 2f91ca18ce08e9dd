//! Fire-and-forget beacon delivery.
//!
//! # Responsibilities
//! - Accept beacons from request tasks without blocking them
//! - Send them to `<umami_host>/api/send` with bounded concurrency
//! - Drain queued and in-flight beacons once the server has stopped
//!
//! # Design Decisions
//! - Bounded queue; a full queue drops the beacon and logs it
//! - Beacons never inherit the request's cancellation: the worker owns them
//! - The worker keeps accepting beacons until every sender is gone or its
//!   owner calls [`BeaconWorker::shutdown`] after the last request finished
//! - Single attempt, no retries; failures are logged and counted only

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::TrackingQueueConfig;
use crate::observability::metrics;
use crate::tracking::payload::TrackingEvent;

/// Request-side handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BeaconSender {
    tx: mpsc::Sender<TrackingEvent>,
}

impl BeaconSender {
    /// Queue a beacon. Returns `false` if it was dropped.
    pub fn dispatch(&self, event: TrackingEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Beacon queue full, dropping tracking event");
                metrics::record_beacon("dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Beacon worker stopped, dropping tracking event");
                metrics::record_beacon("dropped");
                false
            }
        }
    }
}

/// Owner of the worker task.
pub struct BeaconWorker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl BeaconWorker {
    /// Stop accepting beacons, send what is queued and wait for in-flight
    /// sends (bounded by the drain timeout).
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Beacon worker panicked");
        }
    }
}

/// Start the beacon worker.
pub fn spawn(
    client: reqwest::Client,
    endpoint: String,
    config: &TrackingQueueConfig,
) -> (BeaconSender, BeaconWorker) {
    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let (stop, stop_rx) = oneshot::channel();
    let worker = Worker {
        client,
        endpoint,
        permits: Arc::new(Semaphore::new(config.max_in_flight)),
        drain_timeout: Duration::from_secs(config.drain_timeout_secs),
    };
    let handle = tokio::spawn(worker.run(rx, stop_rx));
    (BeaconSender { tx }, BeaconWorker { stop, handle })
}

struct Worker {
    client: reqwest::Client,
    endpoint: String,
    permits: Arc<Semaphore>,
    drain_timeout: Duration,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<TrackingEvent>, mut stop: oneshot::Receiver<()>) {
        tracing::info!(endpoint = %self.endpoint, "Beacon worker starting");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.start(&mut in_flight, event).await,
                    None => break,
                },
                _ = &mut stop => {
                    rx.close();
                    while let Some(event) = rx.recv().await {
                        self.start(&mut in_flight, event).await;
                    }
                    break;
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        let pending = in_flight.len();
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        match drained {
            Ok(()) => tracing::info!(pending, "Beacon worker drained"),
            Err(_) => {
                tracing::warn!(remaining = in_flight.len(), "Beacon drain timed out, aborting sends");
                in_flight.abort_all();
            }
        }
    }

    async fn start(&self, in_flight: &mut JoinSet<()>, event: TrackingEvent) {
        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            return;
        };
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        in_flight.spawn(async move {
            send_beacon(&client, &endpoint, event).await;
            drop(permit);
        });
    }
}

/// Send one beacon. Failures are logged, never returned.
pub async fn send_beacon(client: &reqwest::Client, endpoint: &str, event: TrackingEvent) {
    let TrackingEvent { body, mut headers } = event;
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    match client.post(endpoint).headers(headers).json(&body).send().await {
        Ok(response) if response.status().is_success() => {
            metrics::record_beacon("sent");
        }
        Ok(response) => {
            tracing::warn!(status = %response.status(), "Tracking request rejected");
            metrics::record_beacon("rejected");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Tracking request failed");
            metrics::record_beacon("failed");
        }
    }
}
