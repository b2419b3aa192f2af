//! Elevation service backed by the connected map client.
//!
//! Each batch goes out as an `ELEVATION_REQUEST` frame and waits for the
//! `ELEVATION_RESPONSE` carrying the same request id.

use futures::future::{BoxFuture, FutureExt};
use pv_core::geometry::LatLng;
use pv_core::topography::{ElevationError, ElevationService};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

type Reply = Result<Vec<f64>, ElevationError>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElevationRequest<'a> {
    pub request_id: u64,
    pub points: &'a [LatLng],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElevationResponse {
    pub request_id: u64,
    #[serde(default)]
    pub heights: Option<Vec<f64>>,
    /// Set instead of `heights` when the client's provider failed.
    #[serde(default)]
    pub error: Option<String>,
}

pub struct ElevationRelay {
    outbound: mpsc::UnboundedSender<String>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    next_request: AtomicU64,
    last_sent: Mutex<Option<Instant>>,
    timeout: Duration,
    batch_delay: Duration,
}

impl ElevationRelay {
    pub fn new(outbound: mpsc::UnboundedSender<String>, timeout: Duration, batch_delay: Duration) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            next_request: AtomicU64::new(1),
            last_sent: Mutex::new(None),
            timeout,
            batch_delay,
        }
    }

    /// Hand a client answer to the waiting batch. Returns false for unknown
    /// or already expired request ids.
    pub fn resolve(&self, response: ElevationResponse) -> bool {
        let Some(waiter) = self.take_pending(response.request_id) else {
            warn!(request = response.request_id, "elevation response for no pending request");
            return false;
        };
        let reply = match (response.heights, response.error) {
            (_, Some(message)) => Err(ElevationError::Service(message)),
            (Some(heights), None) => Ok(heights),
            (None, None) => Err(ElevationError::Service("response carried no heights".to_string())),
        };
        waiter.send(reply).is_ok()
    }

    /// Fail every outstanding batch, e.g. when the socket closes.
    pub fn fail_pending(&self) {
        let waiters: Vec<_> = match self.pending.lock() {
            Ok(mut pending) => pending.drain().map(|(_, w)| w).collect(),
            Err(_) => return,
        };
        for waiter in waiters {
            let _ = waiter.send(Err(ElevationError::Disconnected));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn take_pending(&self, id: u64) -> Option<oneshot::Sender<Reply>> {
        self.pending.lock().ok()?.remove(&id)
    }

    /// Time left before the next batch may go out, and mark it as sent.
    fn reserve_slot(&self) -> Duration {
        let now = Instant::now();
        let Ok(mut last) = self.last_sent.lock() else {
            return Duration::ZERO;
        };
        let send_at = match *last {
            Some(prev) => (prev + self.batch_delay).max(now),
            None => now,
        };
        *last = Some(send_at);
        send_at - now
    }

    async fn request(&self, points: &[LatLng]) -> Reply {
        let wait = self.reserve_slot();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| ElevationError::Disconnected)?
            .insert(request_id, tx);

        let frame = serde_json::to_string(&ElevationRequest { request_id, points })
            .map_err(|e| ElevationError::Service(e.to_string()))?;
        if self.outbound.send(format!("ELEVATION_REQUEST:{}", frame)).is_err() {
            self.take_pending(request_id);
            return Err(ElevationError::Disconnected);
        }
        debug!(request = request_id, points = points.len(), "elevation batch sent");

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(ElevationError::Disconnected),
            Err(_) => {
                self.take_pending(request_id);
                warn!(request = request_id, "elevation batch timed out");
                Err(ElevationError::Timeout)
            }
        }
    }
}

impl ElevationService for ElevationRelay {
    fn query_elevations<'a>(&'a self, points: &'a [LatLng]) -> BoxFuture<'a, Result<Vec<f64>, ElevationError>> {
        self.request(points).boxed()
    }
}
