//! Pending request store: the single inbound demultiplexer.
//!
//! Maps correlation IDs to waiting queries. Every exit path (response,
//! timeout, send failure, shutdown) goes through one `DashMap::remove`, so a
//! request is released exactly once no matter which path wins.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::ChannelError;
use crate::domain::query::Spot;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a waiting query eventually receives.
pub type QueryOutcome = Result<Vec<Spot>, ChannelError>;

/// A pending request waiting for response
struct PendingRequest {
    /// Channel to send response
    sender: oneshot::Sender<QueryOutcome>,
    /// When request was created
    created_at: Instant,
}

/// Statistics for pending request store
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total requests registered
    pub total_registered: AtomicU64,
    /// Total requests completed by a response
    pub total_completed: AtomicU64,
    /// Total requests timed out
    pub total_timeouts: AtomicU64,
    /// Total requests cancelled (send failure, dropped caller, shutdown)
    pub total_cancelled: AtomicU64,
}

/// Point-in-time copy of [`PendingStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingSnapshot {
    pub in_flight: usize,
    pub total_registered: u64,
    pub total_completed: u64,
    pub total_timeouts: u64,
    pub total_cancelled: u64,
}

/// Pending request store.
///
/// Flow:
/// 1. Correlator calls `register()` to get an id and a oneshot receiver
/// 2. Correlator sends the request carrying the id
/// 3. The connection reader calls `complete()` when the echoed id arrives
/// 4. Correlator awaits the receiver or calls `expire()` on timeout
#[derive(Default)]
pub struct PendingRequests {
    pending: DashMap<CorrelationId, PendingRequest>,
    stats: PendingStats,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request under a fresh correlation ID.
    pub fn register(&self) -> (CorrelationId, oneshot::Receiver<QueryOutcome>) {
        let (tx, rx) = oneshot::channel();

        // v7 ids only collide if the random suffix does; draw again if so.
        let correlation_id = loop {
            let candidate = CorrelationId::new();
            if !self.pending.contains_key(&candidate) {
                break candidate;
            }
        };

        self.pending.insert(
            correlation_id,
            PendingRequest {
                sender: tx,
                created_at: Instant::now(),
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(correlation_id = %correlation_id, "Registered pending request");

        (correlation_id, rx)
    }

    /// Complete a pending request with its outcome.
    ///
    /// Returns true if the request was found and its caller was still waiting.
    pub fn complete(&self, correlation_id: CorrelationId, outcome: QueryOutcome) -> bool {
        let Some((_, pending)) = self.pending.remove(&correlation_id) else {
            warn!(
                correlation_id = %correlation_id,
                "Response for unknown or expired correlation ID"
            );
            return false;
        };

        let response_time = pending.created_at.elapsed();
        match pending.sender.send(outcome) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    response_time_ms = response_time.as_millis() as u64,
                    "Completed pending request"
                );
                true
            }
            Err(_) => {
                // Caller stopped waiting
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    "Pending request receiver dropped"
                );
                false
            }
        }
    }

    /// Drop a request whose deadline passed. Returns false if a response won.
    pub fn expire(&self, correlation_id: &CorrelationId) -> bool {
        if self.pending.remove(correlation_id).is_some() {
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Drop a request without resolving it.
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        if self.pending.remove(correlation_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Fail every outstanding request with `error`. Returns how many were failed.
    pub fn fail_all(&self, error: ChannelError) -> usize {
        let ids: Vec<CorrelationId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                let _ = pending.sender.send(Err(error.clone()));
                failed += 1;
            }
        }
        failed
    }

    /// Get number of currently pending requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn snapshot(&self) -> PendingSnapshot {
        PendingSnapshot {
            in_flight: self.pending_count(),
            total_registered: self.stats.total_registered.load(Ordering::Relaxed),
            total_completed: self.stats.total_completed.load(Ordering::Relaxed),
            total_timeouts: self.stats.total_timeouts.load(Ordering::Relaxed),
            total_cancelled: self.stats.total_cancelled.load(Ordering::Relaxed),
        }
    }
}
