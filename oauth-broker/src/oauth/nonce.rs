//! Single-use registry of outstanding state nonces.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::Error;

/// Trait for storing pending nonces between flow initiation and callback.
///
/// `consume` must be a single atomic check-and-remove: when two callers race on the same
/// nonce, exactly one of them gets `true`. Multi-instance deployments need an
/// implementation backed by a shared expiring key-value store.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Record a freshly issued nonce that stays consumable until `expires_at`.
    async fn register(&self, nonce: &str, expires_at: DateTime<Utc>) -> Result<(), Error>;

    /// Atomically remove a nonce, returning whether it was pending and unexpired.
    async fn consume(&self, nonce: &str) -> Result<bool, Error>;

    /// Whether a nonce is pending and unexpired, without consuming it.
    async fn is_pending(&self, nonce: &str) -> Result<bool, Error>;

    /// Number of entries currently held, expired-but-unswept entries included.
    async fn pending_count(&self) -> Result<usize, Error>;
}

/// Stale order entries tolerated before the order queue is compacted.
const COMPACT_SLACK: usize = 64;

#[derive(Default)]
struct Pending {
    expiry: HashMap<String, DateTime<Utc>>,
    /// Insertion order. May hold nonces already consumed; those are skipped.
    order: VecDeque<String>,
}

impl Pending {
    /// Drop expired and consumed entries from the head of the queue.
    fn sweep(&mut self, now: DateTime<Utc>) {
        while let Some(front) = self.order.front() {
            match self.expiry.get(front) {
                Some(expires_at) if *expires_at >= now => break,
                Some(_) => {
                    if let Some(nonce) = self.order.pop_front() {
                        self.expiry.remove(&nonce);
                    }
                }
                None => {
                    self.order.pop_front();
                }
            }
        }

        if self.order.len() > self.expiry.len() * 2 + COMPACT_SLACK {
            let expiry = &self.expiry;
            self.order.retain(|nonce| expiry.contains_key(nonce));
        }
    }

    fn evict_oldest(&mut self) {
        while let Some(nonce) = self.order.pop_front() {
            if self.expiry.remove(&nonce).is_some() {
                return;
            }
        }
    }
}

/// In-process nonce store with a fixed capacity.
///
/// At capacity the oldest registered nonce is evicted before a new one is inserted, so
/// memory stays bounded regardless of issuance rate.
pub struct InMemoryNonceStore {
    pending: Mutex<Pending>,
    capacity: usize,
}

impl InMemoryNonceStore {
    /// Create a store holding at most `capacity` nonces (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[async_trait]
impl NonceStore for InMemoryNonceStore {
    async fn register(&self, nonce: &str, expires_at: DateTime<Utc>) -> Result<(), Error> {
        let mut pending = self.pending.lock().await;
        pending.sweep(Utc::now());

        if let Some(existing) = pending.expiry.get_mut(nonce) {
            *existing = expires_at;
            return Ok(());
        }

        while pending.expiry.len() >= self.capacity {
            pending.evict_oldest();
        }

        pending.expiry.insert(nonce.to_string(), expires_at);
        pending.order.push_back(nonce.to_string());
        Ok(())
    }

    async fn consume(&self, nonce: &str) -> Result<bool, Error> {
        let now = Utc::now();
        let mut pending = self.pending.lock().await;
        pending.sweep(now);

        Ok(matches!(pending.expiry.remove(nonce), Some(expires_at) if expires_at >= now))
    }

    async fn is_pending(&self, nonce: &str) -> Result<bool, Error> {
        let pending = self.pending.lock().await;
        Ok(matches!(pending.expiry.get(nonce), Some(expires_at) if *expires_at >= Utc::now()))
    }

    async fn pending_count(&self) -> Result<usize, Error> {
        Ok(self.pending.lock().await.expiry.len())
    }
}
