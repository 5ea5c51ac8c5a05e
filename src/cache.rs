//! Time-boxed in-memory cache with single-flight refresh.
//!
//! An entry is fresh while `now - computed_at < ttl`. On a miss exactly one
//! caller runs the producer; concurrent callers for the same key wait for it
//! and share its value or its failure. A failed refresh leaves the previous
//! entry untouched and writes nothing, so the next call simply retries.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::error::FuelError;

type Outcome<V, E> = Option<Result<V, E>>;

struct CacheEntry<V> {
    value: V,
    computed_at: Instant,
    stored_at: DateTime<Utc>,
}

struct Slot<V, E> {
    entry: Option<CacheEntry<V>>,
    in_flight: Option<watch::Receiver<Outcome<V, E>>>,
}

impl<V, E> Default for Slot<V, E> {
    fn default() -> Self {
        Self {
            entry: None,
            in_flight: None,
        }
    }
}

/// A copy of a stored value together with its age, returned regardless of
/// freshness so callers can fall back to stale data.
#[derive(Debug, Clone)]
pub struct Cached<V> {
    pub value: V,
    pub stored_at: DateTime<Utc>,
    pub age: Duration,
}

enum Role<V, E> {
    Hit(V),
    Wait(watch::Receiver<Outcome<V, E>>),
    Lead(watch::Sender<Outcome<V, E>>),
}

/// Keyed cache whose entries expire after a per-call TTL.
///
/// Values are handed out as clones; wrap large values in `Arc`.
pub struct TimedCache<V, E = FuelError> {
    slots: Mutex<HashMap<String, Slot<V, E>>>,
}

impl<V, E> Default for TimedCache<V, E> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone, E: Clone> TimedCache<V, E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot<V, E>>> {
        // A panic elsewhere cannot leave a slot half-written, so a poisoned
        // map is still consistent.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached value for `key` if younger than `ttl`, otherwise
    /// runs `compute` (at most once across concurrent callers) and stores
    /// its value.
    ///
    /// # Errors
    ///
    /// Propagates the producer's failure to every caller that was waiting on
    /// this computation. The failure is not cached.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let sender = loop {
            let role = {
                let mut slots = self.lock();
                let slot = slots.entry(key.to_string()).or_default();
                let fresh = slot
                    .entry
                    .as_ref()
                    .filter(|e| e.computed_at.elapsed() < ttl)
                    .map(|e| e.value.clone());
                match (fresh, slot.in_flight.clone()) {
                    (Some(value), _) => Role::Hit(value),
                    (None, Some(rx)) => Role::Wait(rx),
                    (None, None) => {
                        let (tx, rx) = watch::channel(None);
                        slot.in_flight = Some(rx);
                        Role::Lead(tx)
                    }
                }
            };

            match role {
                Role::Hit(value) => {
                    debug!(key, "Cache hit");
                    return Ok(value);
                }
                Role::Lead(tx) => break tx,
                Role::Wait(mut rx) => {
                    debug!(key, "Waiting on in-flight computation");
                    if let Some(outcome) = wait_for(&mut rx).await {
                        return outcome;
                    }
                    debug!(key, "In-flight computation abandoned, retrying");
                }
            }
        };

        debug!(key, "Cache miss, computing");
        let flight = InFlight {
            cache: self,
            key,
            sender: Some(sender),
        };
        let outcome = compute().await;
        flight.complete(&outcome);
        outcome
    }

    /// Last stored value for `key`, fresh or not.
    pub fn cached(&self, key: &str) -> Option<Cached<V>> {
        let slots = self.lock();
        let entry = slots.get(key)?.entry.as_ref()?;
        Some(Cached {
            value: entry.value.clone(),
            stored_at: entry.stored_at,
            age: entry.computed_at.elapsed(),
        })
    }

    /// Drops the stored value for `key`. An in-flight computation still
    /// completes and stores its result.
    pub fn invalidate(&self, key: &str) {
        if let Some(slot) = self.lock().get_mut(key) {
            slot.entry = None;
        }
    }

    /// Number of keys holding a value.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|s| s.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Waits for the leader's outcome. `None` means the leader went away
/// without producing one.
async fn wait_for<V: Clone, E: Clone>(rx: &mut watch::Receiver<Outcome<V, E>>) -> Outcome<V, E> {
    loop {
        if let Some(outcome) = rx.borrow_and_update().clone() {
            return Some(outcome);
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}

/// Leader-side bookkeeping for one computation. Dropping it without
/// `complete` (the leader's future was cancelled) clears the in-flight marker
/// so a waiter can take over.
struct InFlight<'a, V: Clone, E: Clone> {
    cache: &'a TimedCache<V, E>,
    key: &'a str,
    sender: Option<watch::Sender<Outcome<V, E>>>,
}

impl<V: Clone, E: Clone> InFlight<'_, V, E> {
    fn complete(mut self, outcome: &Result<V, E>) {
        {
            let mut slots = self.cache.lock();
            let slot = slots.entry(self.key.to_string()).or_default();
            match outcome {
                Ok(value) => {
                    slot.entry = Some(CacheEntry {
                        value: value.clone(),
                        computed_at: Instant::now(),
                        stored_at: Utc::now(),
                    });
                    debug!(key = self.key, "Cache entry stored");
                }
                Err(_) => debug!(key = self.key, "Computation failed, entry left unchanged"),
            }
            slot.in_flight = None;
        }
        if let Some(sender) = self.sender.take() {
            sender.send_replace(Some(outcome.clone()));
        }
    }
}

impl<V: Clone, E: Clone> Drop for InFlight<'_, V, E> {
    fn drop(&mut self) {
        if self.sender.is_some() {
            if let Some(slot) = self.cache.lock().get_mut(self.key) {
                slot.in_flight = None;
            }
            // Sender drops after this, waking waiters to retry.
        }
    }
}
