//! Request Coalescing
//!
//! Collapses concurrent calls for the same key into one execution. The first
//! caller for a key spawns the work as its own task; every caller, the first
//! included, then waits on a watch channel for the shared result.
//!
//! Dropping a waiting future stops only that caller's wait. The spawned work
//! runs to completion regardless, so the remaining waiters still get their
//! answer and whatever the work persisted stays persisted.

use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::error::{CdnError, Result};

type Flight<T> = watch::Receiver<Option<Result<T>>>;

// == Coalescer ==
/// Per-key in-flight call deduplication.
pub struct Coalescer<T> {
    flights: Arc<DashMap<String, Flight<T>>>,
}

impl<T> Clone for Coalescer<T> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<T> Default for Coalescer<T> {
    fn default() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
        }
    }
}

impl<T> Coalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    // == Run ==
    /// Runs `work` for `key` unless a call for `key` is already in flight,
    /// then waits for the shared result.
    ///
    /// `work` is only invoked by the caller that starts the flight.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut flight = match self.flights.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                debug!(key, "joining in-flight call");
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(None);
                slot.insert(rx.clone());

                let landing = Landing {
                    flights: Arc::clone(&self.flights),
                    key: key.to_string(),
                };
                let fut = work();
                tokio::spawn(async move {
                    let result = fut.await;
                    // clear the key first so late arrivals start a fresh call
                    drop(landing);
                    let _ = tx.send(Some(result));
                });
                rx
            }
        };

        let outcome = flight.wait_for(Option::is_some).await;
        match outcome {
            Ok(shared) => shared.clone().unwrap_or_else(|| {
                Err(CdnError::Internal("coalesced call ended empty".to_string()))
            }),
            Err(_) => {
                error!(key, "coalesced call panicked before producing a result");
                Err(CdnError::Internal(format!(
                    "in-flight call for {} was abandoned",
                    key
                )))
            }
        }
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }
}

/// Removes a flight from the map when the spawned work finishes or unwinds.
struct Landing<T> {
    flights: Arc<DashMap<String, Flight<T>>>,
    key: String,
}

impl<T> Drop for Landing<T> {
    fn drop(&mut self) {
        self.flights.remove(&self.key);
    }
}
