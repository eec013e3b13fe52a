//! Cache Statistics Module
//!
//! Tracks cache performance counters. Every counter is safe to bump from any
//! request task without a lock held across I/O.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

// == Cache Stats ==
/// Live counters shared by every cache component.
///
/// `path_hits` and `path_deaths` hold one entry per distinct content path and
/// live as long as the process. A purge drops the purged paths' entries; a
/// path that merely expires keeps its counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    errors: AtomicU64,
    deaths: AtomicU64,
    avatar_hits: AtomicU64,
    avatar_creations: AtomicU64,
    path_hits: DashMap<String, u64>,
    path_deaths: DashMap<String, u64>,
    conversions: DashMap<String, u64>,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub errors: u64,
    pub deaths: u64,
    pub avatar_hits: u64,
    pub avatar_creations: u64,
    pub path_hits: BTreeMap<String, u64>,
    pub path_deaths: BTreeMap<String, u64>,
    pub conversions: BTreeMap<String, u64>,
}

impl StatsSnapshot {
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a content hit for `path`.
    pub fn record_hit(&self, path: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        bump(&self.path_hits, path);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful origin population.
    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the removal of an expired entry.
    pub fn record_death(&self, path: &str) {
        self.deaths.fetch_add(1, Ordering::Relaxed);
        bump(&self.path_deaths, path);
    }

    /// Records a variant freshly encoded to `format`.
    pub fn record_conversion(&self, format: &str) {
        bump(&self.conversions, format);
    }

    pub fn record_avatar_hit(&self) {
        self.avatar_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_avatar_creation(&self) {
        self.avatar_creations.fetch_add(1, Ordering::Relaxed);
    }

    /// Deaths recorded for a single path.
    pub fn deaths_for(&self, path: &str) -> u64 {
        self.path_deaths.get(path).map(|v| *v).unwrap_or(0)
    }

    /// Drops the per-path counters of `path`. Aggregate counters are kept.
    pub fn forget_path(&self, path: &str) {
        self.path_hits.remove(path);
        self.path_deaths.remove(path);
    }

    // == Snapshot ==
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            deaths: self.deaths.load(Ordering::Relaxed),
            avatar_hits: self.avatar_hits.load(Ordering::Relaxed),
            avatar_creations: self.avatar_creations.load(Ordering::Relaxed),
            path_hits: collect(&self.path_hits),
            path_deaths: collect(&self.path_deaths),
            conversions: collect(&self.conversions),
        }
    }
}

fn bump(map: &DashMap<String, u64>, label: &str) {
    *map.entry(label.to_string()).or_insert(0) += 1;
}

fn collect(map: &DashMap<String, u64>) -> BTreeMap<String, u64> {
    map.iter()
        .map(|entry| (entry.key().clone(), *entry.value()))
        .collect()
}
