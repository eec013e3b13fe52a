//! Cache Context
//!
//! The shared, process-lifetime state that every cache component reads and
//! writes: counters and the conditional-fetch (ETag) index. Built once at
//! startup and handed to each component behind an `Arc`.

use dashmap::DashMap;

use crate::cache::CacheStats;

// == Cache Context ==
#[derive(Debug, Default)]
pub struct CacheContext {
    pub stats: CacheStats,
    etags: DashMap<String, String>,
}

impl CacheContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers the ETag last served for `path`.
    pub fn remember_etag(&self, path: &str, etag: &str) {
        self.etags.insert(path.to_string(), etag.to_string());
    }

    pub fn forget_etag(&self, path: &str) {
        self.etags.remove(path);
    }

    pub fn etag_for(&self, path: &str) -> Option<String> {
        self.etags.get(path).map(|etag| etag.value().clone())
    }

    /// Whether an `If-None-Match` header value names the ETag known for `path`.
    ///
    /// Accepts comma-separated lists, `*`, and weak validators.
    pub fn matches_etag(&self, path: &str, if_none_match: &str) -> bool {
        let Some(known) = self.etag_for(path) else {
            return false;
        };
        let known = strip_weak(&known);

        if_none_match
            .split(',')
            .map(str::trim)
            .any(|candidate| candidate == "*" || strip_weak(candidate) == known)
    }
}

fn strip_weak(etag: &str) -> &str {
    etag.strip_prefix("W/").unwrap_or(etag)
}
