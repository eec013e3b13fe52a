//! Response DTOs for the media edge API
//!
//! Defines the structure of outgoing JSON response bodies.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::StatsSnapshot;

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Every counter, flattened into the top level
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    /// Content hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Stored keys per admin namespace
    pub entries: BTreeMap<String, usize>,
    /// Every namespace present in the store
    pub namespaces: Vec<String>,
}

impl StatsResponse {
    /// Creates a new StatsResponse from a counter snapshot
    pub fn new(
        counters: StatsSnapshot,
        entries: BTreeMap<String, usize>,
        mut namespaces: Vec<String>,
    ) -> Self {
        let hit_rate = counters.hit_rate();
        namespaces.sort();
        Self {
            counters,
            hit_rate,
            entries,
            namespaces,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
