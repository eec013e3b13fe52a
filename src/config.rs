//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Location of the sled database on disk
    pub database_path: PathBuf,
    /// Base URL of the origin object store
    pub origin_url: String,
    /// Base URL of the image generation backend
    pub generator_url: String,
    /// Sliding lifetime of content entries in seconds
    pub content_ttl: u64,
    /// Interval between expiry sweeps in seconds
    pub reclaim_interval: u64,
    /// Budget for a single origin fetch in seconds
    pub origin_timeout: u64,
    /// Budget for a single avatar generation in seconds
    pub generation_timeout: u64,
    /// Content path prefix under which sticker source images live
    pub sticker_source_prefix: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `DATABASE_PATH` - sled database location (default: data/media-edge.db)
    /// - `ORIGIN_URL` - origin base URL (default: https://f001.backblazeb2.com)
    /// - `GENERATOR_URL` - generation backend URL (default: http://localhost:7860)
    /// - `CONTENT_TTL` - sliding content lifetime in seconds (default: 604800)
    /// - `RECLAIM_INTERVAL` - expiry sweep frequency in seconds (default: 1800)
    /// - `ORIGIN_TIMEOUT` - origin fetch budget in seconds (default: 30)
    /// - `GENERATION_TIMEOUT` - generation budget in seconds (default: 120)
    /// - `STICKER_SOURCE_PREFIX` - sticker source path prefix (default: /file/static/stickers)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            database_path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            origin_url: env::var("ORIGIN_URL").unwrap_or(defaults.origin_url),
            generator_url: env::var("GENERATOR_URL").unwrap_or(defaults.generator_url),
            content_ttl: parse_var("CONTENT_TTL").unwrap_or(defaults.content_ttl),
            reclaim_interval: parse_var("RECLAIM_INTERVAL").unwrap_or(defaults.reclaim_interval),
            origin_timeout: parse_var("ORIGIN_TIMEOUT").unwrap_or(defaults.origin_timeout),
            generation_timeout: parse_var("GENERATION_TIMEOUT")
                .unwrap_or(defaults.generation_timeout),
            sticker_source_prefix: env::var("STICKER_SOURCE_PREFIX")
                .map(|p| p.trim_end_matches('/').to_string())
                .unwrap_or(defaults.sticker_source_prefix),
        }
    }

    pub fn content_ttl(&self) -> Duration {
        Duration::from_secs(self.content_ttl)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval)
    }

    pub fn origin_timeout(&self) -> Duration {
        Duration::from_secs(self.origin_timeout)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            database_path: PathBuf::from("data/media-edge.db"),
            origin_url: "https://f001.backblazeb2.com".to_string(),
            generator_url: "http://localhost:7860".to_string(),
            content_ttl: 604_800,
            reclaim_interval: 1800,
            origin_timeout: 30,
            generation_timeout: 120,
            sticker_source_prefix: "/file/static/stickers".to_string(),
        }
    }
}
