//! Media Edge - a cache-aside content delivery server
//!
//! Fronts an origin object store with a persistent sliding-expiry cache, and
//! serves two kinds of permanently stored derived images: resized sticker
//! variants and avatars generated from a hash.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod tasks;
pub mod upstream;

#[cfg(test)]
mod test_support;

pub use api::{create_router, AppState};
pub use config::Config;
pub use error::{CdnError, Result};
pub use tasks::spawn_reclaim_task;
