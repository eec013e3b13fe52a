//! API Module
//!
//! HTTP handlers and routing for the media edge REST API.
//!
//! # Endpoints
//! - `GET /file/*path` - Fetch-through content with sliding expiry
//! - `GET /sticker/:subject/:attribute/:width` - Resized sticker variant
//! - `GET /avatar/:hash` - Generated avatar
//! - `GET /admin/:namespace/files` - List stored keys
//! - `POST /admin/:namespace/purge` - Delete stored keys
//! - `GET /stats` - Counters
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
