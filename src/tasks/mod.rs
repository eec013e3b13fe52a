//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expiry reclaim: deletes content entries whose window has passed

mod reclaim;

pub use reclaim::{run_pass, spawn_reclaim_task, ReclaimReport};
