//! Upstream Module
//!
//! Collaborators the caches call on a miss: the origin object store and the
//! image generation backend. Both are traits so the caches can be driven by
//! in-memory fakes in tests.

mod generator;
mod origin;

pub use generator::{GenerationRequest, Generator, StableDiffusionClient};
pub use origin::{HttpOrigin, Origin, OriginResponse};
