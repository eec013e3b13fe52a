//! Media Module
//!
//! Derived images: resized sticker variants and generated avatars, both
//! stored permanently in their own namespaces.

mod avatar;
mod format;
pub mod prompt;
pub mod transcode;
mod variant;

pub use avatar::{generation_request, Avatar, AvatarCache, AVATAR_NAMESPACE};
pub use format::VariantFormat;
pub use prompt::{derive_prompt, validate_hash, AvatarPrompt};
pub use transcode::{LanczosTranscoder, Transcoder};
pub use variant::{VariantCache, VariantKey, MAX_VARIANT_WIDTH, VARIANT_NAMESPACE};
