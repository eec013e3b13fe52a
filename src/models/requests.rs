//! Request DTOs for the media edge API
//!
//! Defines the structure of incoming HTTP request bodies and path segments.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{CdnError, Result};

/// Request body for `POST /admin/:namespace/purge`: a JSON array of keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct PurgeRequest {
    pub keys: Vec<String>,
}

impl PurgeRequest {
    /// Parses a raw request body.
    ///
    /// Malformed JSON is a validation failure rather than a storage fault.
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| CdnError::Validation(format!("purge body must be a JSON array of keys: {}", e)))
    }
}

/// Storage namespace addressed by the admin routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminNamespace {
    /// Content fetched through `/file`
    File,
    /// Resized sticker variants
    Sticker,
    /// Generated avatars
    Avatar,
}

impl AdminNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminNamespace::File => "file",
            AdminNamespace::Sticker => "sticker",
            AdminNamespace::Avatar => "avatar",
        }
    }
}

impl fmt::Display for AdminNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminNamespace {
    type Err = CdnError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(AdminNamespace::File),
            "sticker" => Ok(AdminNamespace::Sticker),
            "avatar" => Ok(AdminNamespace::Avatar),
            other => Err(CdnError::UnknownNamespace(other.to_string())),
        }
    }
}
