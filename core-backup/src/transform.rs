//! Payload transform hooks.
//!
//! A transform sits between the canonical payload text and what is written to
//! storage. Checksums are always computed over the canonical text, before
//! encoding. No compression or encryption ships with the core; hosts that need
//! either supply their own [`PayloadTransform`].

use crate::error::Result;

pub trait PayloadTransform: Send + Sync {
    /// Name recorded next to each stored payload.
    fn name(&self) -> &str;

    fn encode(&self, canonical: String) -> Result<String>;

    fn decode(&self, stored: String) -> Result<String>;
}

/// Stores the canonical text unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl PayloadTransform for IdentityTransform {
    fn name(&self) -> &str {
        "identity"
    }

    fn encode(&self, canonical: String) -> Result<String> {
        Ok(canonical)
    }

    fn decode(&self, stored: String) -> Result<String> {
        Ok(stored)
    }
}
