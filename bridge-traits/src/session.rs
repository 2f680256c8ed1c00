//! Session Engine Abstraction
//!
//! The host-side component that owns live workout sessions. The recovery
//! scanner hands it a validated payload and gets back a handle it can pause.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Opaque handle to a session started by a [`SessionEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle(pub String);

impl SessionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session engine trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::session::SessionEngine;
///
/// async fn resume_paused(engine: &dyn SessionEngine, payload: serde_json::Value) -> Result<()> {
///     let handle = engine.start_session(payload).await?;
///     engine.pause_session(&handle).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SessionEngine: Send + Sync {
    /// Rebuild a live session from a persisted payload.
    async fn start_session(&self, payload: Value) -> Result<SessionHandle>;

    /// Pause a running session so the user decides when to continue.
    async fn pause_session(&self, handle: &SessionHandle) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_handle_display() {
        let handle = SessionHandle::new("session-42");
        assert_eq!(handle.to_string(), "session-42");
        assert_eq!(handle.as_str(), "session-42");
    }
}
