//! # Session Recovery
//!
//! Detects workout sessions that were interrupted (crash, force quit, OS
//! kill) and rebuilds them through the host's
//! [`SessionEngine`](bridge_traits::SessionEngine).
//!
//! ## Components
//!
//! - **Validation** (`validation`): Structural checks on persisted session records
//! - **Candidates** (`candidate`): `RecoveryCandidate` and report types
//! - **Scanner** (`scanner`): scan, recover_all, recover_one, cleanup_older_than

pub mod candidate;
pub mod error;
pub mod scanner;
pub mod validation;

pub use candidate::{
    CandidateOrigin, CleanupReport, FailedRecovery, RecoveredSession, RecoveryCandidate,
    RecoveryReport, RecoverySource,
};
pub use error::{RecoveryError, Result};
pub use scanner::{RecoveryConfig, RecoveryScanner};
pub use validation::{validate_session, SessionShape};
