//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the fitness sync core:
//! - Logging and tracing infrastructure
//! - Configuration management and bridge validation
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the snapshot, sync and
//! recovery crates depend on. It establishes the logging conventions and the
//! event broadcasting mechanism used throughout the system, and it is where
//! host-provided bridges are collected and checked before any engine service
//! is constructed.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
