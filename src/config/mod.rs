//! # sqlgate Configuration Module
//!
//! This module centralizes the configuration constants shared by the
//! connection, statement, and migration layers. Interdependent values are
//! co-located and checked through compile-time assertions.
//!
//! Runtime configuration (path, open mode, busy timeout, transaction
//! behavior) lives on [`crate::database::ConnectionBuilder`].
//!
//! ## Module Organization
//!
//! - [`constants`]: All fixed configuration values with dependency documentation

pub mod constants;
pub use constants::*;
