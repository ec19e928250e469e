//! # uowkit Testkit
//!
//! Test utilities for uowkit.
//!
//! This crate provides:
//! - Test fixtures and store helpers, including tracing setup
//! - Session wrappers that record lifecycle calls
//! - Session wrappers that fail on demand
//! - Property-based test generators using proptest
//! - Stress runners for concurrent units of work
//!
//! ## Usage
//!
//! ```rust,ignore
//! use uowkit_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn commits() {
//!     let store = TestStore::relational();
//!     let mut uow = store.unit_of_work();
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod stress;
pub mod tracking;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::tracking::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
pub use tracking::*;
