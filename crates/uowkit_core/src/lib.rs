//! # uowkit Core
//!
//! Unit-of-work transaction coordinator.
//!
//! This crate provides:
//! - [`UnitOfWork`], a state machine over one [`Session`] and at most one
//!   open transaction
//! - Scoped execution with commit-on-success and rollback-on-failure
//! - Nested-call reuse of the outermost transaction
//! - Deterministic teardown, both async and blocking
//!
//! The data-access session itself is an external collaborator, described by
//! the traits in [`uowkit_session`].
//!
//! ## Example
//!
//! ```rust
//! use uowkit_core::{UnitOfWork, UowError};
//! use uowkit_session::{CancellationToken, MemoryStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), UowError> {
//! let store = MemoryStore::relational();
//! let mut uow = UnitOfWork::new(store.session());
//! let cancel = CancellationToken::new();
//!
//! let owner = uow.begin_transaction(&cancel).await?;
//! uow.session_mut().insert("entities", "a");
//! uow.save_changes(&cancel).await?;
//! if owner {
//!     uow.commit(&cancel).await?;
//! }
//!
//! assert_eq!(store.count("entities"), 1);
//! uow.dispose().await
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod unit_of_work;

pub use config::{TeardownPolicy, UnitOfWorkConfig};
pub use error::{UowError, UowResult};
pub use unit_of_work::{UnitOfWork, UnitOfWorkState};
pub use uowkit_session::{CancellationToken, Session, SessionError, Transaction};
