//! # uowkit Session
//!
//! The capability contract a unit of work consumes, and an in-memory
//! relational store implementing it.
//!
//! A [`Session`] is a data-access context that stages mutations and flushes
//! them with `save_changes`. A relational session can open a
//! [`Transaction`], which is completed by `commit` or `rollback` and released
//! by `dispose`.
//!
//! ## Available Implementations
//!
//! - [`MemorySession`] over a shared [`MemoryStore`] - row locks, transaction
//!   isolation, and a non-relational mode, for tests and ephemeral use
//!
//! ## Example
//!
//! ```rust
//! use uowkit_session::{CancellationToken, MemoryStore, Session};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = MemoryStore::relational();
//! let mut session = store.session();
//! let cancel = CancellationToken::new();
//!
//! session.insert("entities", "hello");
//! let affected = session.save_changes(&cancel).await.unwrap();
//! assert_eq!(affected, 1);
//! assert_eq!(store.count("entities"), 1);
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod memory;
mod session;

pub use config::StoreConfig;
pub use error::{SessionError, SessionResult};
pub use memory::{
    MemorySession, MemoryStore, MemoryTransaction, RowId, StoreStats, TransactionState,
};
pub use session::{Session, Transaction};

/// Re-exported so implementors and callers share one signal type.
pub use tokio_util::sync::CancellationToken;
