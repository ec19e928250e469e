//! In-memory relational store.
//!
//! A reference implementation of the [`crate::Session`] contract with the
//! properties the unit of work relies on:
//! - Row locks taken on save and held until the transaction completes
//! - Writes inside a transaction stay invisible to other sessions
//! - Rollback and abandonment discard every write of the transaction
//! - An optional non-relational mode without transaction support

mod session;
mod store;
mod transaction;

pub use session::MemorySession;
pub use store::{MemoryStore, RowId, StoreStats};
pub use transaction::{MemoryTransaction, TransactionState};
