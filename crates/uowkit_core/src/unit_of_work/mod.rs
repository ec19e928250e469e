//! Transaction lifecycle coordination.
//!
//! A unit of work guarantees that a sequence of data operations either all
//! commit or all roll back:
//! - **Reentrancy**: nested calls reuse the active transaction and never
//!   complete it
//! - **Ownership**: only the call that opened a transaction commits or rolls
//!   it back
//! - **Non-relational backends**: every transactional operation is a no-op
//! - **Teardown**: an open transaction is abandoned, never committed

mod coordinator;
mod state;

pub use coordinator::UnitOfWork;
pub use state::UnitOfWorkState;
