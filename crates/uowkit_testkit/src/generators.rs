//! Property-based test generators using proptest.
//!
//! Provides strategies for generating sequences of unit-of-work calls and a
//! reference model of what the store should contain afterwards.

use proptest::prelude::*;

/// One call made against a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `begin_transaction`.
    Begin,
    /// `commit`.
    Commit,
    /// `rollback`.
    Rollback,
    /// Stage an insert of the value, then `save_changes`.
    InsertAndSave(String),
    /// `execute_in_transaction` with an operation that inserts the values
    /// and then succeeds or fails.
    Execute {
        /// Values inserted (and saved) by the operation.
        values: Vec<String>,
        /// Whether the operation fails after saving.
        fail: bool,
    },
}

/// Strategy for generating row values.
pub fn value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex")
}

/// Strategy for generating a single step.
pub fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        2 => Just(Step::Begin),
        2 => Just(Step::Commit),
        1 => Just(Step::Rollback),
        3 => value_strategy().prop_map(Step::InsertAndSave),
        3 => (prop::collection::vec(value_strategy(), 0..3), any::<bool>())
            .prop_map(|(values, fail)| Step::Execute { values, fail }),
    ]
}

/// Strategy for generating a sequence of steps.
pub fn steps_strategy(max_len: usize) -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(step_strategy(), 0..max_len)
}

/// Strategy for generating a nesting depth for `execute_in_transaction`.
pub fn nesting_depth_strategy() -> impl Strategy<Value = usize> {
    1usize..6
}

/// Reference model of a unit of work over a relational store.
///
/// Tracks which values are committed and which are pending inside an open
/// transaction, following the ownership rules of the unit of work.
#[derive(Debug, Clone, Default)]
pub struct Model {
    /// Values visible to other sessions.
    pub committed: Vec<String>,
    /// Values saved inside the open transaction.
    pub pending: Vec<String>,
    /// Whether a transaction is open.
    pub in_transaction: bool,
}

impl Model {
    /// Applies a step and returns what `begin_transaction` reported, if the
    /// step calls it directly.
    pub fn apply(&mut self, step: &Step) -> Option<bool> {
        match step {
            Step::Begin => {
                let started = !self.in_transaction;
                self.in_transaction = true;
                Some(started)
            }
            Step::Commit => {
                self.committed.append(&mut self.pending);
                self.in_transaction = false;
                None
            }
            Step::Rollback => {
                self.pending.clear();
                self.in_transaction = false;
                None
            }
            Step::InsertAndSave(value) => {
                self.save(value.clone());
                None
            }
            Step::Execute { values, fail } => {
                if self.in_transaction {
                    // Nested: saves ride along, the outer caller decides.
                    self.pending.extend(values.iter().cloned());
                } else if !fail {
                    self.committed.extend(values.iter().cloned());
                }
                None
            }
        }
    }

    fn save(&mut self, value: String) {
        if self.in_transaction {
            self.pending.push(value);
        } else {
            self.committed.push(value);
        }
    }
}
