//! Configuration for a unit of work.

/// What teardown does with failures while releasing the transaction or
/// the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeardownPolicy {
    /// Log each failure and keep tearing down. Teardown reports success.
    #[default]
    LogAndContinue,
    /// Run every teardown step, then return the collected failures as
    /// [`crate::UowError::Teardown`].
    Propagate,
}

/// Configuration for a [`crate::UnitOfWork`].
#[derive(Debug, Clone, Default)]
pub struct UnitOfWorkConfig {
    /// Teardown failure handling.
    pub teardown: TeardownPolicy,
    /// Optional name attached to log events.
    pub label: Option<String>,
}

impl UnitOfWorkConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the teardown policy.
    pub fn with_teardown(mut self, teardown: TeardownPolicy) -> Self {
        self.teardown = teardown;
        self
    }

    /// Sets the label attached to log events.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns the label, or an empty string when none is set.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("")
    }
}
