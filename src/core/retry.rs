//! Bounded restart-and-retry policy for the command channel.

/// How many times a single command may restart the session before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of session restarts per command.
    pub max_restarts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_restarts: 1 }
    }
}

impl RetryPolicy {
    /// Returns true if another restart is allowed after `restarts_done`.
    ///
    /// # Examples
    ///
    /// ```
    /// use taskbridge::core::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert!(policy.allows(0));
    /// assert!(!policy.allows(1));
    /// ```
    #[must_use]
    pub const fn allows(&self, restarts_done: u32) -> bool {
        restarts_done < self.max_restarts
    }
}
