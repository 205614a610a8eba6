//! Health tracking for the remote generation service.
//!
//! The tracker lives for one session and is shared by every generation
//! call. It is not persisted.

use chrono::{DateTime, Utc};

/// Rolling record of remote call outcomes.
///
/// `consecutive_error_count` resets to zero on every success and grows by
/// one on every failure, so it always equals the number of failures since
/// the last success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiHealth {
    /// Failures since the last success.
    pub consecutive_error_count: u32,
    /// Description of the most recent failure.
    pub last_error: Option<String>,
    /// When the last remote call succeeded.
    pub last_success_time: Option<DateTime<Utc>>,
}

impl ApiHealth {
    /// Creates a fresh tracker with no recorded calls.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed remote call.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.consecutive_error_count = self.consecutive_error_count.saturating_add(1);
        self.last_error = Some(error.into());
        tracing::debug!(
            count = self.consecutive_error_count,
            "Recorded remote generation failure"
        );
    }

    /// Records a successful remote call.
    pub fn record_success(&mut self) {
        self.consecutive_error_count = 0;
        self.last_error = None;
        self.last_success_time = Some(Utc::now());
    }

    /// Returns `true` when failures since the last success exceed `threshold`.
    #[must_use]
    pub const fn should_skip_remote(&self, threshold: u32) -> bool {
        self.consecutive_error_count > threshold
    }
}
