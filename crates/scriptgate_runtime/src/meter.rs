//! Step metering for bounded script execution.

use scriptgate_core::ScriptError;
use serde::{Deserialize, Serialize};

/// Exception kind raised when the step budget runs out
pub const STEP_LIMIT_KIND: &str = "StepLimitExceeded";

/// Counts interpreter steps against an optional budget
///
/// One step is charged per statement, loop iteration, comprehension
/// element, and call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMeter {
    limit: Option<u64>,
    consumed: u64,
}

impl StepMeter {
    /// Meter with a budget; `None` means unlimited
    #[must_use]
    pub fn new(limit: Option<u64>) -> Self {
        Self { limit, consumed: 0 }
    }

    /// Meter without a budget
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Charge `amount` steps
    ///
    /// # Errors
    ///
    /// Returns `StepError::Exhausted` once the budget is spent
    pub fn consume(&mut self, amount: u64) -> Result<(), StepError> {
        let next = self.consumed.saturating_add(amount);
        if let Some(limit) = self.limit {
            if next > limit {
                return Err(StepError::Exhausted { limit });
            }
        }
        self.consumed = next;
        Ok(())
    }

    /// Steps consumed so far
    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Steps left, if bounded
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|l| l.saturating_sub(self.consumed))
    }

    /// Configured budget
    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }
}

impl Default for StepMeter {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Step metering errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// Budget spent
    #[error("script exceeded the step limit of {limit}")]
    Exhausted {
        /// Configured budget
        limit: u64,
    },
}

impl From<StepError> for ScriptError {
    fn from(err: StepError) -> Self {
        ScriptError::runtime(STEP_LIMIT_KIND, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_meter() {
        let mut meter = StepMeter::unlimited();
        for _ in 0..1000 {
            meter.consume(1).unwrap();
        }
        assert_eq!(meter.consumed(), 1000);
        assert_eq!(meter.remaining(), None);
    }

    #[test]
    fn test_bounded_meter() {
        let mut meter = StepMeter::new(Some(10));
        meter.consume(10).unwrap();
        assert_eq!(meter.remaining(), Some(0));
        let err = meter.consume(1).unwrap_err();
        assert_eq!(err, StepError::Exhausted { limit: 10 });
        assert_eq!(meter.consumed(), 10);
    }

    #[test]
    fn test_step_error_to_script_error() {
        let err: ScriptError = StepError::Exhausted { limit: 5 }.into();
        assert_eq!(err.to_string(), "StepLimitExceeded: script exceeded the step limit of 5");
    }
}
