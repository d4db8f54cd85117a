//! Host-delivered cancellation.

use crate::error::{GateResult, ScriptError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag
///
/// The host keeps one clone and sets it; the interpreter polls another
/// clone between statements. Delegated calls carry the same flag, so one
/// cancellation stops the whole call chain.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with `CancelledByUser` once cancellation was requested
    ///
    /// # Errors
    ///
    /// Returns `CancelledByUser` if the flag is set
    pub fn check(&self) -> GateResult<()> {
        if self.is_cancelled() {
            Err(ScriptError::CancelledByUser)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = CancelFlag::new();
        let host = flag.clone();
        assert!(flag.check().is_ok());
        host.cancel();
        assert!(flag.is_cancelled());
        assert_eq!(flag.check().unwrap_err().to_string(), "CancelledByUser: Query cancelled by user.");
    }
}
