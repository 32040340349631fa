//! Kill signal shared between an operation and whoever may cancel it

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::errors::{ExecutorError, ExecutorResult};

/// Cloneable cancellation flag. Once raised it stays raised.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kill(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_killed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails once the signal has been raised
    pub fn check(&self) -> ExecutorResult<()> {
        if self.is_killed() {
            Err(ExecutorError::interrupted())
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
        let a = Interrupt::new();
        let b = a.clone();
        assert!(a.check().is_ok());
        b.kill();
        assert!(a.is_killed());
        assert!(a.check().unwrap_err().is_interrupted());
    }
}
