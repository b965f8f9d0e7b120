use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::report::{BooleanError, Stage};

/// Cooperative "user break". Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Parameters of one Boolean run. Nothing here is process-wide, so
/// unrelated operations can run side by side with different settings.
#[derive(Debug, Clone)]
pub struct BooleanOptions {
    /// Run pair tests and face planning on the rayon pool.
    pub parallel: bool,
    /// Extra distance added to every coincidence test (>= 0).
    pub fuzzy_value: f64,
    pub cancel: Option<CancellationToken>,
    /// Validate the result shape and report problems as warnings.
    pub check_result: bool,
}

impl Default for BooleanOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            fuzzy_value: 0.0,
            cancel: None,
            check_result: true,
        }
    }
}

impl BooleanOptions {
    /// Single-threaded run; useful for debugging and reproducing reports.
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn with_fuzzy(value: f64) -> Self {
        Self {
            fuzzy_value: value,
            ..Self::default()
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Poll the token at a stage boundary.
    pub fn check_cancel(&self, stage: Stage) -> Result<(), BooleanError> {
        if self.is_cancelled() {
            Err(BooleanError::Cancelled { stage })
        } else {
            Ok(())
        }
    }

    pub(crate) fn validate(&self) -> Result<(), BooleanError> {
        if !self.fuzzy_value.is_finite() || self.fuzzy_value < 0.0 {
            return Err(BooleanError::InvalidArgument(format!(
                "fuzzy value must be a non-negative number, got {}",
                self.fuzzy_value
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_shared_between_clones() {
        let token = CancellationToken::new();
        let opts = BooleanOptions::sequential().with_cancel(token.clone());
        assert!(opts.check_cancel(Stage::Init).is_ok());
        token.cancel();
        assert!(matches!(
            opts.check_cancel(Stage::EdgeEdge),
            Err(BooleanError::Cancelled { stage: Stage::EdgeEdge })
        ));
    }

    #[test]
    fn test_presets() {
        assert!(BooleanOptions::default().parallel);
        assert!(!BooleanOptions::sequential().parallel);
        assert_eq!(BooleanOptions::with_fuzzy(0.5).fuzzy_value, 0.5);
        assert!(BooleanOptions::with_fuzzy(-1.0).validate().is_err());
    }
}
