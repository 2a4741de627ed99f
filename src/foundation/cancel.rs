use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::foundation::error::{StitchError, StitchResult};

/// Cooperative cancellation flag shared by every pipeline stage.
///
/// Stages poll it at their blocking points; tripping it is how user cancellation, job timeouts
/// and "another stage failed" all unwind the pipeline.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// `true` once [`CancelToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` when tripped.
    pub fn check(&self) -> StitchResult<()> {
        if self.is_cancelled() {
            Err(StitchError::Cancelled)
        } else {
            Ok(())
        }
    }
}
