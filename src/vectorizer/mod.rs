use crate::temp::TempScope;
use crate::{RetraceResult, VectorDocument};

pub mod potrace;

/// A backend that turns an opaque bitmap into a vector document.
pub trait Vectorizer {
    /// Check that the backend can run at all.
    ///
    /// Called before any scratch file is created, so a missing tool fails
    /// fast and leaves nothing behind.
    fn preflight(&self) -> RetraceResult<()> {
        Ok(())
    }

    /// Trace a BMP-encoded bitmap. Scratch files go through `scope`.
    fn vectorize(&self, bitmap: &[u8], scope: &mut TempScope) -> RetraceResult<VectorDocument>;
}
