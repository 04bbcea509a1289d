use crate::config::Sizing;
use crate::{RetraceResult, VectorDocument};

pub mod svg;

/// A backend that rasterizes a vector document into PNG bytes.
pub trait Renderer {
    fn render(&self, document: &VectorDocument, sizing: Sizing) -> RetraceResult<Vec<u8>>;
}
