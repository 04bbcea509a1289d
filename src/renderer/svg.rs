use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};

use crate::config::Sizing;
use crate::{RetraceError, RetraceResult, VectorDocument};

use super::Renderer;

/// Renders SVG documents in-process with `resvg`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResvgRenderer;

impl Renderer for ResvgRenderer {
    fn render(&self, document: &VectorDocument, sizing: Sizing) -> RetraceResult<Vec<u8>> {
        let tree = Tree::from_data(document.as_bytes(), &Options::default())
            .map_err(|e| RetraceError::rasterize(format!("failed to parse SVG: {e}")))?;

        let size = tree.size();
        let (source_width, source_height) = (size.width(), size.height());
        let (width, height) = sizing.output_size((source_width, source_height))?;
        log::debug!(
            "rendering {source_width}x{source_height} document to {width}x{height} pixels"
        );

        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            RetraceError::rasterize(format!("cannot allocate a {width}x{height} canvas"))
        })?;
        let transform = Transform::from_scale(
            width as f32 / source_width,
            height as f32 / source_height,
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        pixmap.encode_png().map_err(RetraceError::rasterize)
    }
}
