pub mod config;
pub mod document;
pub mod error;
pub mod process;
pub mod raster;
pub mod renderer;
pub mod temp;
pub mod vectorizer;

pub use config::{DEFAULT_TRACER_PROGRAM, Sizing, TracerSettings};
pub use document::VectorDocument;
pub use error::{RetraceError, RetraceResult, Stage};
pub use raster::{PixelFormat, RasterImage};
pub use renderer::Renderer;
pub use renderer::svg::ResvgRenderer;
pub use vectorizer::Vectorizer;
pub use vectorizer::potrace::PotraceVectorizer;

use std::path::PathBuf;
use std::time::Duration;

use crate::raster::{decode_rgba, encode_bmp};
use crate::temp::TempScope;

/// Environment variable the CLI reads the tracer path from.
pub const ENV_TRACER_PATH: &str = "RETRACE_POTRACE";

/// Entry point for configuring and running the trace-and-rerender pipeline.
///
/// A `Retrace` holds configuration only; every call creates its own scratch
/// files and child process, so one value can be shared between threads.
#[derive(Debug, Clone, Default)]
pub struct Retrace {
    /// How the external tracer is invoked.
    tracer: TracerSettings,
    /// Where scratch files go; the platform temp directory when unset.
    temp_dir: Option<PathBuf>,
}

impl Retrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tracer settings wholesale.
    pub fn with_tracer(mut self, tracer: TracerSettings) -> Self {
        self.tracer = tracer;
        self
    }

    /// Set the tracer executable name or path.
    pub fn with_tracer_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.tracer.program = program.into();
        self
    }

    /// Set extra tracer arguments, placed before the input and output arguments.
    pub fn with_trace_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracer = self.tracer.with_extra_args(args);
        self
    }

    /// Kill the tracer if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tracer.timeout = timeout;
        self
    }

    /// Create scratch files under `dir` instead of the platform temp directory.
    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }

    /// Get a reference to the tracer settings.
    pub fn tracer(&self) -> &TracerSettings {
        &self.tracer
    }

    /// Trace the image into an SVG with the configured `potrace`.
    pub fn trace(&self, image: &RasterImage) -> RetraceResult<VectorDocument> {
        self.trace_with(&PotraceVectorizer::new(self.tracer.clone()), image)
    }

    /// Trace the image into a vector document using the specified vectorizer.
    ///
    /// Scratch files live only for the duration of this call and are removed
    /// on every exit path.
    pub fn trace_with<V>(&self, vectorizer: &V, image: &RasterImage) -> RetraceResult<VectorDocument>
    where
        V: Vectorizer + ?Sized,
    {
        log::debug!("stage {}", Stage::Preflight);
        vectorizer.preflight()?;

        log::debug!("stage {} ({:?} input)", Stage::AlphaNormalize, image.format());
        let bitmap = encode_bmp(image)?;

        log::debug!("stage {} ({} bytes)", Stage::Trace, bitmap.len());
        let mut scope = self.temp_scope();
        let document = vectorizer.vectorize(&bitmap, &mut scope);
        scope.release();
        document
    }

    /// Trace the image and render it back to pixels at the requested size.
    ///
    /// The result is always RGBA.
    pub fn upscale(&self, image: &RasterImage, sizing: Sizing) -> RetraceResult<RasterImage> {
        self.upscale_with(
            &PotraceVectorizer::new(self.tracer.clone()),
            &ResvgRenderer,
            image,
            sizing,
        )
    }

    /// Same as [`Retrace::upscale`], with caller-chosen backends.
    pub fn upscale_with<V, R>(
        &self,
        vectorizer: &V,
        renderer: &R,
        image: &RasterImage,
        sizing: Sizing,
    ) -> RetraceResult<RasterImage>
    where
        V: Vectorizer + ?Sized,
        R: Renderer + ?Sized,
    {
        let document = self.trace_with(vectorizer, image)?;

        log::debug!("stage {} ({sizing:?})", Stage::Rasterize);
        let png = renderer.render(&document, sizing)?;

        log::debug!("stage {}", Stage::DecodeFinal);
        let output = decode_rgba(&png)?;
        log::info!(
            "upscaled {}x{} to {}x{}",
            image.width(),
            image.height(),
            output.width(),
            output.height()
        );
        Ok(output)
    }

    fn temp_scope(&self) -> TempScope {
        match &self.temp_dir {
            Some(dir) => TempScope::in_dir(dir),
            None => TempScope::new(),
        }
    }
}

/// Upscale `image` through `potrace` and `resvg` with default settings.
///
/// `extra_trace_args` go to `potrace` ahead of its input and output arguments.
pub fn vectorize_upscale(
    image: &RasterImage,
    sizing: Sizing,
    extra_trace_args: &[String],
) -> RetraceResult<RasterImage> {
    Retrace::new()
        .with_trace_args(extra_trace_args.iter().cloned())
        .upscale(image, sizing)
}
