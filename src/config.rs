use std::path::PathBuf;
use std::time::Duration;

use crate::{RetraceError, RetraceResult};

/// Default tracer executable, looked up on `PATH`.
pub const DEFAULT_TRACER_PROGRAM: &str = "potrace";

/// How to invoke the external tracer.
#[derive(Debug, Clone)]
pub struct TracerSettings {
    /// Executable name or path.
    pub program: PathBuf,
    /// Extra arguments placed right after the program name, ahead of the
    /// input path and the output flags.
    pub extra_args: Vec<String>,
    /// Working directory for the tracer process.
    pub working_dir: Option<PathBuf>,
    /// Kill the tracer if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl Default for TracerSettings {
    fn default() -> Self {
        Self::new(DEFAULT_TRACER_PROGRAM)
    }
}

impl TracerSettings {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Output size of the rasterized vector document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sizing {
    /// Multiply the document's intrinsic size.
    Scale(f32),
    /// Stretch to exactly this many pixels.
    Exact { width: u32, height: u32 },
    /// Fixed width, height follows the aspect ratio.
    Width(u32),
    /// Fixed height, width follows the aspect ratio.
    Height(u32),
}

impl Default for Sizing {
    fn default() -> Self {
        Sizing::Scale(1.0)
    }
}

impl Sizing {
    /// Build a sizing from optional scale and dimensions.
    ///
    /// Explicit dimensions win over the scale; with nothing given the scale
    /// defaults to 1.0.
    pub fn from_parts(scale: Option<f32>, width: Option<u32>, height: Option<u32>) -> Self {
        match (width, height) {
            (Some(width), Some(height)) => Sizing::Exact { width, height },
            (Some(width), None) => Sizing::Width(width),
            (None, Some(height)) => Sizing::Height(height),
            (None, None) => Sizing::Scale(scale.unwrap_or(1.0)),
        }
    }

    /// Pixel size for a document whose intrinsic size is `intrinsic`.
    pub fn output_size(&self, intrinsic: (f32, f32)) -> RetraceResult<(u32, u32)> {
        let (iw, ih) = intrinsic;
        if !(iw.is_finite() && ih.is_finite() && iw > 0.0 && ih > 0.0) {
            return Err(RetraceError::rasterize(format!(
                "document has no usable size ({iw}x{ih})"
            )));
        }

        let size = match *self {
            Sizing::Scale(scale) => {
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(RetraceError::rasterize(format!(
                        "scale must be a positive number, got {scale}"
                    )));
                }
                (to_pixels(iw * scale), to_pixels(ih * scale))
            }
            Sizing::Exact { width, height } => (width, height),
            Sizing::Width(width) => (width, to_pixels(ih * width as f32 / iw)),
            Sizing::Height(height) => (to_pixels(iw * height as f32 / ih), height),
        };

        match size {
            (0, _) | (_, 0) => Err(RetraceError::rasterize(format!(
                "output size {}x{} has a zero dimension",
                size.0, size.1
            ))),
            size => Ok(size),
        }
    }
}

fn to_pixels(value: f32) -> u32 {
    value.round().clamp(1.0, u32::MAX as f32) as u32
}
