use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::raster::PixelFormat;

/// Result type alias for operations that may fail with [`RetraceError`].
pub type RetraceResult<T> = std::result::Result<T, RetraceError>;

/// Pipeline stages, in the order a single upscale walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preflight,
    AlphaNormalize,
    Encode,
    WriteTempInput,
    Trace,
    ReadVectorOutput,
    Rasterize,
    DecodeFinal,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preflight => "preflight",
            Stage::AlphaNormalize => "alpha-normalize",
            Stage::Encode => "encode",
            Stage::WriteTempInput => "write-temp-input",
            Stage::Trace => "trace",
            Stage::ReadVectorOutput => "read-vector-output",
            Stage::Rasterize => "rasterize",
            Stage::DecodeFinal => "decode-final",
        };
        f.write_str(name)
    }
}

/// Error types that can occur while tracing and re-rasterizing an image.
///
/// Every pipeline stage fails with its own variant so callers can tell
/// which step broke; tool diagnostics are carried verbatim.
#[derive(Debug, Error)]
pub enum RetraceError {
    /// The external tracer could not be located on the search path.
    #[error("`{program}` was not found; install it or point the tracer path at it")]
    ToolNotFound { program: String },
    /// The external tool exists but the OS refused to start it.
    #[error("failed to launch `{program}`: {source}")]
    ToolLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// A temporary file could not be created or written.
    #[error("temporary file {action} failed{}: {source}", display_path(.path))]
    Resource {
        action: &'static str,
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },
    /// The pixel buffer length does not match the declared geometry.
    #[error(
        "pixel buffer holds {found} bytes but a {width}x{height} {format:?} image needs {expected}"
    )]
    InvalidBuffer {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        found: usize,
    },
    /// The input image could not be serialized for the tracer.
    #[error("failed to encode input image as BMP: {0}")]
    Encode(#[source] image::ImageError),
    /// The external tool ran but exited unsuccessfully.
    #[error("`{program}` {}: {stderr}", describe_exit(.exit_code))]
    ToolExecution {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    /// The tracer's vector output could not be read back.
    #[error("failed to read traced SVG {}: {source}", .path.display())]
    VectorRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The vector renderer rejected the document or the requested size.
    #[error("failed to rasterize SVG: {cause}")]
    Rasterize { cause: String },
    /// The rendered bytes could not be decoded into an image.
    #[error("failed to decode rendered image: {0}")]
    Decode(#[source] image::ImageError),
    /// The external tool did not finish before its deadline.
    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    /// Image loading or saving error outside the pipeline.
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),
    /// File system I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RetraceError {
    /// The pipeline stage this error belongs to, if it came from one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RetraceError::ToolNotFound { .. } => Some(Stage::Preflight),
            RetraceError::InvalidBuffer { .. } => Some(Stage::AlphaNormalize),
            RetraceError::Encode(_) => Some(Stage::Encode),
            RetraceError::Resource { .. } => Some(Stage::WriteTempInput),
            RetraceError::ToolLaunch { .. }
            | RetraceError::ToolExecution { .. }
            | RetraceError::Timeout { .. } => Some(Stage::Trace),
            RetraceError::VectorRead { .. } => Some(Stage::ReadVectorOutput),
            RetraceError::Rasterize { .. } => Some(Stage::Rasterize),
            RetraceError::Decode(_) => Some(Stage::DecodeFinal),
            RetraceError::Image(_) | RetraceError::Io(_) => None,
        }
    }

    pub(crate) fn rasterize(cause: impl fmt::Display) -> Self {
        RetraceError::Rasterize {
            cause: cause.to_string(),
        }
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" for {}", path.display()),
        None => String::new(),
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    }
}
