use std::path::{Path, PathBuf};

use retrace::Retrace;

use crate::cli::{GlobalOptions, TraceArgs};

/// The convenience function to build a Retrace instance from the global and trace options.
pub fn build_retrace(global: &GlobalOptions, trace_args: &TraceArgs) -> Retrace {
    Retrace::new()
        .with_tracer_program(global.potrace.clone())
        .with_trace_args(trace_args.extra.iter().cloned())
        .with_timeout(global.timeout)
        .with_temp_dir(global.temp_dir.clone())
}

/// Derive a variant file path by appending a suffix before the extension.
pub fn derive_variant_path(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    let mut derived = input.to_path_buf();
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| suffix.to_string());
    let filename = format!("{}-{}.{}", stem, suffix, extension);
    derived.set_file_name(filename);
    derived
}

/// Derive an SVG file path by changing the extension to "svg".
pub fn derive_svg_path(input: &Path) -> PathBuf {
    let mut path = input.to_path_buf();
    path.set_extension("svg");
    path
}
