use retrace::{RasterImage, RetraceResult};

use crate::cli::{GlobalOptions, TraceCommand};

use super::utils::{build_retrace, derive_svg_path};

/// The main function to run the trace command.
pub fn run(global: &GlobalOptions, cmd: TraceCommand) -> RetraceResult<()> {
    let retrace = build_retrace(global, &cmd.trace_args);
    let output_path = cmd
        .output
        .clone()
        .unwrap_or_else(|| derive_svg_path(&cmd.input));

    let image = RasterImage::open(&cmd.input)?;
    let svg = retrace.trace(&image)?;
    svg.save(&output_path)?;
    println!("SVG saved to {}", output_path.display());

    Ok(())
}
