use retrace::{RasterImage, RetraceResult, Sizing};

use crate::cli::{GlobalOptions, UpscaleCommand};

use super::utils::{build_retrace, derive_variant_path};

/// The main function to run the upscale command.
pub fn run(global: &GlobalOptions, cmd: UpscaleCommand) -> RetraceResult<()> {
    let retrace = build_retrace(global, &cmd.trace_args);
    let output_path = cmd
        .output
        .clone()
        .unwrap_or_else(|| derive_variant_path(&cmd.input, "upscaled", "png"));

    let image = RasterImage::open(&cmd.input)?;
    let sizing = Sizing::from(&cmd.sizing);
    let upscaled = retrace.upscale(&image, sizing)?;

    upscaled.save(&output_path)?;
    println!(
        "Upscaled PNG ({}x{}) saved to {}",
        upscaled.width(),
        upscaled.height(),
        output_path.display()
    );

    Ok(())
}
