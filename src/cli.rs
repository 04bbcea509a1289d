use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use retrace::{DEFAULT_TRACER_PROGRAM, ENV_TRACER_PATH, Sizing};

/// Command line interface definition.
#[derive(Parser, Debug)]
#[command(author, version, about, propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalOptions {
    /// potrace executable name or path
    #[arg(long, global = true, env = ENV_TRACER_PATH, default_value = DEFAULT_TRACER_PROGRAM)]
    pub potrace: PathBuf,
    /// Kill potrace if it runs longer than this many seconds
    #[arg(long, global = true, value_name = "SECS", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,
    /// Directory for intermediate files (defaults to the system temp dir)
    #[arg(long = "temp-dir", global = true, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Trace an image and render it back at a new size
    Upscale(UpscaleCommand),
    /// Trace an image and write the intermediate SVG
    Trace(TraceCommand),
}

#[derive(Args, Debug)]
pub struct UpscaleCommand {
    /// Input image path
    pub input: PathBuf,
    /// Output PNG path (defaults to `<name>-upscaled.png`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub sizing: SizingArgs,
    #[command(flatten)]
    pub trace_args: TraceArgs,
}

#[derive(Args, Debug)]
pub struct TraceCommand {
    /// Input image path
    pub input: PathBuf,
    /// Output SVG path (defaults to input name with `.svg`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub trace_args: TraceArgs,
}

#[derive(Args, Debug)]
pub struct SizingArgs {
    /// Scale factor applied to the traced document
    #[arg(short, long, default_value_t = 2.0, value_parser = parse_scale)]
    pub scale: f32,
    /// Output width in pixels (height follows the aspect ratio unless given)
    #[arg(long, conflicts_with = "scale", value_parser = clap::value_parser!(u32).range(1..))]
    pub width: Option<u32>,
    /// Output height in pixels (width follows the aspect ratio unless given)
    #[arg(long, conflicts_with = "scale", value_parser = clap::value_parser!(u32).range(1..))]
    pub height: Option<u32>,
}

impl From<&SizingArgs> for Sizing {
    fn from(args: &SizingArgs) -> Self {
        Sizing::from_parts(Some(args.scale), args.width, args.height)
    }
}

#[derive(Args, Debug)]
pub struct TraceArgs {
    /// Extra arguments passed to potrace ahead of the input file (after `--`)
    #[arg(last = true, value_name = "POTRACE_ARGS")]
    pub extra: Vec<String>,
}

fn parse_scale(value: &str) -> Result<f32, String> {
    let scale = value
        .parse::<f32>()
        .map_err(|_| format!("scale must be numeric, got `{value}`"))?;
    if scale.is_finite() && scale > 0.0 {
        Ok(scale)
    } else {
        Err(format!("scale must be a positive number, got {value}"))
    }
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    let secs = value
        .parse::<f64>()
        .map_err(|_| format!("timeout must be a number of seconds, got `{value}`"))?;
    if !(secs.is_finite() && secs > 0.0) {
        return Err(format!("timeout must be positive, got {value}"));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| format!("timeout {value} is too large"))
}
