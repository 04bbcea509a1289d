mod trace;
mod upscale;
mod utils;

use crate::cli::{Cli, Commands, GlobalOptions};
use retrace::RetraceResult;

/// The main function to run the command based on CLI input.
pub fn run(cli: Cli) -> RetraceResult<()> {
    let Cli { global, command } = cli;
    dispatch(&global, command)
}

/// Dispatch the command to the appropriate handler.
fn dispatch(global: &GlobalOptions, command: Commands) -> RetraceResult<()> {
    match command {
        Commands::Upscale(cmd) => upscale::run(global, cmd),
        Commands::Trace(cmd) => trace::run(global, cmd),
    }
}
