use std::fmt::Write;

use retrace::RetraceError;

pub fn report_error(err: &RetraceError) {
    eprint!("{}", render(err));
}

fn render(err: &RetraceError) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, err);
    out
}

fn write_report(out: &mut String, err: &RetraceError) -> std::fmt::Result {
    match err {
        RetraceError::ToolNotFound { program } => {
            writeln!(out, "Tracer not found: {program}")?;
            writeln!(out)?;
            writeln!(out, "Install potrace (https://potrace.sourceforge.net) or point to it:")?;
            writeln!(out, "  - Use --potrace <path>")?;
            writeln!(
                out,
                "  - Or set environment variable {} to the executable path",
                retrace::ENV_TRACER_PATH
            )?;
        }
        RetraceError::ToolExecution {
            program,
            exit_code,
            stderr,
        } if !stderr.is_empty() => {
            match exit_code {
                Some(code) => writeln!(out, "`{program}` exited with status {code}")?,
                None => writeln!(out, "`{program}` was terminated by a signal")?,
            }
            writeln!(out)?;
            writeln!(out, "Tracer output:")?;
            for line in stderr.lines() {
                writeln!(out, "  {line}")?;
            }
        }
        RetraceError::Timeout { .. } => {
            writeln!(out, "{err}")?;
            writeln!(out, "Raise --timeout or simplify the input image.")?;
        }
        _ => match err.stage() {
            Some(stage) => writeln!(out, "{err} (during {stage})")?,
            None => writeln!(out, "{err}")?,
        },
    }
    Ok(())
}
