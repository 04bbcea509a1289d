use crate::config::TracerSettings;
use crate::process::{LogSink, ToolCommand, find_program};
use crate::temp::{TempFile, TempScope};
use crate::{RetraceError, RetraceResult, VectorDocument};

use super::Vectorizer;

/// Traces bitmaps by running the `potrace` command-line tool.
///
/// The tool is invoked as `potrace <extra args...> <input.bmp> -s -o <output.svg>`.
#[derive(Debug, Clone, Default)]
pub struct PotraceVectorizer {
    settings: TracerSettings,
}

impl PotraceVectorizer {
    pub fn new(settings: TracerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TracerSettings {
        &self.settings
    }

    /// Build the tracer command line for the given scratch files.
    pub fn command(&self, input: &TempFile, output: &TempFile) -> ToolCommand {
        ToolCommand::new(&self.settings.program)
            .args(&self.settings.extra_args)
            .arg(input.path())
            .arg("-s")
            .arg("-o")
            .arg(output.path())
            .current_dir(self.settings.working_dir.clone())
            .timeout(self.settings.timeout)
    }

    fn program_name(&self) -> String {
        self.settings.program.to_string_lossy().into_owned()
    }
}

impl Vectorizer for PotraceVectorizer {
    fn preflight(&self) -> RetraceResult<()> {
        match find_program(&self.settings.program) {
            Some(path) => {
                log::debug!("using tracer at {}", path.display());
                Ok(())
            }
            None => Err(RetraceError::ToolNotFound {
                program: self.program_name(),
            }),
        }
    }

    fn vectorize(&self, bitmap: &[u8], scope: &mut TempScope) -> RetraceResult<VectorDocument> {
        let input = scope.create(".bmp")?;
        input.write(bitmap)?;
        let output = scope.create(".svg")?;

        let finished = self.command(&input, &output).run_with(&LogSink)?;
        if !finished.success() {
            return Err(RetraceError::ToolExecution {
                program: self.program_name(),
                exit_code: finished.code(),
                stderr: finished.stderr_text(),
            });
        }

        VectorDocument::read(output.path())
    }
}
