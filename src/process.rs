//! Running external command-line tools.
//!
//! [`ToolCommand`] starts a child with stdin closed and drains stdout and
//! stderr on two reader threads while the caller dispatches each decoded line
//! to a [`LineSink`] and waits for the exit status.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::{RetraceError, RetraceResult};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Which of the child's output streams a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Receives the child's output one line at a time.
///
/// Lines arrive without their trailing newline and in order within a stream;
/// there is no ordering between the two streams.
pub trait LineSink {
    fn line(&self, stream: Stream, line: &str);
}

impl<S: LineSink + ?Sized> LineSink for &S {
    fn line(&self, stream: Stream, line: &str) {
        (**self).line(stream, line)
    }
}

/// Forwards stdout lines to our stdout and stderr lines to our stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl LineSink for ConsoleSink {
    fn line(&self, stream: Stream, line: &str) {
        match stream {
            Stream::Stdout => println!("{line}"),
            Stream::Stderr => eprintln!("{line}"),
        }
    }
}

/// Sends every line to the `log` facade at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl LineSink for LogSink {
    fn line(&self, stream: Stream, line: &str) {
        match stream {
            Stream::Stdout => log::debug!("[stdout] {line}"),
            Stream::Stderr => log::debug!("[stderr] {line}"),
        }
    }
}

/// Keeps every line in memory for later inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(Stream, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded lines in arrival order.
    pub fn lines(&self) -> Vec<(Stream, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stdout(&self) -> Vec<String> {
        self.of(Stream::Stdout)
    }

    pub fn stderr(&self) -> Vec<String> {
        self.of(Stream::Stderr)
    }

    fn of(&self, wanted: Stream) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(stream, _)| *stream == wanted)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl LineSink for RecordingSink {
    fn line(&self, stream: Stream, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((stream, line.to_owned()));
    }
}

/// Hands every line to both sinks, first `A` then `B`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tee<A, B>(pub A, pub B);

impl<A: LineSink, B: LineSink> LineSink for Tee<A, B> {
    fn line(&self, stream: Stream, line: &str) {
        self.0.line(stream, line);
        self.1.line(stream, line);
    }
}

/// How a finished tool exited, plus everything it wrote to stderr.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// Raw stderr bytes, line endings included.
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Stderr as written by the tool, with invalid UTF-8 replaced.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// One raw line read from a child stream, line ending included.
type Chunk = (Stream, Vec<u8>);

/// A command line for an external tool, plus how to run it.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            current_dir: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_owned()));
        self
    }

    /// Run the child in `dir` instead of our working directory.
    pub fn current_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.current_dir = dir;
        self
    }

    /// Kill the child, and anything it started, if it is still running after `timeout`.
    ///
    /// A timeout too large to represent as a point in time means no deadline.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Run the tool, echoing its output to our own stdout and stderr.
    pub fn run(&self) -> RetraceResult<ToolOutput> {
        self.run_with(&ConsoleSink)
    }

    /// Run the tool, feeding its output to `sink` as it is produced.
    ///
    /// A non-zero exit is not an error here; the status is returned as is.
    pub fn run_with<S: LineSink + ?Sized>(&self, sink: &S) -> RetraceResult<ToolOutput> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        let deadline = self
            .timeout
            .and_then(|timeout| Some((Instant::now().checked_add(timeout)?, timeout)));
        if deadline.is_some() {
            own_process_group(&mut command);
        }

        log::debug!("running {}", self);
        let mut child = command.spawn().map_err(|source| self.launch_error(source))?;

        let (sender, receiver) = mpsc::channel();
        let readers: Vec<_> = [
            child.stdout.take().map(|pipe| spawn_reader(pipe, Stream::Stdout, &sender)),
            child.stderr.take().map(|pipe| spawn_reader(pipe, Stream::Stderr, &sender)),
        ]
        .into_iter()
        .flatten()
        .collect();
        drop(sender);

        let mut stderr = Vec::new();
        let finished = pump(&receiver, sink, &mut stderr, deadline.map(|(at, _)| at));
        let status = match deadline {
            None => child.wait()?,
            Some((at, timeout)) => {
                let exited = if finished {
                    wait_until(&mut child, at)?
                } else {
                    None
                };
                match exited {
                    Some(status) => status,
                    None => {
                        // Lines already read are still delivered; the readers are
                        // left to finish on their own once the pipes close.
                        for (stream, line) in receiver.try_iter() {
                            dispatch(sink, &mut stderr, stream, &line);
                        }
                        return Err(self.expire(&mut child, timeout));
                    }
                }
            }
        };

        for reader in readers {
            join_reader(reader)?;
        }
        log::debug!("{} finished with {status}", self.program_name());
        Ok(ToolOutput { status, stderr })
    }

    fn expire(&self, child: &mut Child, timeout: Duration) -> RetraceError {
        log::warn!("{} exceeded {timeout:?}, killing it", self.program_name());
        if let Err(err) = kill_process_group(child) {
            log::debug!("kill failed: {err}");
        }
        if let Err(err) = child.wait() {
            log::debug!("reaping killed child failed: {err}");
        }
        RetraceError::Timeout {
            program: self.program_name(),
            timeout,
        }
    }

    fn launch_error(&self, source: io::Error) -> RetraceError {
        let missing_dir = self.current_dir.as_ref().is_some_and(|dir| !dir.is_dir());
        if source.kind() == io::ErrorKind::NotFound && !missing_dir {
            RetraceError::ToolNotFound {
                program: self.program_name(),
            }
        } else {
            RetraceError::ToolLaunch {
                program: self.program_name(),
                source,
            }
        }
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

fn spawn_reader<R>(pipe: R, stream: Stream, sender: &Sender<Chunk>) -> JoinHandle<io::Result<()>>
where
    R: Read + Send + 'static,
{
    let sender = sender.clone();
    thread::spawn(move || drain(pipe, stream, sender))
}

/// Read `pipe` to end of input, sending each raw line to the caller.
fn drain<R: Read>(pipe: R, stream: Stream, sender: Sender<Chunk>) -> io::Result<()> {
    let mut reader = BufReader::new(pipe);
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        if sender.send((stream, line)).is_err() {
            // The caller gave up after a timeout.
            return Ok(());
        }
    }
}

/// Poll the child until it exits or `deadline` passes.
fn wait_until(child: &mut Child, deadline: Instant) -> RetraceResult<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Deliver lines until both readers hang up.
///
/// Returns `false` if `deadline` passed first.
fn pump<S: LineSink + ?Sized>(
    receiver: &Receiver<Chunk>,
    sink: &S,
    stderr: &mut Vec<u8>,
    deadline: Option<Instant>,
) -> bool {
    loop {
        let received = match deadline {
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                receiver.recv_timeout(deadline - now)
            }
        };
        match received {
            Ok((stream, line)) => dispatch(sink, stderr, stream, &line),
            Err(RecvTimeoutError::Disconnected) => return true,
            Err(RecvTimeoutError::Timeout) => return false,
        }
    }
}

/// Pass one raw line to `sink`, keeping stderr bytes verbatim.
///
/// Invalid UTF-8 is replaced in what the sink sees rather than treated as an error.
fn dispatch<S: LineSink + ?Sized>(sink: &S, stderr: &mut Vec<u8>, stream: Stream, line: &[u8]) {
    if stream == Stream::Stderr {
        stderr.extend_from_slice(line);
    }
    sink.line(stream, &String::from_utf8_lossy(trim_line_ending(line)));
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn join_reader(handle: JoinHandle<io::Result<()>>) -> RetraceResult<()> {
    match handle.join() {
        Ok(result) => Ok(result?),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Start the child as the leader of a new process group, so a timeout can
/// kill everything it spawned.
#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(child.id()).map_err(io::Error::other)?;
    // A negative pid signals every process in the group led by the child.
    let status = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if status != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// Locate `program` the way a shell would.
///
/// Names containing a path separator are checked directly; bare names are
/// searched for in each `PATH` entry.
pub fn find_program(program: impl AsRef<OsStr>) -> Option<PathBuf> {
    let program = Path::new(program.as_ref());
    if program.components().count() > 1 {
        return candidates(program).into_iter().find(|path| is_executable(path));
    }

    let search_path = env::var_os("PATH")?;
    env::split_paths(&search_path)
        .flat_map(|dir| candidates(&dir.join(program)))
        .find(|path| is_executable(path))
}

#[cfg(windows)]
fn candidates(path: &Path) -> Vec<PathBuf> {
    let mut found = vec![path.to_path_buf()];
    if path.extension().is_none() {
        let extensions = env::var("PATHEXT").unwrap_or_else(|_| ".EXE;.CMD;.BAT".to_string());
        for ext in extensions.split(';').filter(|ext| !ext.is_empty()) {
            found.push(path.with_extension(ext.trim_start_matches('.')));
        }
    }
    found
}

#[cfg(not(windows))]
fn candidates(path: &Path) -> Vec<PathBuf> {
    vec![path.to_path_buf()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh").arg("-c").arg(script)
    }

    mod run_with {
        use super::*;

        #[test]
        fn captures_both_streams_in_order() {
            let sink = RecordingSink::new();
            let output = sh("echo one; echo two; echo oops >&2; echo three")
                .run_with(&sink)
                .unwrap();

            assert!(output.success());
            assert_eq!(sink.stdout(), ["one", "two", "three"]);
            assert_eq!(sink.stderr(), ["oops"]);
        }

        #[test]
        fn reports_exit_code_without_failing() {
            let sink = RecordingSink::new();
            let output = sh("echo bad input >&2; exit 3").run_with(&sink).unwrap();

            assert_eq!(output.code(), Some(3));
            assert_eq!(output.stderr_text(), "bad input\n");
        }

        #[test]
        fn stderr_bytes_are_kept_verbatim() {
            let sink = RecordingSink::new();
            let output = sh("printf 'line one\\r\\nline two\\n\\377' >&2; exit 1")
                .run_with(&sink)
                .unwrap();

            assert_eq!(output.stderr, b"line one\r\nline two\n\xff");
            assert_eq!(sink.stderr(), ["line one", "line two", "\u{fffd}"]);
        }

        #[test]
        fn large_stderr_does_not_deadlock() {
            // Far beyond a 64 KiB pipe buffer, with a single stdout line at the end.
            let script = "i=0; while [ $i -lt 20000 ]; do \
                          echo \"diagnostic line $i with some padding text\" >&2; \
                          i=$((i+1)); done; echo done";
            let sink = RecordingSink::new();
            let output = sh(script).run_with(&sink).unwrap();

            assert!(output.success());
            assert_eq!(sink.stderr().len(), 20000);
            assert_eq!(sink.stderr()[19999], "diagnostic line 19999 with some padding text");
            assert_eq!(sink.stdout(), ["done"]);
        }

        #[test]
        fn crlf_and_missing_final_newline_are_handled() {
            let sink = RecordingSink::new();
            sh("printf 'a\\r\\nb'").run_with(&sink).unwrap();
            assert_eq!(sink.stdout(), ["a", "b"]);
        }

        #[test]
        fn invalid_utf8_is_replaced() {
            let sink = RecordingSink::new();
            sh("printf 'ok\\377\\n'").run_with(&sink).unwrap();
            assert_eq!(sink.stdout(), ["ok\u{fffd}"]);
        }

        #[test]
        fn runs_in_requested_directory() {
            let dir = tempfile::tempdir().unwrap();
            let sink = RecordingSink::new();
            sh("pwd")
                .current_dir(Some(dir.path().to_path_buf()))
                .run_with(&sink)
                .unwrap();

            let reported = PathBuf::from(&sink.stdout()[0]);
            assert_eq!(
                reported.canonicalize().unwrap(),
                dir.path().canonicalize().unwrap()
            );
        }

        #[test]
        fn missing_directory_is_a_launch_failure() {
            let dir = tempfile::tempdir().unwrap();
            let err = sh("true")
                .current_dir(Some(dir.path().join("gone")))
                .run_with(&RecordingSink::new())
                .unwrap_err();

            assert!(matches!(err, RetraceError::ToolLaunch { .. }), "{err:?}");
        }

        #[test]
        fn stdin_is_closed() {
            let sink = RecordingSink::new();
            let output = ToolCommand::new("cat").run_with(&sink).unwrap();
            assert!(output.success());
            assert!(sink.lines().is_empty());
        }

        #[test]
        fn missing_program_is_tool_not_found() {
            let err = ToolCommand::new("retrace-no-such-tool-4d1f")
                .run_with(&RecordingSink::new())
                .unwrap_err();
            match err {
                RetraceError::ToolNotFound { program } => {
                    assert_eq!(program, "retrace-no-such-tool-4d1f")
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn tee_feeds_both_sinks() {
            let left = RecordingSink::new();
            let right = RecordingSink::new();
            sh("echo hi").run_with(&Tee(&left, &right)).unwrap();
            assert_eq!(left.stdout(), ["hi"]);
            assert_eq!(right.stdout(), ["hi"]);
        }
    }

    mod run {
        use super::*;

        #[test]
        fn forwards_to_console_and_reports_status() {
            let output = sh("echo to stdout; echo to stderr >&2; exit 4")
                .run()
                .unwrap();

            assert_eq!(output.code(), Some(4));
            assert_eq!(output.stderr_text(), "to stderr\n");
        }
    }

    mod timeout {
        use super::*;

        #[test]
        fn slow_child_is_killed() {
            let started = Instant::now();
            let err = ToolCommand::new("sleep")
                .arg("5")
                .timeout(Some(Duration::from_millis(200)))
                .run_with(&RecordingSink::new())
                .unwrap_err();

            assert!(matches!(err, RetraceError::Timeout { .. }));
            assert!(started.elapsed() < Duration::from_secs(4));
        }

        #[test]
        fn grandchildren_holding_the_pipes_do_not_delay_it() {
            let started = Instant::now();
            let sink = RecordingSink::new();
            let err = sh("echo early; sleep 3; echo late")
                .timeout(Some(Duration::from_millis(200)))
                .run_with(&sink)
                .unwrap_err();

            assert!(matches!(err, RetraceError::Timeout { .. }));
            assert!(started.elapsed() < Duration::from_millis(1500));
            assert!(!sink.stdout().contains(&"late".to_string()));
        }

        #[test]
        fn unrepresentable_timeout_means_no_deadline() {
            let sink = RecordingSink::new();
            let output = sh("echo fine")
                .timeout(Some(Duration::MAX))
                .run_with(&sink)
                .unwrap();

            assert!(output.success());
            assert_eq!(sink.stdout(), ["fine"]);
        }

        #[test]
        fn fast_child_finishes_normally() {
            let sink = RecordingSink::new();
            let output = sh("echo quick")
                .timeout(Some(Duration::from_secs(10)))
                .run_with(&sink)
                .unwrap();

            assert!(output.success());
            assert_eq!(sink.stdout(), ["quick"]);
        }
    }

    mod find_program {
        use super::*;

        #[test]
        fn finds_sh_on_path() {
            let found = find_program("sh").unwrap();
            assert!(found.is_absolute());
        }

        #[test]
        fn missing_name_is_none() {
            assert!(find_program("retrace-no-such-tool-4d1f").is_none());
        }

        #[test]
        fn explicit_path_is_checked_directly() {
            let sh = find_program("sh").unwrap();
            assert_eq!(find_program(&sh), Some(sh.clone()));
            assert!(find_program("/definitely/not/here/potrace").is_none());
        }

        #[test]
        fn non_executable_file_is_skipped() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("potrace");
            std::fs::write(&path, b"not a program").unwrap();
            assert!(find_program(&path).is_none());
        }
    }

    #[test]
    fn display_joins_program_and_args() {
        let command = ToolCommand::new("potrace").args(["in.bmp", "-s"]);
        assert_eq!(command.to_string(), "potrace in.bmp -s");
    }
}
