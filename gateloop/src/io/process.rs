//! Child process execution for role commands and test commands.
//!
//! Both pipes are drained on their own threads while the parent waits with a
//! deadline, so a chatty child can never block on a full pipe. Captured output
//! is bounded; anything past the bound is counted and dropped.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{ChildStdin, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Bounded capture of one output stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// Bytes read past the bound and discarded.
    pub dropped: usize,
}

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    fn push(&mut self, chunk: &[u8], limit: usize) {
        let room = limit.saturating_sub(self.bytes.len());
        let kept = chunk.len().min(room);
        self.bytes.extend_from_slice(&chunk[..kept]);
        self.dropped += chunk.len() - kept;
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Exit code, with timeouts and signal deaths reported as `-1`.
    pub fn exit_code(&self) -> i32 {
        if self.timed_out {
            -1
        } else {
            self.status.code().unwrap_or(-1)
        }
    }

    /// `=== stdout ===` / `=== stderr ===` sections for a transcript file.
    pub fn render_streams(&self, label: &str) -> String {
        let mut buf = String::new();
        for (name, stream) in [("stdout", &self.stdout), ("stderr", &self.stderr)] {
            if !buf.is_empty() {
                buf.push('\n');
            }
            buf.push_str(&format!("=== {name} ===\n"));
            buf.push_str(&stream.text());
            if stream.dropped > 0 {
                buf.push_str(&format!(
                    "\n[{label} {name} truncated {} bytes]\n",
                    stream.dropped
                ));
            }
        }
        buf
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions<'a> {
    /// Written to the child's stdin, which is then closed.
    pub stdin: Option<&'a [u8]>,
    pub timeout: Duration,
    /// Per-stream bound on captured output.
    pub output_limit_bytes: usize,
    /// Each stdout line is also appended and flushed here as it arrives.
    pub stream_path: Option<&'a Path>,
}

/// Run `cmd` to completion or until `options.timeout` elapses.
///
/// A timed-out child is killed and reported with `timed_out = true`; only
/// spawn and pipe failures are errors.
#[instrument(skip_all, fields(
    program = ?cmd.get_program(),
    timeout_secs = options.timeout.as_secs(),
    streaming = options.stream_path.is_some()
))]
pub fn run_command(mut cmd: Command, options: ProcessOptions<'_>) -> Result<CommandOutput> {
    let tee = options.stream_path.map(create_tee).transpose()?;

    cmd.stdin(if options.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn {:?}", cmd.get_program()))?;
    debug!(pid = child.id(), "child spawned");

    let stdout = child.stdout.take().ok_or_else(|| anyhow!("stdout not piped"))?;
    let stderr = child.stderr.take().ok_or_else(|| anyhow!("stderr not piped"))?;
    let limit = options.output_limit_bytes;
    let stdout_reader = spawn_capture("stdout", stdout, limit, tee)?;
    let stderr_reader = spawn_capture("stderr", stderr, limit, None)?;

    let stdin_writer = match options.stdin {
        Some(input) => {
            let pipe = child.stdin.take().ok_or_else(|| anyhow!("stdin not piped"))?;
            Some(spawn_feed(pipe, input.to_vec())?)
        }
        None => None,
    };

    // The deadline also bounds a child that never drains its stdin.
    let (status, timed_out) = match child.wait_timeout(options.timeout).context("wait for child")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = options.timeout.as_secs(), "child timed out, killing");
            child.kill().context("kill child")?;
            (child.wait().context("reap killed child")?, true)
        }
    };

    if let Some(handle) = stdin_writer
        && handle.join().is_err()
    {
        warn!("stdin writer panicked");
    }
    let stdout = join_capture(stdout_reader)?;
    let stderr = join_capture(stderr_reader)?;
    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "child output exceeded limit"
        );
    }
    debug!(exit_code = ?status.code(), timed_out, "child finished");

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

/// `sh -c <script>` run from `workdir`.
pub fn shell_command(script: &str, workdir: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script).current_dir(workdir);
    cmd
}

fn create_tee(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn spawn_capture<R: Read + Send + 'static>(
    name: &str,
    reader: R,
    limit: usize,
    tee: Option<BufWriter<File>>,
) -> Result<JoinHandle<Result<Captured>>> {
    thread::Builder::new()
        .name(format!("capture-{name}"))
        .spawn(move || capture(reader, limit, tee))
        .with_context(|| format!("spawn {name} reader"))
}

fn spawn_feed(mut pipe: ChildStdin, input: Vec<u8>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("feed-stdin".to_string())
        .spawn(move || {
            // A child that exits without reading its input is not a failure.
            if let Err(err) = pipe.write_all(&input) {
                debug!(%err, "child closed stdin early");
            }
        })
        .context("spawn stdin writer")
}

fn join_capture(handle: JoinHandle<Result<Captured>>) -> Result<Captured> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader panicked"))?
}

fn capture<R: Read>(reader: R, limit: usize, mut tee: Option<BufWriter<File>>) -> Result<Captured> {
    let mut reader = BufReader::new(reader);
    let mut captured = Captured::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).context("read child output")? == 0 {
            break;
        }
        if let Some(writer) = tee.as_mut()
            && let Err(err) = writer.write_all(&line).and_then(|()| writer.flush())
        {
            warn!(%err, "stream file write failed, no longer teeing");
            tee = None;
        }
        captured.push(&line, limit);
    }
    Ok(captured)
}
