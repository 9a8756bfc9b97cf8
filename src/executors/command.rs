use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::core::errors::{ExecError, FlowError, FlowResult};

const TAIL_LINES: usize = 10;

/// Time a cancelled process group gets between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_millis(250);

/// A program with its arguments, optionally run from a specific directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    /// `sh -c <script>`, for pipelines.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh", ["-c".to_string(), script.into()])
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Captured stdout, only filled when capture was requested.
    pub stdout: String,
    pub exit_code: i32,
    pub duration_ms: u128,
}

#[derive(Default)]
struct StreamCapture {
    captured: Vec<String>,
    tail: VecDeque<String>,
}

/// Runs `invocation` to completion, streaming stdout and stderr line by line
/// into the log. The child leads its own process group; cancelling `cancel`
/// (or dropping the future) kills the whole group, so the members of a
/// `sh -c` pipeline go down with it.
pub async fn execute(
    invocation: &Invocation,
    cancel: &CancellationToken,
    capture_stdout: bool,
) -> FlowResult<CommandResult> {
    let start = Instant::now();
    let tool = invocation.program.as_str();

    tracing::info!("$ {}", invocation);

    let mut cmd = Command::new(tool);
    cmd.args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &invocation.cwd {
        cmd.current_dir(dir);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| FlowError::Spawn {
        tool: tool.to_string(),
        source,
    })?;
    let mut group = ProcessGroup::new(child.id());

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // The child moves into the future so that dropping it on cancellation
    // kills the process.
    let run = async move {
        let (out, err, status) = tokio::join!(
            pump(stdout, tool, capture_stdout),
            pump(stderr, tool, false),
            child.wait()
        );
        (out, err, status)
    };

    let (out, err, status) = tokio::select! {
        result = run => result,
        _ = cancel.cancelled() => {
            tracing::warn!("Cancelled {} after {}ms", tool, start.elapsed().as_millis());
            group.terminate().await;
            return Err(FlowError::Cancelled);
        }
    };
    group.release();

    let duration_ms = start.elapsed().as_millis();
    let status = status?;
    let out = out?;
    let err = err?;

    if !status.success() {
        let tail: Vec<String> = out.tail.into_iter().chain(err.tail).collect();
        let skip = tail.len().saturating_sub(TAIL_LINES);
        return Err(FlowError::Exec(ExecError {
            tool: tool.to_string(),
            args: invocation.args.clone(),
            cwd: invocation.cwd.as_ref().map(|d| d.display().to_string()),
            exit_code: status.code(),
            output_tail: tail[skip..].join("\n"),
            duration_ms,
        }));
    }

    tracing::debug!("{} finished in {}ms", tool, duration_ms);

    Ok(CommandResult {
        stdout: out.captured.join("\n"),
        exit_code: status.code().unwrap_or(0),
        duration_ms,
    })
}

/// Reads raw lines so output that is not valid UTF-8 is logged lossily
/// instead of ending the stream.
async fn pump<R>(reader: Option<R>, tool: &str, capture: bool) -> std::io::Result<StreamCapture>
where
    R: AsyncRead + Unpin,
{
    let mut result = StreamCapture::default();
    let Some(reader) = reader else {
        return Ok(result);
    };

    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(['\n', '\r']).to_string();
        tracing::info!("[{}] {}", tool, line);
        if result.tail.len() == TAIL_LINES {
            result.tail.pop_front();
        }
        result.tail.push_back(line.clone());
        if capture {
            result.captured.push(line);
        }
    }
    Ok(result)
}

/// Signals the process group led by a spawned child. Kills the group on drop
/// unless released after a normal exit.
struct ProcessGroup {
    pgid: Option<i32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|pid| i32::try_from(pid).ok()),
        }
    }

    /// SIGTERM, a short grace period, then SIGKILL.
    async fn terminate(&mut self) {
        if self.pgid.is_some() {
            self.signal(Signal::Term);
            tokio::time::sleep(TERM_GRACE).await;
        }
        self.signal(Signal::Kill);
        self.pgid = None;
    }

    fn release(&mut self) {
        self.pgid = None;
    }

    #[cfg(unix)]
    fn signal(&self, signal: Signal) {
        let Some(pgid) = self.pgid else {
            return;
        };
        let signo = match signal {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };
        // SAFETY: killpg only takes plain integers; a group that already
        // exited yields ESRCH, which is ignored.
        let rc = unsafe { libc::killpg(pgid, signo) };
        if rc != 0 {
            tracing::debug!(
                "killpg({}, {}) failed: {}",
                pgid,
                signo,
                std::io::Error::last_os_error()
            );
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, _signal: Signal) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.signal(Signal::Kill);
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}
