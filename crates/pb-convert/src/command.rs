//! Builder for running external tool commands under a deadline.
//!
//! Every child is spawned in its own process group so that a timeout or a
//! cancellation can kill the tool together with anything it forked (Pandoc
//! shells out to LaTeX engines for PDF output).

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default command timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on captured stdout/stderr per stream.
pub const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8, truncated).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8, truncated).
    pub stderr: String,
}

/// How a tool run ended.
#[derive(Debug)]
pub enum ToolRun {
    /// The process exited on its own (with any status).
    Completed(ToolOutput),
    /// The deadline passed; the process group was killed and reaped.
    TimedOut,
    /// The cancellation token fired; the process group was killed and reaped.
    Cancelled,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use pb_convert::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> pb_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("pandoc"))
///     .arg("--version")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    deadline: Option<Instant>,
    current_dir: Option<PathBuf>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            deadline: None,
            current_dir: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time, measured from spawn.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Set an absolute deadline. Takes precedence over [`timeout`](Self::timeout).
    pub fn deadline(&mut self, at: Instant) -> &mut Self {
        self.deadline = Some(at);
        self
    }

    /// Run the tool with the given working directory.
    pub fn current_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.current_dir = Some(dir.into());
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, treating anything but a clean exit as an error.
    ///
    /// # Errors
    ///
    /// Returns [`pb_core::Error::Tool`] if spawning fails, the process exits
    /// with a non-zero status (message includes stderr), or the timeout
    /// expires.
    pub async fn execute(&self) -> pb_core::Result<ToolOutput> {
        let program_name = self.program_name();
        match self.run(None, || {}).await? {
            ToolRun::Completed(output) if output.status.success() => Ok(output),
            ToolRun::Completed(output) => Err(pb_core::Error::tool(
                program_name,
                format!(
                    "exited with status {}: {}",
                    output.status,
                    output.stderr.trim()
                ),
            )),
            ToolRun::TimedOut => Err(pb_core::Error::tool(
                program_name,
                format!("timed out after {:?}", self.timeout),
            )),
            ToolRun::Cancelled => Err(pb_core::Error::tool(program_name, "cancelled")),
        }
    }

    /// Spawn the command and wait for it to exit, hit the deadline, or be
    /// cancelled.
    ///
    /// `on_spawn` runs once, right after the child process starts. On timeout
    /// and cancellation the whole process group is killed and the child is
    /// reaped before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`pb_core::Error::Tool`] only if the process could not be
    /// spawned or waited on.
    pub async fn run(
        &self,
        cancel: Option<&CancellationToken>,
        on_spawn: impl FnOnce(),
    ) -> pb_core::Result<ToolRun> {
        let program_name = self.program_name();
        let deadline = self
            .deadline
            .unwrap_or_else(|| Instant::now() + self.timeout);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            pb_core::Error::tool(program_name.clone(), format!("failed to spawn: {e}"))
        })?;
        tracing::debug!(tool = %program_name, pid = ?child.id(), "Spawned tool");
        // Covers the caller dropping this future before the child exits.
        let mut group = GroupGuard::new(child.id());
        on_spawn();

        let stdout = child.stdout.take().map(|s| tokio::spawn(read_capped(s)));
        let stderr = child.stderr.take().map(|s| tokio::spawn(read_capped(s)));

        let never = CancellationToken::new();
        let cancel = cancel.unwrap_or(&never);

        let status = tokio::select! {
            status = child.wait() => Some(status.map_err(|e| {
                pb_core::Error::tool(
                    program_name.clone(),
                    format!("I/O error waiting for process: {e}"),
                )
            })?),
            _ = tokio::time::sleep_until(deadline) => None,
            _ = cancel.cancelled() => None,
        };

        let Some(status) = status else {
            let timed_out = !cancel.is_cancelled();
            kill_process_group(&mut child, &program_name).await;
            group.disarm();
            return Ok(if timed_out {
                tracing::warn!(tool = %program_name, "Tool exceeded its deadline; killed");
                ToolRun::TimedOut
            } else {
                tracing::debug!(tool = %program_name, "Tool run cancelled; killed");
                ToolRun::Cancelled
            });
        };

        group.disarm();
        Ok(ToolRun::Completed(ToolOutput {
            status,
            stdout: collect(stdout).await,
            stderr: collect(stderr).await,
        }))
    }
}

/// Kills the child's process group on drop unless disarmed.
///
/// `kill_on_drop` only reaches the direct child; anything it forked would
/// outlive a dropped run without this.
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.take() {
            tracing::debug!(pgid, "Run dropped mid-flight; killing process group");
            // SAFETY: kill(2) has no memory-safety preconditions.
            unsafe {
                libc::kill(-(pgid as libc::pid_t), libc::SIGKILL);
            }
        }
    }
}

/// SIGKILL the child's process group, then reap the child.
async fn kill_process_group(child: &mut Child, program_name: &str) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // A negative pid addresses the process group created at spawn.
        let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
        if rc != 0 {
            tracing::debug!(
                tool = %program_name,
                "killpg failed: {}",
                std::io::Error::last_os_error()
            );
        }
    }
    if let Err(e) = child.start_kill() {
        tracing::debug!(tool = %program_name, "start_kill failed: {e}");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(tool = %program_name, "Failed to reap killed process: {e}");
    }
}

/// Read a stream to EOF, keeping at most [`MAX_CAPTURE_BYTES`].
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = MAX_CAPTURE_BYTES.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    kept
}

async fn collect(task: Option<tokio::task::JoinHandle<Vec<u8>>>) -> String {
    let Some(task) = task else {
        return String::new();
    };
    // A grandchild that inherited the pipe can keep it open past exit.
    match tokio::time::timeout(Duration::from_secs(2), task).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_echo() {
        let output = ToolCommand::new(PathBuf::from("echo"))
            .arg("hello")
            .execute()
            .await
            .unwrap();
        assert!(output.status.success());
        assert!(output.stdout.trim().contains("hello"));
    }

    #[tokio::test]
    async fn execute_nonexistent_tool() {
        let result = ToolCommand::new(PathBuf::from("nonexistent_tool_xyz_12345"))
            .execute()
            .await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("failed to spawn"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn execute_non_zero_exit_includes_stderr() {
        let err = ToolCommand::new(PathBuf::from("/bin/sh"))
            .args(["-c", "echo broken >&2; exit 3"])
            .execute()
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("broken"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn timeout_fires() {
        let start = std::time::Instant::now();
        let result = ToolCommand::new(PathBuf::from("sleep"))
            .arg("10")
            .timeout(Duration::from_millis(100))
            .execute()
            .await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("timed out"), "unexpected error: {err}");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    /// True while `pid` exists and is not a zombie.
    #[cfg(target_os = "linux")]
    fn process_alive(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(") ")
                .map(|(_, rest)| !rest.starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timeout_kills_forked_children() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("child.pid");
        let script = format!("sleep 30 & echo $! > {}; wait", pidfile.display());

        let run = ToolCommand::new(PathBuf::from("/bin/sh"))
            .args(["-c", script.as_str()])
            .timeout(Duration::from_millis(300))
            .run(None, || {})
            .await
            .unwrap();
        assert!(matches!(run, ToolRun::TimedOut));

        let pid: i32 = std::fs::read_to_string(&pidfile)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!process_alive(pid), "forked child {pid} survived the group kill");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropped_run_kills_forked_children() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("child.pid");
        let script = format!("sleep 30 & echo $! > {}; wait", pidfile.display());

        let mut cmd = ToolCommand::new(PathBuf::from("/bin/sh"));
        cmd.args(["-c", script.as_str()]).timeout(Duration::from_secs(60));
        let dropped = tokio::time::timeout(Duration::from_millis(400), cmd.run(None, || {})).await;
        assert!(dropped.is_err(), "run finished before it was dropped");

        let pid: i32 = std::fs::read_to_string(&pidfile)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!process_alive(pid), "forked child {pid} outlived the dropped run");
    }

    #[tokio::test]
    async fn cancellation_stops_the_process() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = std::time::Instant::now();
        let run = ToolCommand::new(PathBuf::from("sleep"))
            .arg("10")
            .run(Some(&cancel), || {})
            .await
            .unwrap();
        assert!(matches!(run, ToolRun::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn stderr_capture_is_bounded() {
        let output = ToolCommand::new(PathBuf::from("/bin/sh"))
            .args(["-c", "head -c 200000 /dev/zero | tr '\\0' x >&2"])
            .execute()
            .await
            .unwrap();
        assert_eq!(output.stderr.len(), MAX_CAPTURE_BYTES);
    }

    #[tokio::test]
    async fn on_spawn_runs_once() {
        let mut spawned = 0;
        ToolCommand::new(PathBuf::from("true"))
            .run(None, || spawned += 1)
            .await
            .unwrap();
        assert_eq!(spawned, 1);
    }
}
