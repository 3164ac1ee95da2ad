//! Command execution utilities

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Status reported when the process could not be spawned at all
pub const SPAWN_FAILED: i32 = -1;

/// Status reported when a command exceeded its timeout and was killed
pub const TIMED_OUT: i32 = 124;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exit status and captured output of one external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub status: i32,
    /// stdout followed by stderr
    pub output: String,
}

impl CommandResult {
    pub fn new(status: i32, output: impl Into<String>) -> Self {
        Self {
            status,
            output: output.into(),
        }
    }

    pub fn spawn_failed() -> Self {
        Self::new(SPAWN_FAILED, String::new())
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Trimmed output if the command succeeded and printed something
    pub fn non_empty_output(&self) -> Option<&str> {
        let trimmed = self.output.trim();
        if self.success() && !trimmed.is_empty() {
            Some(trimmed)
        } else {
            None
        }
    }
}

/// Runs shell command lines and reports their exit status.
///
/// Implementations block until the process exits, so callers must be on a
/// worker thread.
pub trait ProcessRunner: Send + Sync {
    /// Run a read-only command. Always executed, also in dry-run mode.
    fn query(&self, command: &str) -> CommandResult;

    /// Run a command that changes the system.
    fn execute(&self, command: &str) -> CommandResult;
}

/// Production runner spawning `sh -c <command>`
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    dry_run: bool,
    timeout: Option<Duration>,
}

impl ShellRunner {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            timeout: None,
        }
    }

    /// Kill mutating commands that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

impl ProcessRunner for ShellRunner {
    fn query(&self, command: &str) -> CommandResult {
        run_shell(command, None)
    }

    fn execute(&self, command: &str) -> CommandResult {
        if self.dry_run {
            log_dry_run(command);
            return CommandResult::new(0, String::new());
        }
        run_shell(command, self.timeout)
    }
}

/// Log a command that would be run (for dry-run mode)
pub fn log_dry_run(command: &str) {
    debug!("[dry-run] {}", command);
}

/// Spawn `sh -c command`, capture stdout and stderr, wait for exit.
///
/// The child leads its own process group, so Ctrl-C at the terminal only
/// signals the caller and a timeout kills everything the shell started.
///
/// Spawn failures are reported as [`SPAWN_FAILED`], timeouts as
/// [`TIMED_OUT`], and signal deaths as `128 + signo`.
pub fn run_shell(command: &str, timeout: Option<Duration>) -> CommandResult {
    debug!("Running: sh -c {:?}", command);

    let mut child = match Command::new("sh")
        .args(["-c", command])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to spawn `{}`: {}", command, e);
            return CommandResult::spawn_failed();
        }
    };

    // Drain both pipes concurrently so a chatty child cannot fill one and stall
    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let status = match wait_with_deadline(&mut child, timeout) {
        Ok(Some(status)) => exit_code(status),
        Ok(None) => {
            warn!("Command timed out, killing: {}", command);
            kill_group(&mut child);
            TIMED_OUT
        }
        Err(e) => {
            warn!("Failed to wait for `{}`: {}", command, e);
            kill_group(&mut child);
            SPAWN_FAILED
        }
    };

    let mut output = join_reader(stdout);
    output.push_str(&join_reader(stderr));

    debug!("Exit status {} for: {}", status, command);
    CommandResult { status, output }
}

/// Returns `Ok(None)` when the deadline passed before the child exited
fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
) -> std::io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// SIGKILL the child's whole process group and reap the leader.
///
/// The readers only see EOF once every process holding the pipes is gone.
fn kill_group(child: &mut Child) {
    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        debug!("killpg({}) failed: {}", pgid, e);
        let _ = child.kill();
    }
    let _ = child.wait();
}

fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => 128 + sig,
        (None, None) => SPAWN_FAILED,
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
pub mod testing {
    //! Scripted runner for exercising the prober and executor without a shell

    use super::{CommandResult, ProcessRunner};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Query(String),
        Execute(String),
    }

    impl Call {
        pub fn command(&self) -> &str {
            match self {
                Call::Query(c) | Call::Execute(c) => c,
            }
        }

        pub fn is_execute(&self) -> bool {
            matches!(self, Call::Execute(_))
        }
    }

    /// Answers commands by substring match; unmatched commands succeed silently
    #[derive(Default)]
    pub struct ScriptedRunner {
        rules: Vec<(String, CommandResult)>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// First matching rule wins
        pub fn on(mut self, needle: &str, status: i32, output: &str) -> Self {
            self.rules
                .push((needle.to_string(), CommandResult::new(status, output)));
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        pub fn executed(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(Call::is_execute)
                .map(|c| c.command().to_string())
                .collect()
        }

        fn answer(&self, call: Call) -> CommandResult {
            let result = self
                .rules
                .iter()
                .find(|(needle, _)| call.command().contains(needle.as_str()))
                .map(|(_, r)| r.clone())
                .unwrap_or_default();
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
            result
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn query(&self, command: &str) -> CommandResult {
            self.answer(Call::Query(command.to_string()))
        }

        fn execute(&self, command: &str) -> CommandResult {
            self.answer(Call::Execute(command.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_then_stderr() {
        let result = run_shell("echo out; echo err >&2", None);
        assert!(result.success());
        assert_eq!(result.output, "out\nerr\n");
    }

    #[test]
    fn reports_exit_status_verbatim() {
        let result = run_shell("exit 100", None);
        assert_eq!(result.status, 100);
        assert!(!result.success());
    }

    #[test]
    fn signal_death_maps_above_128() {
        let result = run_shell("kill -TERM $$", None);
        assert_eq!(result.status, 128 + libc::SIGTERM);
    }

    #[test]
    fn timeout_kills_long_running_command() {
        let started = Instant::now();
        let result = run_shell("sleep 5", Some(Duration::from_millis(200)));
        assert_eq!(result.status, TIMED_OUT);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn timeout_kills_commands_forked_by_the_shell() {
        let started = Instant::now();
        let result = run_shell("sleep 5; true", Some(Duration::from_millis(200)));
        assert_eq!(result.status, TIMED_OUT);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn child_runs_in_its_own_process_group() {
        let result = run_shell("echo $$; cut -d' ' -f5 /proc/$$/stat", None);
        assert!(result.success(), "{}", result.output);

        let ids: Vec<i32> = result
            .output
            .lines()
            .map(|l| l.trim().parse().unwrap())
            .collect();
        assert_eq!(ids.len(), 2);
        // the shell leads its group, which is not ours
        assert_eq!(ids[0], ids[1]);
        assert_ne!(ids[1], nix::unistd::getpgrp().as_raw());
    }

    #[test]
    fn dry_run_skips_mutating_commands_only() {
        let runner = ShellRunner::new(true);
        assert!(runner.is_dry_run());
        assert_eq!(runner.execute("exit 7").status, 0);
        assert_eq!(runner.query("exit 7").status, 7);
    }

    #[test]
    fn non_empty_output_requires_success() {
        assert_eq!(CommandResult::new(0, "  535.1\n").non_empty_output(), Some("535.1"));
        assert_eq!(CommandResult::new(0, " \n").non_empty_output(), None);
        assert_eq!(CommandResult::new(1, "535.1").non_empty_output(), None);
        assert_eq!(CommandResult::spawn_failed().status, SPAWN_FAILED);
    }
}
