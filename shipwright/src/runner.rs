//! External tool invocation.
//!
//! The package installer, dependency manager, migration tool, and ASGI
//! server are all black boxes. The sequencer's contract with each of them is
//! "invoke, check exit status, proceed conditionally", so the whole surface
//! is one trait returning an exit code, plus a handler for the one process
//! that outlives its invocation (the service).

use crate::errors::{ShipwrightError, ShipwrightResult};
use crate::env::Environment;
use crate::util::process::{is_process_alive, kill_process};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;

/// One external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Environment,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Environment::new(),
            cwd: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Short display form for logs and errors ("apt-get install ...").
    pub fn display_name(&self) -> String {
        match self.args.first() {
            Some(first) => format!("{} {}", self.program, first),
            None => self.program.clone(),
        }
    }
}

/// Run an external tool to completion and report its exit code.
///
/// Implementations must not interpret the code; classification into the
/// failure taxonomy belongs to the caller, which knows which step it is on.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the invocation to completion. `Ok(None)` means the tool was
    /// killed by a signal before producing an exit code.
    async fn run(&self, invocation: &Invocation) -> ShipwrightResult<Option<i32>>;
}

/// Real runner backed by `tokio::process`.
///
/// Stdio is inherited so a failing tool's output lands in the container log.
/// `kill_on_drop` guarantees a cancelled step (e.g. a termination request
/// during migration) cannot leave its child running.
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> ShipwrightResult<Option<i32>> {
        let mut cmd = tokio::process::Command::new(&invocation.program);
        cmd.args(&invocation.args);
        for (key, value) in invocation.env.iter() {
            cmd.env(key, value);
        }
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);

        tracing::debug!(program = %invocation.program, args = ?invocation.args, "running tool");

        let status = cmd.status().await.map_err(|e| {
            ShipwrightError::Internal(format!(
                "failed to spawn {}: {}",
                invocation.program, e
            ))
        })?;

        Ok(status.code())
    }
}

/// Runtime operations on the launched service process.
///
/// Mirrors the lifecycle handle pattern: launch returns a boxed handler and
/// everything after that (stop, liveness, reaping) goes through it.
#[async_trait]
pub trait ServiceHandler: Send {
    /// Terminate the service (SIGTERM, then SIGKILL if it lingers).
    async fn stop(&mut self) -> ShipwrightResult<()>;

    /// Check whether the service process is still running.
    fn is_running(&mut self) -> bool;

    /// Process ID of the service.
    fn pid(&self) -> u32;

    /// Reap the process if it has exited. `Ok(None)` while still running;
    /// `Ok(Some(code))` once exited (`None` code means signal death is
    /// reported as code `None` via `wait`).
    fn try_wait(&mut self) -> ShipwrightResult<Option<Option<i32>>>;

    /// Block until the service exits and return its exit code.
    fn wait(&mut self) -> ShipwrightResult<Option<i32>>;
}

/// Launch the service process and hand back a runtime handler.
pub trait ServiceLauncher: Send + Sync {
    fn launch(&self, invocation: &Invocation) -> ShipwrightResult<Box<dyn ServiceHandler>>;
}

/// Spawns the service as a plain child process with inherited stdio.
pub struct ProcessLauncher;

impl ServiceLauncher for ProcessLauncher {
    fn launch(&self, invocation: &Invocation) -> ShipwrightResult<Box<dyn ServiceHandler>> {
        let mut cmd = std::process::Command::new(&invocation.program);
        cmd.args(&invocation.args);
        for (key, value) in invocation.env.iter() {
            cmd.env(key, value);
        }
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::null());

        let child = cmd.spawn().map_err(|e| {
            ShipwrightError::Launch(format!(
                "failed to spawn service {}: {}",
                invocation.program, e
            ))
        })?;

        tracing::info!(pid = child.id(), program = %invocation.program, "service process spawned");

        Ok(Box::new(ChildHandler { child }))
    }
}

/// How long a stopped service gets to honor SIGTERM before SIGKILL.
const GRACE_PERIOD: std::time::Duration = std::time::Duration::from_millis(500);

struct ChildHandler {
    child: std::process::Child,
}

#[async_trait]
impl ServiceHandler for ChildHandler {
    async fn stop(&mut self) -> ShipwrightResult<()> {
        if self.try_wait()?.is_some() {
            return Ok(());
        }
        let pid = self.child.id();
        // SIGTERM first; delegate graceful shutdown to the service itself.
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        let deadline = std::time::Instant::now() + GRACE_PERIOD;
        while self.try_wait()?.is_none() && std::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        if self.try_wait()?.is_none() && is_process_alive(pid) {
            kill_process(pid);
        }
        let _ = self.child.wait();
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> ShipwrightResult<Option<Option<i32>>> {
        match self.child.try_wait() {
            Ok(Some(status)) => Ok(Some(status.code())),
            Ok(None) => Ok(None),
            Err(e) => Err(ShipwrightError::Internal(format!(
                "failed to poll service process: {}",
                e
            ))),
        }
    }

    fn wait(&mut self) -> ShipwrightResult<Option<i32>> {
        let status = self.child.wait().map_err(|e| {
            ShipwrightError::Internal(format!("failed to wait on service process: {}", e))
        })?;
        Ok(status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn process_runner_reports_exit_code() {
        let runner = ProcessRunner;
        let code = runner
            .run(&Invocation::new("sh").args(["-c", "exit 3"]))
            .await
            .unwrap();
        assert_eq!(code, Some(3));
    }

    #[tokio::test]
    async fn process_runner_passes_env_and_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        let env: Environment = [("MARKER", "42")].into_iter().collect();
        let runner = ProcessRunner;
        let code = runner
            .run(
                &Invocation::new("sh")
                    .args(["-c", "test \"$MARKER\" = 42 && test \"$(pwd)\" = \"$EXPECT\""])
                    .env({
                        let mut env = env;
                        env.set("EXPECT", dir.path().to_string_lossy());
                        env
                    })
                    .cwd(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(code, Some(0));
    }

    #[test]
    fn launcher_handler_reaps_exit() {
        let launcher = ProcessLauncher;
        let mut handler = launcher
            .launch(&Invocation::new("sh").args(["-c", "exit 5"]))
            .unwrap();
        assert_eq!(handler.wait().unwrap(), Some(5));
        assert!(!handler.is_running());
    }

    #[tokio::test]
    async fn launcher_stop_terminates_long_runner() {
        let launcher = ProcessLauncher;
        let mut handler = launcher
            .launch(&Invocation::new("sleep").args(["30"]))
            .unwrap();
        assert!(handler.is_running());
        handler.stop().await.unwrap();
        assert!(!handler.is_running());
    }
}
