use crate::metrics::Metrics;
use crate::models::config::ToolSettings;
use crate::models::{MAX_CONCURRENT_TOOL_PROCESSES, ProjectPaths};
use crate::services::fs_ops::relative_to;
use camino::{Utf8Path, Utf8PathBuf};
use std::future::Future;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// Errors reported by a single external tool invocation.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to launch {executable}: {source}")]
    LaunchFailed {
        executable: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with code {exit_code}")]
    NonZeroExit {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` reported success but did not produce {path}")]
    MissingOutput { command: String, path: Utf8PathBuf },
}

impl ToolError {
    /// The tool could not be started at all, so every following item would fail too.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ToolError::LaunchFailed { .. })
    }
}

/// Exit code and combined stdout/stderr of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub exit_code: i32,
    pub output: String,
}

/// Fully resolved process launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub executable: Utf8PathBuf,
    pub args: Vec<String>,
    pub working_dir: Utf8PathBuf,
}

impl ToolInvocation {
    pub fn command_line(&self) -> String {
        let mut line = self.executable.to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Runs a resolved invocation to completion.
///
/// [`ProcessRunner`] spawns real processes; tests substitute an in-process fake.
/// Only launch and wait failures surface as `Err`; exit codes are judged by the gateway.
pub trait ToolRunner: Send + Sync + 'static {
    fn run(
        &self,
        invocation: &ToolInvocation,
    ) -> impl Future<Output = io::Result<ProcessOutcome>> + Send;
}

/// Spawns the tool as a child process with captured output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> io::Result<ProcessOutcome> {
        let mut command = Command::new(invocation.executable.as_std_path());
        command
            .args(&invocation.args)
            .current_dir(invocation.working_dir.as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out invocation is dropped; take the child down with it.
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let output = command.output().await?;

        let mut text = decode_tool_output(&output.stdout);
        let stderr = decode_tool_output(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        Ok(ProcessOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            output: text,
        })
    }
}

/// The tool prints in the system code page; fall back to Windows-1251 when output is not UTF-8.
pub fn decode_tool_output(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => encoding_rs::WINDOWS_1251.decode(bytes).0.into_owned(),
    }
}

/// Timeout ceilings for tool invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolTimeouts {
    pub default: Duration,
    pub unpack: Duration,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self::from(&ToolSettings::default())
    }
}

impl From<&ToolSettings> for ToolTimeouts {
    fn from(settings: &ToolSettings) -> Self {
        Self {
            default: Duration::from_secs(settings.timeout_secs),
            unpack: Duration::from_secs(settings.unpack_timeout_secs),
        }
    }
}

/// `starter.exe` commands with their two path parameters.
///
/// Paths are absolute here and converted to game-root-relative form when the
/// single `"<command>,<param1>,<param2>"` argument is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StarterCommand {
    /// Unpack an archive into a directory.
    Unflat {
        archive: Utf8PathBuf,
        output_dir: Utf8PathBuf,
    },
    /// Game texture to DDS.
    Atf2Dds {
        source: Utf8PathBuf,
        target: Utf8PathBuf,
    },
    /// DDS to game texture.
    Dds2Atf {
        source: Utf8PathBuf,
        target: Utf8PathBuf,
    },
    /// WAV to `.loc_def.sound`.
    Wav2Aaf {
        source: Utf8PathBuf,
        target: Utf8PathBuf,
    },
    /// Build an archive from a `.!flatlist`.
    Mkflat {
        output: Utf8PathBuf,
        flatlist: Utf8PathBuf,
    },
}

impl StarterCommand {
    pub fn name(&self) -> &'static str {
        match self {
            StarterCommand::Unflat { .. } => "unflat",
            StarterCommand::Atf2Dds { .. } => "atf2dds",
            StarterCommand::Dds2Atf { .. } => "dds2atf",
            StarterCommand::Wav2Aaf { .. } => "wav2aaf",
            StarterCommand::Mkflat { .. } => "mkflat",
        }
    }

    fn params(&self) -> [&Utf8Path; 2] {
        match self {
            StarterCommand::Unflat {
                archive,
                output_dir,
            } => [archive, output_dir],
            StarterCommand::Atf2Dds { source, target }
            | StarterCommand::Dds2Atf { source, target }
            | StarterCommand::Wav2Aaf { source, target } => [source, target],
            StarterCommand::Mkflat { output, flatlist } => [output, flatlist],
        }
    }

    /// Path whose presence confirms the command did its work.
    pub fn expected_output(&self) -> &Utf8Path {
        match self {
            StarterCommand::Unflat { output_dir, .. } => output_dir,
            StarterCommand::Atf2Dds { target, .. }
            | StarterCommand::Dds2Atf { target, .. }
            | StarterCommand::Wav2Aaf { target, .. } => target,
            StarterCommand::Mkflat { output, .. } => output,
        }
    }

    pub fn is_unpack(&self) -> bool {
        matches!(self, StarterCommand::Unflat { .. })
    }

    /// The single command-line argument, e.g. `unflat,data/k43t/shared/packed_data/a.flatdata,users/modwork/x`.
    pub fn argument(&self, game_root: &Utf8Path) -> String {
        let [first, second] = self.params();
        format!(
            "{},{},{}",
            self.name(),
            relative_to(first, game_root),
            relative_to(second, game_root)
        )
    }
}

/// Single entry point to the external tool.
///
/// Serializes invocations through a semaphore of [`MAX_CONCURRENT_TOOL_PROCESSES`]
/// permits, applies timeout ceilings and verifies output on disk. Cloning shares the
/// runner, the semaphore and the metrics.
pub struct ToolGateway<R = ProcessRunner> {
    runner: Arc<R>,
    permits: Arc<Semaphore>,
    metrics: Arc<Metrics>,
    timeouts: ToolTimeouts,
}

impl<R> Clone for ToolGateway<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            permits: Arc::clone(&self.permits),
            metrics: Arc::clone(&self.metrics),
            timeouts: self.timeouts,
        }
    }
}

impl ToolGateway<ProcessRunner> {
    pub fn new(timeouts: ToolTimeouts) -> Self {
        Self::with_runner(ProcessRunner, timeouts)
    }
}

impl<R: ToolRunner> ToolGateway<R> {
    pub fn with_runner(runner: R, timeouts: ToolTimeouts) -> Self {
        Self {
            runner: Arc::new(runner),
            permits: Arc::new(Semaphore::new(MAX_CONCURRENT_TOOL_PROCESSES)),
            metrics: Arc::new(Metrics::new()),
            timeouts,
        }
    }

    /// Share an existing metrics instance instead of the gateway's own.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn timeouts(&self) -> ToolTimeouts {
        self.timeouts
    }

    /// Run `executable` with `args` in `working_dir`, waiting at most `limit`.
    ///
    /// A non-zero exit is an `Err` here; callers decide whether it is fatal for their batch.
    pub async fn invoke(
        &self,
        executable: &Utf8Path,
        args: &[String],
        working_dir: &Utf8Path,
        limit: Duration,
    ) -> Result<ProcessOutcome, ToolError> {
        if !executable.is_file() {
            self.metrics.record_tool_failure();
            return Err(ToolError::LaunchFailed {
                executable: executable.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "executable not found"),
            });
        }

        let invocation = ToolInvocation {
            executable: executable.to_path_buf(),
            args: args.to_vec(),
            working_dir: working_dir.to_path_buf(),
        };
        let command = invocation.command_line();

        // The semaphore is never closed, so acquiring only fails if that changes.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ToolError::LaunchFailed {
                executable: executable.to_path_buf(),
                source: io::Error::other("tool gateway shut down"),
            })?;

        tracing::info!("Executing: {}", command);
        self.metrics.record_tool_invocation();
        let start = Instant::now();

        let result = timeout(limit, self.runner.run(&invocation)).await;
        let elapsed = start.elapsed();
        self.metrics.record_tool_time(elapsed);

        let outcome = match result {
            Err(_) => {
                tracing::warn!("`{}` timed out after {:?}", command, limit);
                self.metrics.record_tool_timeout();
                self.metrics.record_tool_failure();
                return Err(ToolError::Timeout {
                    command,
                    timeout: limit,
                });
            }
            Ok(Err(source)) => {
                tracing::error!("Failed to launch {}: {}", executable, source);
                self.metrics.record_tool_failure();
                return Err(ToolError::LaunchFailed {
                    executable: executable.to_path_buf(),
                    source,
                });
            }
            Ok(Ok(outcome)) => outcome,
        };

        tracing::info!(
            "Tool finished in {:.2}s with exit code {}",
            elapsed.as_secs_f32(),
            outcome.exit_code
        );
        if !outcome.output.trim().is_empty() {
            tracing::debug!("Tool output:\n{}", outcome.output.trim_end());
        }

        if outcome.exit_code != 0 {
            tracing::warn!("`{}` exited with code {}", command, outcome.exit_code);
            self.metrics.record_tool_failure();
            return Err(ToolError::NonZeroExit {
                command,
                exit_code: outcome.exit_code,
                output: outcome.output,
            });
        }

        Ok(outcome)
    }

    /// Run a `starter.exe` command from the game root and check its output exists.
    pub async fn run_starter(
        &self,
        paths: &ProjectPaths,
        command: &StarterCommand,
    ) -> Result<ProcessOutcome, ToolError> {
        let limit = if command.is_unpack() {
            self.timeouts.unpack
        } else {
            self.timeouts.default
        };
        let argument = command.argument(paths.game_root());

        let outcome = self
            .invoke(&paths.starter_exe(), &[argument], paths.game_root(), limit)
            .await?;

        let expected = command.expected_output();
        if !expected.exists() {
            tracing::warn!("`{}` left no output at {}", command.name(), expected);
            self.metrics.record_tool_failure();
            return Err(ToolError::MissingOutput {
                command: command.name().to_string(),
                path: expected.to_path_buf(),
            });
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    /// Returns a fixed outcome and records what it was asked to run.
    struct ScriptedRunner {
        exit_code: i32,
        delay: Duration,
        calls: Mutex<Vec<ToolInvocation>>,
    }

    impl ScriptedRunner {
        fn new(exit_code: i32) -> Self {
            Self {
                exit_code,
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ToolRunner for ScriptedRunner {
        async fn run(&self, invocation: &ToolInvocation) -> io::Result<ProcessOutcome> {
            self.calls.lock().unwrap().push(invocation.clone());
            tokio::time::sleep(self.delay).await;
            Ok(ProcessOutcome {
                exit_code: self.exit_code,
                output: "done".to_string(),
            })
        }
    }

    fn game() -> (TempDir, ProjectPaths) {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        std::fs::write(root.join("starter.exe"), b"").unwrap();
        (temp, ProjectPaths::new(root.clone(), root.join("mod")))
    }

    #[test]
    fn test_starter_argument_is_relative() {
        let root = Utf8Path::new("/games/gt");
        let command = StarterCommand::Unflat {
            archive: root.join("data/k43t/shared/packed_data/tex_main.flatdata"),
            output_dir: root.join("users/modwork/_temp_unflat_tex_tex_main_1"),
        };
        assert_eq!(
            command.argument(root),
            "unflat,data/k43t/shared/packed_data/tex_main.flatdata,users/modwork/_temp_unflat_tex_tex_main_1"
        );
        assert!(command.is_unpack());
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_failure() {
        let gateway = ToolGateway::with_runner(ScriptedRunner::new(0), ToolTimeouts::default());
        let result = gateway
            .invoke(
                Utf8Path::new("/definitely/not/here/starter.exe"),
                &[],
                Utf8Path::new("."),
                Duration::from_secs(1),
            )
            .await;

        assert!(matches!(result, Err(ref e) if e.is_unreachable()));
        assert!(gateway.runner().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let (_temp, paths) = game();
        let gateway = ToolGateway::with_runner(ScriptedRunner::new(3), ToolTimeouts::default());

        let result = gateway
            .invoke(&paths.starter_exe(), &["x".to_string()], paths.game_root(), Duration::from_secs(1))
            .await;

        match result {
            Err(ToolError::NonZeroExit { exit_code, output, .. }) => {
                assert_eq!(exit_code, 3);
                assert_eq!(output, "done");
            }
            other => panic!("expected NonZeroExit, got {:?}", other),
        }
        assert_eq!(gateway.metrics().tool_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let (_temp, paths) = game();
        let mut runner = ScriptedRunner::new(0);
        runner.delay = Duration::from_secs(5);
        let gateway = ToolGateway::with_runner(runner, ToolTimeouts::default());

        let result = gateway
            .invoke(&paths.starter_exe(), &[], paths.game_root(), Duration::from_millis(20))
            .await;

        assert!(matches!(result, Err(ToolError::Timeout { .. })));
        assert_eq!(gateway.metrics().tool_timeouts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_success_without_output_is_missing_output() {
        let (_temp, paths) = game();
        let gateway = ToolGateway::with_runner(ScriptedRunner::new(0), ToolTimeouts::default());
        let command = StarterCommand::Atf2Dds {
            source: paths.game_root().join("a.texture"),
            target: paths.game_root().join("a.dds"),
        };

        let result = gateway.run_starter(&paths, &command).await;
        assert!(matches!(result, Err(ToolError::MissingOutput { .. })));

        let calls = gateway.runner().calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, vec!["atf2dds,a.texture,a.dds".to_string()]);
        assert_eq!(calls[0].working_dir, paths.game_root());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_reports_exit_code() {
        let runner = ProcessRunner;
        let invocation = ToolInvocation {
            executable: Utf8PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), "echo hi; exit 3".to_string()],
            working_dir: Utf8PathBuf::from("/"),
        };

        let outcome = runner.run(&invocation).await.unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.output.trim(), "hi");
    }
}
