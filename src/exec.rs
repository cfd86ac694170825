//! External programs (the copier CLI, setup actions) behind the [`Executor`]
//! trait, so tests can record invocations instead of spawning processes.
use anyhow::{Context as _, Result, bail};
use std::path::Path;
use std::process::{Command, ExitStatus};

/// Captured output of a finished program.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
    /// Whether the exit status was zero.
    pub success: bool,
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
}

/// Spawns programs for the coordinator and the renderers.
pub trait Executor: Send + Sync {
    /// Run `program` in `dir` with extra environment variables and capture
    /// its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started or exits non-zero.
    fn run_in_with_env(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<ExecResult>;

    /// Run `program` in `dir` with the inherited environment and capture its
    /// output.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started or exits non-zero.
    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.run_in_with_env(dir, program, args, &[])
    }

    /// Run `program` in `dir` on the operator's terminal so it can prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started or exits non-zero.
    fn run_interactive_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<()>;

    /// Whether `program` resolves on `PATH`.
    fn which(&self, program: &str) -> bool;
}

/// [`Executor`] that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

fn exit_code(status: ExitStatus) -> String {
    status
        .code()
        .map_or_else(|| "signal".to_string(), |code| code.to_string())
}

impl Executor for SystemExecutor {
    fn run_in_with_env(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<ExecResult> {
        let output = Command::new(program)
            .args(args)
            .envs(env.iter().copied())
            .current_dir(dir)
            .output()
            .with_context(|| format!("cannot start {program} in {}", dir.display()))?;

        let result = ExecResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            code: output.status.code(),
        };
        if !result.success {
            bail!(
                "{program} exited with {}: {}",
                exit_code(output.status),
                result.stderr.trim()
            );
        }
        Ok(result)
    }

    fn run_interactive_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<()> {
        let status = Command::new(program)
            .args(args)
            .current_dir(dir)
            .status()
            .with_context(|| format!("cannot start {program} in {}", dir.display()))?;
        if !status.success() {
            bail!("{program} exited with {}", exit_code(status));
        }
        Ok(())
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn captures_stdout_from_tree_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let result = SystemExecutor.run_in(dir.path(), "ls", &[]).unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "marker");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_reports_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let err = SystemExecutor
            .run_in(dir.path(), "sh", &["-c", "echo nope >&2; exit 3"])
            .unwrap_err();
        assert_eq!(err.to_string(), "sh exited with 3: nope");
    }

    #[cfg(unix)]
    #[test]
    fn environment_reaches_the_program() {
        let dir = tempfile::tempdir().unwrap();
        let result = SystemExecutor
            .run_in_with_env(
                dir.path(),
                "sh",
                &["-c", "printf %s \"$DOTSYNC_ROOT\""],
                &[("DOTSYNC_ROOT", "/dots")],
            )
            .unwrap();
        assert_eq!(result.stdout, "/dots");
    }

    #[cfg(unix)]
    #[test]
    fn interactive_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        SystemExecutor
            .run_interactive_in(dir.path(), "true", &[])
            .unwrap();
        let err = SystemExecutor
            .run_interactive_in(dir.path(), "false", &[])
            .unwrap_err();
        assert_eq!(err.to_string(), "false exited with 1");
    }

    #[test]
    fn unknown_program_is_not_on_path() {
        assert!(!SystemExecutor.which("dotsync-no-such-tool"));
    }

    #[test]
    fn missing_program_fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let err = SystemExecutor
            .run_in(dir.path(), "dotsync-no-such-tool", &[])
            .unwrap_err();
        assert!(err.to_string().starts_with("cannot start dotsync-no-such-tool"));
    }
}
