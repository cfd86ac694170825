//! Setup actions declared in the manifest, run once after `init`.
use crate::config::Manifest;
use crate::logging::EntryStatus;
use crate::sync::SyncContext;

/// Run the actions matching the host platform, in manifest order.
///
/// Each action runs in the tree root with `DOTSYNC_ROOT` and `HOME` set. A
/// failing action is recorded and the rest still run. Returns the names of
/// the actions that failed.
pub fn run_actions(ctx: &SyncContext, manifest: &Manifest) -> Vec<String> {
    let root = ctx.root().to_string_lossy().into_owned();
    let home = ctx.home.to_string_lossy().into_owned();
    let env = [("DOTSYNC_ROOT", root.as_str()), ("HOME", home.as_str())];
    let mut failed = Vec::new();

    for action in manifest.actions_for(&ctx.platform) {
        if ctx.is_cancelled() {
            ctx.log.warn("interrupted; remaining setup actions were skipped");
            break;
        }
        let label = format!("action {}", action.name);
        let Some((program, rest)) = action.command.split_first() else {
            continue;
        };

        if ctx.dry_run {
            ctx.log
                .dry_run(&format!("would run {label}: {}", action.command.join(" ")));
            ctx.log.record(&label, EntryStatus::DryRun, None);
            continue;
        }

        ctx.log.info(&format!("running {label}"));
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();
        match ctx.executor.run_in_with_env(ctx.root(), program, &args, &env) {
            Ok(result) => {
                let output = result.stdout.trim();
                if !output.is_empty() {
                    ctx.log.debug(output);
                }
                ctx.log.record(&label, EntryStatus::Synced, None);
            }
            Err(e) => {
                ctx.log.error(&format!("{label} failed: {e:#}"));
                let reason = e.to_string();
                ctx.log.record(&label, EntryStatus::Failed, Some(&reason));
                failed.push(action.name.clone());
            }
        }
    }
    failed
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::exec::{ExecResult, Executor};
    use crate::logging::{Log, Logger};
    use crate::platform::{Os, Platform};
    use anyhow::{Result, bail};
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// Records `program args | env` lines; `fail` programs exit non-zero.
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<String>>,
    }

    impl Executor for RecordingExecutor {
        fn run_in_with_env(
            &self,
            _dir: &Path,
            program: &str,
            args: &[&str],
            env: &[(&str, &str)],
        ) -> Result<ExecResult> {
            let env: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();
            self.calls.lock().unwrap().push(format!(
                "{program} {} | {}",
                args.join(" "),
                env.join(" ")
            ));
            if program == "fail" {
                bail!("fail exited 1");
            }
            Ok(ExecResult {
                stdout: String::new(),
                stderr: String::new(),
                success: true,
                code: Some(0),
            })
        }

        fn run_interactive_in(&self, _dir: &Path, _program: &str, _args: &[&str]) -> Result<()> {
            Ok(())
        }

        fn which(&self, _program: &str) -> bool {
            true
        }
    }

    fn manifest() -> Manifest {
        Manifest::from_json(
            r#"{
                "actions": [
                    { "name": "plugins", "platform": "unix", "command": ["sh", "-c", "true"] },
                    { "name": "fonts", "platform": "windows", "command": ["pwsh", "fonts.ps1"] },
                    { "name": "broken", "command": ["fail"] },
                    { "name": "cache", "command": ["mkdir", "-p", "cache"] }
                ]
            }"#,
        )
        .unwrap()
    }

    fn context(logger: Arc<Logger>, exec: Arc<RecordingExecutor>) -> SyncContext {
        let log: Arc<dyn Log> = logger;
        SyncContext::new(Path::new("/dots"), Path::new("/home/u"), log)
            .with_platform(Platform::new(Os::Unix))
            .with_executor(exec)
    }

    #[test]
    fn runs_host_actions_and_continues_after_failure() {
        let logger = Arc::new(Logger::with_log_file(None));
        let exec = Arc::new(RecordingExecutor::default());
        let ctx = context(Arc::clone(&logger), Arc::clone(&exec));

        let failed = run_actions(&ctx, &manifest());

        assert_eq!(failed, vec!["broken"]);
        let calls = exec.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], "sh -c true | DOTSYNC_ROOT=/dots HOME=/home/u");
        assert!(calls[2].starts_with("mkdir -p cache"));
        assert_eq!(logger.count(EntryStatus::Synced), 2);
        assert_eq!(logger.failure_count(), 1);
    }

    #[test]
    fn dry_run_executes_nothing() {
        let logger = Arc::new(Logger::with_log_file(None));
        let exec = Arc::new(RecordingExecutor::default());
        let ctx = context(Arc::clone(&logger), Arc::clone(&exec)).with_dry_run(true);

        assert!(run_actions(&ctx, &manifest()).is_empty());
        assert!(exec.calls.lock().unwrap().is_empty());
        assert_eq!(logger.count(EntryStatus::DryRun), 3);
    }
}
