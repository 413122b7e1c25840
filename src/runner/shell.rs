//! Shell runner - executes step commands as `<shell> -c <command>`

use crate::runner::{
    CommandInvocation, CommandOutput, CommandRunner, OutputSink, OutputTail, RunnerConfig,
    RunnerError, Stream,
};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

/// How long output is still collected after the shell has exited.
///
/// Background processes started by a step inherit its pipes; once this
/// elapses the step is finished regardless of them.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Runs commands through a local shell
#[derive(Debug, Clone)]
pub struct ShellRunner {
    config: RunnerConfig,
}

impl ShellRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn command(&self, invocation: &CommandInvocation) -> Command {
        let mut command = Command::new(&self.config.shell);
        command
            .arg("-c")
            .arg(&invocation.command)
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so a timeout can stop everything the step started
        #[cfg(unix)]
        {
            command.process_group(0);
        }

        for name in &self.config.passthrough {
            if let Ok(value) = std::env::var(name) {
                command.env(name, value);
            }
        }
        command.envs(&invocation.env);

        if let Some(dir) = invocation.workdir.as_ref().or(self.config.workdir.as_ref()) {
            command.current_dir(dir);
        }

        command
    }
}

/// Read `reader` line by line into the sink and the shared tail
async fn pump<R>(
    reader: R,
    stream: Stream,
    sink: Option<&dyn OutputSink>,
    tail: &Mutex<OutputTail>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        if let Some(sink) = sink {
            sink.on_line(stream, &line);
        }
        if let Ok(mut tail) = tail.lock() {
            tail.push(line);
        }
    }
}

/// Kill the step's process group and reap the shell
async fn terminate(child: &mut Child, pgid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pgid) = pgid {
            // SAFETY: killpg has no memory-safety preconditions; the group was
            // created for this step by `process_group(0)`.
            let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
            if rc != 0 {
                debug!(
                    "killpg({}) failed: {}",
                    pgid,
                    std::io::Error::last_os_error()
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pgid;

    if let Err(e) = child.kill().await {
        debug!("Failed to kill shell: {}", e);
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        invocation: &CommandInvocation,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutput, RunnerError> {
        debug!("Spawning {} -c {:?}", self.config.shell, invocation.command);

        let mut child = self
            .command(invocation)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                shell: self.config.shell.clone(),
                source,
            })?;
        let pgid = child.id();

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let tail = Mutex::new(OutputTail::new());

        let work = async {
            let readers = async {
                let read_stdout = async {
                    match stdout {
                        Some(out) => pump(out, Stream::Stdout, sink, &tail).await,
                        None => Ok(()),
                    }
                };
                let read_stderr = async {
                    match stderr {
                        Some(err) => pump(err, Stream::Stderr, sink, &tail).await,
                        None => Ok(()),
                    }
                };
                let (out, err) = tokio::join!(read_stdout, read_stderr);
                out.and(err)
            };
            tokio::pin!(readers);

            // The step ends when the shell exits, not when its pipes close
            let exited = tokio::select! {
                read = &mut readers => {
                    read?;
                    None
                }
                status = child.wait() => Some(status?),
            };

            match exited {
                Some(status) => {
                    if timeout(DRAIN_GRACE, &mut readers).await.is_err() {
                        debug!(
                            "Output still open {:?} after the shell exited, detaching: {}",
                            DRAIN_GRACE, invocation.command
                        );
                    }
                    Ok::<_, std::io::Error>(status)
                }
                None => child.wait().await,
            }
        };

        let outcome = timeout(Duration::from_secs(invocation.timeout_secs), work).await;
        let status = match outcome {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Command timed out after {}s: {}",
                    invocation.timeout_secs, invocation.command
                );
                terminate(&mut child, pgid).await;
                return Err(RunnerError::Timeout(invocation.timeout_secs));
            }
        };

        let output = tail
            .into_inner()
            .map(OutputTail::into_string)
            .unwrap_or_default();

        debug!("Command exited with {:?}", status.code());
        Ok(CommandOutput::new(status.code(), output))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn runner() -> ShellRunner {
        ShellRunner::new(RunnerConfig::new().with_shell("sh"))
    }

    fn invocation(command: &str) -> CommandInvocation {
        CommandInvocation {
            command: command.to_string(),
            env: BTreeMap::new(),
            timeout_secs: 10,
            workdir: None,
        }
    }

    struct Collect(Mutex<Vec<(Stream, String)>>);

    impl OutputSink for Collect {
        fn on_line(&self, stream: Stream, line: &str) {
            self.0.lock().unwrap().push((stream, line.to_string()));
        }
    }

    #[tokio::test]
    async fn test_exit_codes() {
        let ok = runner().run(&invocation("true"), None).await.unwrap();
        assert!(ok.success());

        let failed = runner().run(&invocation("exit 3"), None).await.unwrap();
        assert_eq!(failed.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_streams_both_pipes() {
        let sink = Collect(Mutex::new(Vec::new()));
        let result = runner()
            .run(&invocation("echo out; echo err 1>&2"), Some(&sink))
            .await
            .unwrap();

        let lines = sink.0.lock().unwrap().clone();
        assert!(lines.contains(&(Stream::Stdout, "out".to_string())));
        assert!(lines.contains(&(Stream::Stderr, "err".to_string())));
        assert!(result.output.contains("out"));
        assert!(result.output.contains("err"));
    }

    #[tokio::test]
    async fn test_environment_is_isolated() {
        std::env::set_var("CIMATRIX_LEAK_CHECK", "leaked");
        let mut inv = invocation("echo \"[$CIMATRIX_LEAK_CHECK][$JOB_VAR]\"");
        inv.env.insert("JOB_VAR".to_string(), "set".to_string());

        let result = runner().run(&inv, None).await.unwrap();
        assert_eq!(result.output, "[][set]");
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut inv = invocation("sleep 5");
        inv.timeout_secs = 1;
        let result = runner().run(&inv, None).await;
        assert!(matches!(result, Err(RunnerError::Timeout(1))));
    }

    #[tokio::test]
    async fn test_background_process_does_not_hold_step() {
        let mut inv = invocation("sleep 5 & echo started");
        inv.timeout_secs = 3;

        let started = std::time::Instant::now();
        let result = runner().run(&inv, None).await.unwrap();

        assert!(result.success());
        assert_eq!(result.output, "started");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_timeout_kills_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("survived");

        let mut inv = invocation("sh -c 'sleep 2; touch \"$MARKER\"'; echo never");
        inv.env
            .insert("MARKER".to_string(), marker.display().to_string());
        inv.timeout_secs = 1;

        let result = runner().run(&inv, None).await;
        assert!(matches!(result, Err(RunnerError::Timeout(1))));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists(), "a process of the timed-out step kept running");
    }

    #[tokio::test]
    async fn test_invocation_workdir_overrides_config() {
        let configured = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new(
            RunnerConfig::new()
                .with_shell("sh")
                .with_workdir(configured.path()),
        );

        let mut inv = invocation("touch here");
        inv.workdir = Some(scratch.path().to_path_buf());
        assert!(runner.run(&inv, None).await.unwrap().success());

        assert!(scratch.path().join("here").exists());
        assert!(!configured.path().join("here").exists());
    }

    #[tokio::test]
    async fn test_missing_shell() {
        let runner = ShellRunner::new(RunnerConfig::new().with_shell("nonexistent-shell-binary"));
        let result = runner.run(&invocation("true"), None).await;
        assert!(matches!(result, Err(RunnerError::Spawn { .. })));
    }
}
