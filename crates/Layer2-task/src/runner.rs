//! Task Runner - orchestrates one task execution
//!
//! resolve image -> compose environment -> create + start container ->
//! exec script (streamed) -> inspect -> teardown -> close.
//!
//! Every stage reads and returns explicit values; the only thing carried
//! between stages is the `RunContext` owned by a single `run` call.

use crate::engine::{ContainerEngine, ContainerHandle, ContainerSpec, ExecStatus, OutputChunk};
use crate::env::{compose_environment, Environment};
use crate::error::{EngineError, RunError};
use crate::image::ImageResolver;
use crate::sink::{LogSink, OutputSink};
use crate::state::RunState;
use crate::task::{ExecutionResult, Task, TaskId};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use taskbox_foundation::TaskboxConfig;
use tracing::{debug, error, info, warn};

/// Per-call options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Echo the script on the stdout sink before running it
    pub show_commands: bool,

    /// Stop and remove the container once the exec session ends
    pub stop_on_completion: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            show_commands: true,
            stop_on_completion: true,
        }
    }
}

impl RunOptions {
    /// Leave the container running for inspection
    pub fn keep_container(mut self) -> Self {
        self.stop_on_completion = false;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.show_commands = false;
        self
    }
}

/// State of one `run` call
struct RunContext {
    task_id: TaskId,
    state: RunState,
    started_at: DateTime<Utc>,
}

impl RunContext {
    fn new() -> Self {
        Self {
            task_id: TaskId::new(),
            state: RunState::Created,
            started_at: Utc::now(),
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(task = %self.task_id, "{} -> {}", self.state, next);
        self.state = next;
    }
}

/// What the exec stage collected from the stream
#[derive(Debug, Default)]
struct ExecOutcome {
    status: Option<ExecStatus>,
    last_stdout: Option<Bytes>,
    last_stderr: Option<Bytes>,
}

/// Diagnostic chunk for the result
///
/// Some runtimes report launch failures (command not found) only on stdout,
/// so a failed exec with no stderr falls back to the last stdout chunk.
pub(crate) fn diagnostic_chunk(
    exit_code: i64,
    last_stderr: Option<Bytes>,
    last_stdout: Option<Bytes>,
) -> Option<Bytes> {
    match last_stderr {
        Some(chunk) => Some(chunk),
        None if exit_code != 0 => last_stdout,
        None => None,
    }
}

/// Task Runner
pub struct TaskRunner {
    engine: Arc<dyn ContainerEngine>,

    resolver: ImageResolver,

    /// Idle command used when the task has no entrypoint
    default_entrypoint: String,

    default_working_dir: Option<String>,
}

impl TaskRunner {
    /// Create a runner with built-in defaults
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self::from_config(engine, &TaskboxConfig::new())
    }

    /// Create a runner using entrypoint, working dir and scratch dir from config
    pub fn from_config(engine: Arc<dyn ContainerEngine>, config: &TaskboxConfig) -> Self {
        Self {
            engine,
            resolver: ImageResolver::new(config.scratch_dir()),
            default_entrypoint: config.entrypoint().to_string(),
            default_working_dir: Some(config.working_dir().to_string()),
        }
    }

    /// Run with logging sinks and default options
    pub async fn run_default(&self, task: &Task) -> Result<ExecutionResult, RunError> {
        self.run(task, None, None, RunOptions::default()).await
    }

    /// Execute `task` to completion
    ///
    /// Sinks default to `LogSink::stdout()` / `LogSink::stderr()`. A nonzero
    /// exit code is returned as a normal result; only engine failures are
    /// errors.
    pub async fn run(
        &self,
        task: &Task,
        stdout: Option<&mut dyn OutputSink>,
        stderr: Option<&mut dyn OutputSink>,
        options: RunOptions,
    ) -> Result<ExecutionResult, RunError> {
        let mut default_stdout = LogSink::stdout();
        let mut default_stderr = LogSink::stderr();
        let stdout: &mut dyn OutputSink = match stdout {
            Some(sink) => sink,
            None => &mut default_stdout,
        };
        let stderr: &mut dyn OutputSink = match stderr {
            Some(sink) => sink,
            None => &mut default_stderr,
        };

        let mut ctx = RunContext::new();
        info!(task = %ctx.task_id, "Starting task with image {}", task.image);

        let result = self
            .run_stages(&mut ctx, task, stdout, stderr, options)
            .await;

        // connection goes last, after any teardown
        if let Err(e) = self.engine.close().await {
            warn!("Failed to close {} engine: {}", self.engine.name(), e);
        }

        match result {
            Ok(result) => Ok(result),
            Err(e) => {
                ctx.advance(RunState::Failed);
                error!(task = %ctx.task_id, stage = e.stage(), "{}", e);
                stderr.write(format!("{}\n", e).as_bytes());
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        ctx: &mut RunContext,
        task: &Task,
        stdout: &mut dyn OutputSink,
        stderr: &mut dyn OutputSink,
        options: RunOptions,
    ) -> Result<ExecutionResult, RunError> {
        let engine = self.engine.as_ref();

        let image_source = self
            .resolver
            .resolve(engine, task, stdout)
            .await
            .map_err(|source| RunError::ImageResolution {
                image: task.image.clone(),
                source,
            })?;
        info!(task = %ctx.task_id, "Image {} ready ({})", task.image, image_source);
        ctx.advance(RunState::ImageReady);

        let environment = compose_environment(&task.environment, &task.inputs, &task.outputs);
        let container = self.provision(ctx, task, &environment).await?;
        ctx.advance(RunState::Running);

        if options.show_commands {
            stdout.write(format!("$ {}\n", display_command(&task.script)).as_bytes());
        }

        let outcome = match self
            .execute(&container, task, &environment, stdout, stderr)
            .await
        {
            Ok(outcome) => outcome,
            Err(source) => {
                if options.stop_on_completion {
                    self.discard_container(&container).await;
                }
                return Err(RunError::Execution {
                    container: container.id.clone(),
                    source,
                });
            }
        };

        let status = outcome.status.unwrap_or(ExecStatus {
            exit_code: -1,
            pid: 0,
        });
        stdout.write(format!("Exit code {}\n", status.exit_code).as_bytes());
        info!(
            task = %ctx.task_id,
            container = %container,
            "Exec finished with exit code {}",
            status.exit_code
        );

        if options.stop_on_completion {
            self.teardown(&container).await?;
        } else {
            info!("Leaving container {} running", container);
        }

        ctx.advance(RunState::Completed);

        Ok(ExecutionResult {
            exit_code: status.exit_code,
            pid: status.pid,
            last_stderr_chunk: diagnostic_chunk(
                status.exit_code,
                outcome.last_stderr,
                outcome.last_stdout,
            ),
            container_id: container.id,
            started_at: ctx.started_at,
            finished_at: Utc::now(),
        })
    }

    /// Create and start the container
    ///
    /// A container whose start fails is removed again, so no container is
    /// left behind by a creation error.
    async fn provision(
        &self,
        ctx: &mut RunContext,
        task: &Task,
        environment: &Environment,
    ) -> Result<ContainerHandle, RunError> {
        let creation_error = |source| RunError::ContainerCreation {
            image: task.image.clone(),
            source,
        };

        let spec = ContainerSpec {
            name: ctx.task_id.container_name(),
            image: task.image.clone(),
            entrypoint: self.entrypoint_for(task),
            env: environment.clone(),
            working_dir: task
                .working_dir
                .clone()
                .or_else(|| self.default_working_dir.clone()),
        };

        let container = self
            .engine
            .create_container(&spec)
            .await
            .map_err(creation_error)?;
        ctx.advance(RunState::ContainerCreated);
        info!(task = %ctx.task_id, "Created container {}", container);

        if let Err(source) = self.engine.start_container(&container).await {
            if let Err(e) = self.engine.remove_container(&container).await {
                warn!("Failed to remove unstarted container {}: {}", container, e);
            }
            return Err(creation_error(source));
        }
        debug!("Started container {}", container);

        Ok(container)
    }

    /// Run the script as one exec session and drain its output
    async fn execute(
        &self,
        container: &ContainerHandle,
        task: &Task,
        environment: &Environment,
        stdout: &mut dyn OutputSink,
        stderr: &mut dyn OutputSink,
    ) -> Result<ExecOutcome, EngineError> {
        let exec = self
            .engine
            .exec_create(container, &task.script, environment)
            .await?;
        debug!("Created exec {} in container {}", exec, container);

        let mut output = self.engine.exec_start(&exec).await?;
        let mut outcome = ExecOutcome::default();

        while let Some(chunk) = output.next().await {
            match chunk? {
                OutputChunk::Stdout(bytes) if !bytes.is_empty() => {
                    stdout.write(&bytes);
                    outcome.last_stdout = Some(bytes);
                }
                OutputChunk::Stderr(bytes) if !bytes.is_empty() => {
                    stderr.write(&bytes);
                    outcome.last_stderr = Some(bytes);
                }
                _ => {}
            }
        }

        outcome.status = Some(self.engine.exec_inspect(&exec).await?);
        Ok(outcome)
    }

    /// Stop, then remove
    async fn teardown(&self, container: &ContainerHandle) -> Result<(), RunError> {
        let teardown_error = |source| RunError::Teardown {
            container: container.id.clone(),
            source,
        };

        self.engine
            .stop_container(container)
            .await
            .map_err(teardown_error)?;
        info!("Container {} stopped", container);

        self.engine
            .remove_container(container)
            .await
            .map_err(teardown_error)?;
        debug!("Container {} removed", container);
        Ok(())
    }

    /// Best-effort teardown after a failed exec
    async fn discard_container(&self, container: &ContainerHandle) {
        if let Err(e) = self.teardown(container).await {
            warn!("{}", e);
        }
    }

    fn entrypoint_for(&self, task: &Task) -> Vec<String> {
        let entrypoint = task
            .entrypoint
            .as_deref()
            .unwrap_or(&self.default_entrypoint);
        shlex::split(entrypoint).unwrap_or_else(|| {
            entrypoint
                .split_whitespace()
                .map(str::to_string)
                .collect()
        })
    }
}

/// Shell-quoted rendering of the script for the command echo
fn display_command(script: &[String]) -> String {
    shlex::try_join(script.iter().map(String::as_str)).unwrap_or_else(|_| script.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let chunk = diagnostic_chunk(
            1,
            Some(Bytes::from_static(b"B\n")),
            Some(Bytes::from_static(b"A\n")),
        );
        assert_eq!(chunk, Some(Bytes::from_static(b"B\n")));
    }

    #[test]
    fn test_diagnostic_falls_back_to_stdout_on_failure() {
        let chunk = diagnostic_chunk(126, None, Some(Bytes::from_static(b"exec failed\r\n")));
        assert_eq!(chunk, Some(Bytes::from_static(b"exec failed\r\n")));
    }

    #[test]
    fn test_diagnostic_empty_on_success() {
        assert_eq!(
            diagnostic_chunk(0, None, Some(Bytes::from_static(b"HELLO\n"))),
            None
        );
    }

    #[test]
    fn test_run_options() {
        let options = RunOptions::default();
        assert!(options.show_commands);
        assert!(options.stop_on_completion);

        let options = RunOptions::default().keep_container().quiet();
        assert!(!options.show_commands);
        assert!(!options.stop_on_completion);
    }

    #[test]
    fn test_display_command() {
        let plain = vec!["echo".to_string(), "HELLO".to_string()];
        assert_eq!(display_command(&plain), "echo HELLO");

        let script = vec!["sh".to_string(), "-c".to_string(), "echo A; exit 1".to_string()];
        let rendered = display_command(&script);
        assert_eq!(shlex::split(&rendered), Some(script));
    }
}
