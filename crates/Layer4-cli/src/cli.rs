//! Command implementations

use anyhow::Context;
use std::io;
use std::path::Path;
use std::sync::Arc;
use taskbox_foundation::TaskboxConfig;
use taskbox_task::{DockerEngine, RunOptions, Task, TaskRunner, WriterSink};
use tracing::{debug, warn};

/// Exit status when the task never produced one (engine failure)
pub const ENGINE_FAILURE_EXIT: i32 = 125;

/// Global + project config, or defaults if neither loads
pub fn load_config() -> TaskboxConfig {
    TaskboxConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        TaskboxConfig::new()
    })
}

/// Read and validate a task file
pub fn read_task(path: &Path) -> anyhow::Result<Task> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read task file {}", path.display()))?;
    Task::from_json(&json).with_context(|| format!("Invalid task file {}", path.display()))
}

/// Process exit status for a task exit code
///
/// Negative codes mean the engine never reported one.
pub fn exit_status(code: i64) -> i32 {
    match i32::try_from(code) {
        Ok(status) if status >= 0 => status,
        _ => ENGINE_FAILURE_EXIT,
    }
}

/// Run a task with output going to this process's stdout/stderr
///
/// Returns the exit status to terminate with.
pub async fn run_task(
    config: &TaskboxConfig,
    path: &Path,
    keep: bool,
    quiet: bool,
) -> anyhow::Result<i32> {
    let task = read_task(path)?;

    let engine = DockerEngine::connect(config).context("Failed to connect to Docker")?;
    engine.ping().await.context("Docker daemon is not responding")?;
    let runner = TaskRunner::from_config(Arc::new(engine), config);

    let mut options = RunOptions::default();
    if keep {
        options = options.keep_container();
    }
    if quiet || !config.show_commands() {
        options = options.quiet();
    }

    let mut stdout = WriterSink::new(io::stdout());
    let mut stderr = WriterSink::new(io::stderr());

    // a failed run has already reported itself on stderr
    match runner
        .run(&task, Some(&mut stdout), Some(&mut stderr), options)
        .await
    {
        Ok(result) => {
            debug!(
                "Task finished in {:.2}s",
                result.duration().as_secs_f64()
            );
            Ok(exit_status(result.exit_code))
        }
        Err(_) => Ok(ENGINE_FAILURE_EXIT),
    }
}

/// Config with every default filled in
pub fn effective_config(config: &TaskboxConfig) -> TaskboxConfig {
    TaskboxConfig {
        default_entrypoint: Some(config.entrypoint().to_string()),
        default_working_dir: Some(config.working_dir().to_string()),
        scratch_dir: Some(config.scratch_dir()),
        stop_timeout_secs: Some(config.stop_timeout_secs()),
        show_commands: Some(config.show_commands()),
        ..config.clone()
    }
}

/// Print the effective configuration as JSON
pub fn show_config(config: &TaskboxConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&effective_config(config))?);
    Ok(())
}
