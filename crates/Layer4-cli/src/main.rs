//! Taskbox CLI - Main entry point

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Taskbox - run a script inside a throwaway container
#[derive(Parser, Debug)]
#[command(name = "taskbox")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a task described by a JSON file
    Run {
        /// Path to the task JSON
        task: PathBuf,

        /// Leave the container running after the script exits
        #[arg(short, long)]
        keep: bool,

        /// Do not echo the command before running it
        #[arg(short, long)]
        quiet: bool,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout belongs to the task
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = cli::load_config();

    match args.command {
        Command::Run { task, keep, quiet } => {
            let code = cli::run_task(&config, &task, keep, quiet).await?;
            std::process::exit(code);
        }
        Command::Config => cli::show_config(&config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let args = Args::parse_from(["taskbox", "run", "task.json", "--keep", "--debug"]);
        assert!(args.debug);
        match args.command {
            Command::Run { task, keep, quiet } => {
                assert_eq!(task, PathBuf::from("task.json"));
                assert!(keep);
                assert!(!quiet);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_task() {
        assert!(Args::try_parse_from(["taskbox", "run"]).is_err());
    }
}
