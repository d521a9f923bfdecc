use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, RwLock};

use maestro::config::Config;
use maestro::core::task::TaskId;
use maestro::history::History;
use maestro::orchestration::{
    plan_command, CliRunner, ParallelExecutor, ProgressEvent, TaskManager,
};
use maestro::parser::{self, Command as ParsedCommand};
use maestro::{mlog, Error, Result};

/// Maestro - multi-agent task orchestration engine
#[derive(Parser, Debug)]
#[command(name = "maestro")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    MAESTRO_DEBUG=1    Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.maestro/maestro.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Override the configured concurrency bound
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Execute a command line (agents, fan-outs, pipelines)
    Run {
        /// The command, e.g. "@pm Plan -> @builder Build"
        line: String,

        /// Emit a JSON report instead of human-readable output
        #[arg(long)]
        headless: bool,
    },

    /// Parse a command line and print its structure without running it
    Parse {
        /// The command to parse
        line: String,
    },

    /// Show the stored result of a finished task
    Show {
        /// Task id, e.g. "a1b2c3d4-pm-0"
        task_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    maestro::log::init_with_debug(cli.debug);
    mlog!("maestro starting");

    match cli.command {
        Command::Run { line, headless } => run_line(&line, headless, cli.max_concurrent).await,
        Command::Parse { line } => parse_line(&line),
        Command::Show { task_id } => show_task(&task_id),
    }
}

async fn run_line(line: &str, headless: bool, max_concurrent: Option<usize>) -> Result<()> {
    let command = parser::parse(line)?;
    match &command {
        ParsedCommand::System { name, .. } => {
            return Err(Error::Validation(format!(
                "system command /{} is handled by the shell, not run",
                name
            )));
        }
        ParsedCommand::Raw { .. } => {
            return Err(Error::Validation(
                "input is not an agent command; try \"@agent <task>\"".to_string(),
            ));
        }
        _ => {}
    }

    let config = Config::load()?;
    let bound = max_concurrent.unwrap_or(config.max_concurrent);

    let plan = plan_command(&command, &config)?;
    let task_ids = plan.task_ids();
    let mut manager = TaskManager::new();
    manager.register_plan(plan)?;
    let manager = Arc::new(RwLock::new(manager));

    let runner = Arc::new(CliRunner::new(config));
    let (progress_tx, mut progress_rx) = mpsc::channel(256);
    let printer = (!headless).then(|| {
        tokio::spawn(async move {
            while let Some(event) = progress_rx.recv().await {
                print_event(&event);
            }
        })
    });

    let executor = ParallelExecutor::new(manager, runner)
        .with_max_concurrent(bound)
        .with_progress(progress_tx)
        .with_history(History::open_default()?);

    let report = executor.run().await?;
    if let Some(printer) = printer {
        // The progress sender is dropped with the executor, so the
        // printer drains and exits.
        drop(executor);
        let _ = printer.await;
    }

    if headless {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        println!(
            "{} completed, {} failed, {} skipped, {} cancelled in {:.1}s",
            report.completed.len(),
            report.failed.len(),
            report.skipped.len(),
            report.cancelled.len(),
            report.duration.as_secs_f64()
        );
        for id in &task_ids {
            if let Some(result) = report.results.get(id) {
                if result.success {
                    println!("\n=== {} ===\n{}", id, result.output);
                } else {
                    println!(
                        "\n=== {} ===\n{}",
                        id,
                        result.error.as_deref().unwrap_or("no error recorded")
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::AgentRunning { agent_id, task_id, .. } => {
            println!("[{}] running ({})", agent_id, task_id);
        }
        ProgressEvent::AgentStreaming { .. } => {}
        ProgressEvent::AgentComplete { agent_id, task_id } => {
            println!("[{}] completed ({})", agent_id, task_id);
        }
        ProgressEvent::AgentFailed {
            agent_id,
            task_id,
            error,
        } => {
            println!("[{}] failed ({}): {}", agent_id, task_id, error);
        }
        ProgressEvent::AgentCancelled { agent_id, task_id } => {
            println!("[{}] cancelled ({})", agent_id, task_id);
        }
    }
}

fn parse_line(line: &str) -> Result<()> {
    let command = parser::parse(line)?;
    println!("{}", serde_json::to_string_pretty(&command)?);
    Ok(())
}

fn show_task(task_id: &str) -> Result<()> {
    let history = History::open_default()?;
    let id = TaskId::from(task_id);
    match history.load(&id)? {
        Some(result) if result.success => {
            println!("{}", result.output);
            Ok(())
        }
        Some(result) => {
            println!(
                "task {} did not complete: {}",
                id,
                result.error.as_deref().unwrap_or("no error recorded")
            );
            Ok(())
        }
        None => Err(Error::TaskNotFound(id)),
    }
}
