//! zipcode CLI.
//!
//! Runs a prompt through the deterministic agent runtime of a workspace:
//! classification, planning, policy validation and step execution.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use zipcode::agents::classifier::IntentClassifier;
use zipcode::bootstrap;
use zipcode::core::intent_rules::rule_violations;
use zipcode::core::status::RuntimeStatus;
use zipcode::core::types::ExecutionResult;
use zipcode::core::validator::Decision;
use zipcode::exit_codes;
use zipcode::io::config::{ZipcodeConfig, write_config};
use zipcode::io::history::JsonlRunHistory;
use zipcode::io::workspace::{Workspace, WorkspacePaths};
use zipcode::logging;
use zipcode::runtime::RuntimeEvent;

#[derive(Parser)]
#[command(
    name = "zipcode",
    version,
    about = "Deterministic runtime for a coding agent"
)]
struct Cli {
    /// Workspace root.
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,
    /// Enable debug tracing on stderr.
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify, plan, validate and execute a prompt.
    Run {
        prompt: String,
        /// Approve every step that needs approval.
        #[arg(short, long)]
        yes: bool,
    },
    /// Classify a prompt and print the intent JSON.
    Classify { prompt: String },
    /// Write `.zipcode/config.toml` with defaults.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Print recent runs, newest last.
    History {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.debug);
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let Cli {
        workspace, command, ..
    } = cli;
    match command {
        Command::Run { prompt, yes } => cmd_run(&workspace, &prompt, yes).await,
        Command::Classify { prompt } => cmd_classify(&workspace, &prompt).await,
        Command::Init { force } => cmd_init(&workspace, force),
        Command::History { limit } => cmd_history(&workspace, limit),
    }
}

async fn cmd_run(root: &Path, prompt: &str, yes: bool) -> Result<i32> {
    let workspace = Workspace::load(root)?;
    let approvals = bootstrap::approval_gate(workspace.config().runtime.approval, yes);
    let runtime = bootstrap::build_runtime(&workspace, approvals)?;
    let handle = runtime.handle();
    let mut events = handle.subscribe();

    let run = runtime.run(prompt);
    tokio::pin!(run);
    let mut cancelling = false;
    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome?,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => eprintln!("({missed} events not shown)"),
                Err(RecvError::Closed) => {}
            },
            signal = tokio::signal::ctrl_c(), if !cancelling => {
                signal?;
                cancelling = true;
                eprintln!("cancelling...");
                handle.cancel();
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }

    println!("{}: {}", outcome.status, outcome.summary);
    Ok(exit_code(outcome.status))
}

async fn cmd_classify(root: &Path, prompt: &str) -> Result<i32> {
    let workspace = Workspace::load(root)?;
    let provider_config = &workspace.config().provider;
    let provider =
        bootstrap::openai_provider(provider_config, bootstrap::api_key(provider_config)?)?;
    let intent = IntentClassifier::new(provider).classify(prompt).await?;
    for violation in rule_violations(prompt, &intent) {
        eprintln!("warning: {violation}");
    }
    println!("{}", serde_json::to_string_pretty(&intent)?);
    Ok(exit_codes::OK)
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = WorkspacePaths::new(root);
    if paths.config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            paths.config_path.display()
        );
    }
    write_config(&paths.config_path, &ZipcodeConfig::default())?;
    println!("wrote {}", paths.config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_history(root: &Path, limit: usize) -> Result<i32> {
    let workspace = Workspace::load(root)?;
    let history = JsonlRunHistory::new(&workspace.paths().history_path);
    let records = history.read_all()?;
    if records.is_empty() {
        println!("no runs recorded in {}", history.path().display());
        return Ok(exit_codes::OK);
    }
    let skip = records.len().saturating_sub(limit);
    for record in &records[skip..] {
        println!(
            "{}  {:<10} {}  {}",
            record.run_id,
            record.status.to_string(),
            record.started_at.to_rfc3339(),
            record.prompt
        );
        if let Some(reason) = &record.reason {
            println!("    {reason}");
        }
    }
    Ok(exit_codes::OK)
}

fn exit_code(status: RuntimeStatus) -> i32 {
    match status {
        RuntimeStatus::Succeeded => exit_codes::OK,
        RuntimeStatus::Cancelled => exit_codes::CANCELLED,
        _ => exit_codes::FAILED,
    }
}

fn print_event(event: &RuntimeEvent) {
    for line in event_lines(event) {
        println!("{line}");
    }
}

fn event_lines(event: &RuntimeEvent) -> Vec<String> {
    match event {
        RuntimeEvent::StatusChanged { to, .. } => vec![format!("[{to}]")],
        RuntimeEvent::IntentClassified { intent, .. } => vec![format!(
            "intent: {}",
            serde_json::to_string(intent).unwrap_or_default()
        )],
        RuntimeEvent::PlanCreated { steps, .. } => std::iter::once("plan:".to_string())
            .chain(steps.iter().map(|step| format!("  {}. {}", step.id, step.task)))
            .collect(),
        RuntimeEvent::PlanValidated { report, .. } => {
            let mut lines = Vec::new();
            for (step_id, result) in report.results() {
                match result.decision {
                    Decision::Allowed => {}
                    Decision::NeedApproval => lines.push(format!(
                        "  step {step_id} needs approval: {}",
                        result.approval_reason.as_deref().unwrap_or_default()
                    )),
                    Decision::Blocked => lines.push(format!(
                        "  step {step_id} blocked: {}",
                        result.error.as_deref().unwrap_or_default()
                    )),
                }
                if let Some(warning) = &result.warning {
                    lines.push(format!("  step {step_id} warning: {warning}"));
                }
            }
            lines.extend(report.diagnostics().iter().map(|d| format!("  note: {d}")));
            lines
        }
        RuntimeEvent::ApprovalRequested { .. } => Vec::new(),
        RuntimeEvent::StepStarted { step_id, .. } => vec![format!("step {step_id} started")],
        RuntimeEvent::StepCompleted {
            step_id, result, ..
        } => vec![match result {
            ExecutionResult::Succeeded => {
                format!("step {step_id} succeeded")
            }
            ExecutionResult::Failed { cause } => {
                format!("step {step_id} failed: {cause}")
            }
            ExecutionResult::Cancelled => {
                format!("step {step_id} cancelled")
            }
        }],
    }
}
