//! Gated iteration loop controller.
//!
//! Drives a fixed sequence of agent roles over a workspace, iteration after
//! iteration, until the final role emits the completion promise and every
//! configured gate (checklists, tests, evidence, approval) holds.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gateloop::approve::approve;
use gateloop::dry_run::dry_run;
use gateloop::exit_codes;
use gateloop::io::approval::ApprovalDecision;
use gateloop::io::config::load_config;
use gateloop::io::executor::CommandRoleExecutor;
use gateloop::io::init::{GateloopPaths, InitOptions, init_workspace};
use gateloop::io::test_runner::ShellTestRunner;
use gateloop::logging;
use gateloop::looping::{LoopStop, RunOptions, run_loops};
use gateloop::status::{cancel, status};
use gateloop::validate::validate_workspace;

#[derive(Parser)]
#[command(
    name = "gateloop",
    version,
    about = "Iterate agent roles over a workspace until every completion gate holds"
)]
struct Cli {
    /// Workspace root (defaults to the current directory).
    #[arg(short = 'C', long = "dir", global = true, default_value = ".")]
    dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.gateloop/` with a default config, role templates and a spec placeholder.
    Init {
        /// Overwrite existing gateloop-owned files.
        #[arg(short, long)]
        force: bool,
    },
    /// Drive loops until completion, exhaustion or a stuck stop.
    Run {
        /// Only drive this loop.
        #[arg(long = "loop", value_name = "ID")]
        loop_id: Option<String>,
        /// Append `runner.fast_args` to the role command.
        #[arg(long)]
        fast: bool,
        /// Print gate summaries from existing artifacts without running anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show run state and each loop's latest gate summary.
    Status,
    /// Mark the active run inactive.
    Cancel,
    /// Check config, spec files and role templates.
    Validate,
    /// Record an approval decision for a loop.
    Approve {
        #[arg(long = "loop", value_name = "ID")]
        loop_id: String,
        /// Record a rejection instead of an approval.
        #[arg(long)]
        reject: bool,
        #[arg(long)]
        note: Option<String>,
    },
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => exit_code(code),
        Err(err) => {
            eprintln!("{err:#}");
            exit_code(exit_codes::FAILURE)
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn run(cli: Cli) -> Result<i32> {
    let root = cli.dir.as_path();
    match cli.command {
        Command::Init { force } => cmd_init(root, force),
        Command::Run {
            loop_id,
            fast,
            dry_run,
        } => {
            if dry_run {
                cmd_dry_run(root, loop_id.as_deref())
            } else {
                cmd_run(root, loop_id, fast)
            }
        }
        Command::Status => cmd_status(root),
        Command::Cancel => cmd_cancel(root),
        Command::Validate => cmd_validate(root),
        Command::Approve {
            loop_id,
            reject,
            note,
        } => cmd_approve(root, &loop_id, reject, note),
    }
}

fn config_path(root: &Path) -> PathBuf {
    GateloopPaths::new(root).config_path
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_workspace(root, &InitOptions { force }).context("gateloop init")?;
    println!("initialized {}", paths.dir.display());
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, loop_id: Option<String>, fast: bool) -> Result<i32> {
    let config = load_config(&config_path(root))?;
    let executor = CommandRoleExecutor::from_config(&config.runner, fast)?;
    let outcome = run_loops(
        root,
        &config,
        &executor,
        &ShellTestRunner,
        &RunOptions { loop_id },
        |it| {
            println!(
                "[{} #{}] {}",
                it.record.loop_id, it.record.iteration, it.record.summary
            );
        },
    )?;

    match &outcome.stop {
        LoopStop::Complete => {
            println!("complete: {}", outcome.loops_completed.join(", "));
            Ok(exit_codes::OK)
        }
        LoopStop::Exhausted {
            loop_id,
            max_iterations,
        } => {
            eprintln!("loop {loop_id} exhausted after {max_iterations} iteration(s)");
            Ok(exit_codes::FAILURE)
        }
        LoopStop::Stuck {
            loop_id,
            iteration,
            streak,
            threshold,
        } => {
            eprintln!(
                "loop {loop_id} stuck at iteration {iteration} (no progress for {streak}/{threshold} iterations)"
            );
            Ok(exit_codes::FAILURE)
        }
    }
}

fn cmd_dry_run(root: &Path, loop_id: Option<&str>) -> Result<i32> {
    let config = load_config(&config_path(root))?;
    for report in dry_run(root, &config, loop_id)? {
        println!("[{}] {}", report.loop_id, report.summary);
    }
    Ok(exit_codes::OK)
}

fn cmd_status(root: &Path) -> Result<i32> {
    let config = load_config(&config_path(root))?;
    print!("{}", status(root, &config)?.render());
    Ok(exit_codes::OK)
}

fn cmd_cancel(root: &Path) -> Result<i32> {
    match cancel(root)? {
        Some(state) => println!(
            "cancelled loop {} at iteration {}",
            state.current_loop_id.as_deref().unwrap_or("?"),
            state.iteration
        ),
        None => println!("no active run"),
    }
    Ok(exit_codes::OK)
}

fn cmd_validate(root: &Path) -> Result<i32> {
    let outcome = validate_workspace(root)?;
    for lp in &outcome.loops {
        println!(
            "loop {}: ok ({} role(s), {} checklist pattern(s))",
            lp.loop_id, lp.roles, lp.checklists
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_approve(root: &Path, loop_id: &str, reject: bool, note: Option<String>) -> Result<i32> {
    let config = load_config(&config_path(root))?;
    let decision = if reject {
        ApprovalDecision::Rejected
    } else {
        ApprovalDecision::Approved
    };
    let record = approve(root, &config, loop_id, decision, note)?;
    println!("loop {loop_id}: {:?} at {}", record.decision, record.decided_at);
    Ok(exit_codes::OK)
}
