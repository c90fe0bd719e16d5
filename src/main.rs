use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use snippet_patcher::config::{load_from_path, load_or_default, parse_changes};
use snippet_patcher::workspace::{self, load_history, load_project, save_history, write_project};
use snippet_patcher::{
    CommandGenerator, Commit, Engine, EngineConfig, EngineError, FailedChange, GeneratedChanges,
    Project,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_INSTRUCTION: &str = "Apply the proposed changes";

#[derive(Parser)]
#[command(name = "snippet-patcher")]
#[command(about = "Apply snippet-anchored changes to a project, with undo", long_about = None)]
#[command(version)]
struct Cli {
    /// Engine config (defaults to <project>/.snippet-patcher/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a change payload to a project
    Apply {
        /// Project root directory
        #[arg(short, long)]
        project: PathBuf,

        /// JSON change payload ("-" reads stdin)
        #[arg(short, long)]
        changes: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Shell command that repairs failed changes
        #[arg(long)]
        corrector: Option<String>,

        /// Instruction passed to the corrector
        #[arg(short, long)]
        instruction: Option<String>,
    },

    /// Restore the project to the state before the last apply
    Undo {
        /// Project root directory
        #[arg(short, long)]
        project: PathBuf,
    },

    /// Show the undo history
    History {
        /// Project root directory
        #[arg(short, long)]
        project: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            project,
            changes,
            dry_run,
            diff,
            corrector,
            instruction,
        } => cmd_apply(
            &project,
            cli.config.as_deref(),
            changes.as_deref(),
            dry_run,
            diff,
            corrector,
            instruction,
        ),

        Commands::Undo { project } => cmd_undo(&project, cli.config.as_deref()),

        Commands::History { project } => cmd_history(&project, cli.config.as_deref()),
    }
}

fn load_config(root: &Path, explicit: Option<&Path>) -> Result<EngineConfig> {
    let config = match explicit {
        Some(path) => load_from_path(path)?,
        None => load_or_default(workspace::config_path(root))?,
    };
    Ok(config)
}

fn read_payload(path: &Path) -> Result<GeneratedChanges> {
    let input = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read changes from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read changes from {}", path.display()))?
    };
    Ok(parse_changes(&input)?)
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &str, original: &str, modified: &str) {
    println!("\n{}", format!("--- {} (original)", file).dimmed());
    println!("{}", format!("+++ {} (patched)", file).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn print_failure(failed: &FailedChange) {
    eprintln!(
        "{} {}: {}",
        "✗".red(),
        failed.change.file_name,
        failed.reason
    );
    if let Some(description) = &failed.change.description {
        eprintln!("  Change: {}", description);
    }
    if let Some(hint) = &failed.hint {
        eprintln!("  {}", hint.dimmed());
    }
}

fn report_error(error: &EngineError) {
    eprintln!("{} {}", "✗".red(), error);
    for failed in error.failed_changes() {
        print_failure(failed);
    }
}

fn cmd_apply(
    root: &Path,
    config_path: Option<&Path>,
    changes: Option<&Path>,
    dry_run: bool,
    show_diff: bool,
    corrector: Option<String>,
    instruction: Option<String>,
) -> Result<()> {
    let config = load_config(root, config_path)?;
    let engine = Engine::new(config);
    let project = load_project(root)?;
    let mut history = load_history(root, engine.config().history.capacity)?;

    let payload = changes.map(read_payload).transpose()?;

    println!("Project: {}", root.display());
    println!("Files: {}", project.files().len());
    if dry_run {
        println!("{}", "[DRY RUN - showing what would be applied]".cyan());
    }
    println!();

    // A single recommendation applies all or nothing; plans keep what resolves.
    let result = match (corrector, payload) {
        (None, Some(GeneratedChanges::Single(recommendation))) => {
            engine.apply_recommendation_once(&project, &mut history, &recommendation)
        }
        (None, Some(GeneratedChanges::Batch(batch))) => {
            engine.apply_batch(&project, &mut history, &batch)
        }
        (Some(command), payload) => {
            let generator = CommandGenerator::new(command);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(async {
                let instruction = instruction.as_deref();
                match payload {
                    Some(GeneratedChanges::Single(recommendation)) => {
                        engine
                            .apply_recommendation(
                                &project,
                                &mut history,
                                &generator,
                                instruction.unwrap_or(DEFAULT_INSTRUCTION),
                                &recommendation,
                            )
                            .await
                    }
                    Some(GeneratedChanges::Batch(batch)) => {
                        engine
                            .apply_plan(
                                &project,
                                &mut history,
                                &generator,
                                instruction.unwrap_or(DEFAULT_INSTRUCTION),
                                &batch,
                            )
                            .await
                    }
                    None => {
                        engine
                            .run_instruction(
                                &project,
                                &mut history,
                                &generator,
                                instruction.unwrap_or_default(),
                            )
                            .await
                    }
                }
            })
        }
        (None, None) => anyhow::bail!("nothing to apply: pass --changes or --corrector"),
    };

    let commit = match result {
        Ok(commit) => commit,
        Err(error) => {
            report_error(&error);
            std::process::exit(1);
        }
    };

    report_commit(&project, &commit, dry_run, show_diff);

    if !dry_run && !commit.applied.is_empty() {
        write_project(root, &project, &commit.project)?;
        save_history(root, &history)?;
    }

    if !commit.failed.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}

fn report_commit(before: &Project, commit: &Commit, dry_run: bool, show_diff: bool) {
    let verb = if dry_run { "Would apply" } else { "Applied" };
    for change in &commit.applied {
        let label = change.description.as_deref().unwrap_or("change");
        println!(
            "{} {}: {} to {}",
            "✓".green(),
            label,
            verb,
            change.file_name
        );
    }
    for failed in &commit.failed {
        print_failure(failed);
    }

    if show_diff {
        for name in commit.touched_files() {
            if let (Some(original), Some(patched)) =
                (before.content(name), commit.project.content(name))
            {
                display_diff(name, original, patched);
            }
        }
    }

    if !commit.manual_steps.is_empty() {
        println!();
        println!("{}", "Manual steps:".bold());
        for step in &commit.manual_steps {
            match &step.detail {
                Some(detail) => println!("  - {}: {}", step.title, detail.dimmed()),
                None => println!("  - {}", step.title),
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", commit.applied.len()).green());
    println!("  {} failed", format!("{}", commit.failed.len()).red());
    println!(
        "  {} files touched",
        format!("{}", commit.touched_files().len()).cyan()
    );
    if commit.attempts > 1 {
        println!("  {} attempts", commit.attempts);
    }
}

fn cmd_undo(root: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(root, config_path)?;
    let engine = Engine::new(config);
    let before = load_project(root)?;
    let mut history = load_history(root, engine.config().history.capacity)?;

    let mut project = before.clone();
    if !engine.undo(&mut project, &mut history) {
        println!("{}", "Nothing to undo".yellow());
        return Ok(());
    }

    let written = write_project(root, &before, &project)?;
    save_history(root, &history)?;

    println!("{} Restored {} file(s)", "✓".green(), written.len());
    for name in &written {
        println!("  - {}", name);
    }
    println!("  {} snapshot(s) left", history.len());
    Ok(())
}

fn cmd_history(root: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(root, config_path)?;
    let history = load_history(root, config.history.capacity)?;

    println!("{}", "Undo History".bold());
    println!("Project: {}", root.display());
    println!("Depth: {}/{}", history.len(), history.capacity());
    println!();

    // Newest first
    for (idx, snapshot) in history.iter().rev().enumerate() {
        let changed: u32 = snapshot.files.iter().map(|f| f.changes_count).sum();
        println!(
            "  {} {} files, {} recorded changes",
            format!("#{}", idx + 1).cyan(),
            snapshot.files.len(),
            changed
        );
    }
    Ok(())
}
