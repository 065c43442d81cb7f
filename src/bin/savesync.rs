//! # savesync CLI
//!
//! Command-line front end for the savesync library.
//!
//! ## Features
//! - Detect save files on this machine and register them
//! - Compare local saves with the vault
//! - Pull local saves into the vault and push vault copies back
//! - List and restore the vault's backup history
//!
//! ## Usage
//! ```bash
//! # Find save files and register them for this machine
//! savesync detect --game-dir "C:/Games/Touhou"
//!
//! # What would happen?
//! savesync status
//!
//! # Local → vault, then vault → local on another machine
//! savesync pull all
//! savesync push th08
//!
//! # History
//! savesync backup th08 --list
//! savesync backup th08 --restore 2025-12-01T12-00-00Z-score.dat
//! ```
//!
//! Unless overridden, the vault, logs and configuration live in `vault/`,
//! `logs/` and `data/` next to the executable.

use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::{Input, MultiSelect, Select};
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use savesync::clock::{Clock, SystemClock};
use savesync::config::{ConfigStore, SyncConfig};
use savesync::conflict::{ConflictChoice, ConflictResolver};
use savesync::device::DeviceIdentity;
use savesync::events::{EventSink, FanoutSink, JsonLinesSink, TracingSink};
use savesync::session::{register_candidates, register_paths, BatchReport, SyncSession, TitleAction, ALL_TITLES};
use savesync::titles::{detect, display_name, DetectCandidate, SearchRoots};
use savesync::types::{ComparisonResult, Direction, FileMetadata, Recommendation};
use savesync::utils::format_bytes;
use savesync::{Result, SyncError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// savesync - keep game saves in step through a portable vault
#[derive(Parser)]
#[command(name = "savesync")]
#[command(version)]
#[command(about = "Offline save-data synchronization between local machines and a portable vault")]
#[command(long_about = None)]
struct Cli {
    /// Vault directory (defaults to <exe dir>/vault)
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// Log directory (defaults to <exe dir>/logs)
    #[arg(long, global = true)]
    logs: Option<PathBuf>,

    /// Configuration directory (defaults to <exe dir>/data)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find save files on this machine and register them
    Detect {
        /// Game installation directory to search as well
        #[arg(short, long)]
        game_dir: Option<PathBuf>,

        /// Register every candidate without prompting
        #[arg(short, long)]
        yes: bool,
    },

    /// Compare local saves with the vault
    Status {
        /// Title code or "all"
        #[arg(default_value = ALL_TITLES)]
        target: String,
    },

    /// Copy local saves into the vault
    Pull {
        /// Title code or "all"
        #[arg(default_value = ALL_TITLES)]
        target: String,
    },

    /// Copy vault saves over local ones
    Push {
        /// Title code or "all"
        #[arg(default_value = ALL_TITLES)]
        target: String,

        /// Overwrite even when the local copy looks newer or the game is running
        #[arg(short, long)]
        force: bool,
    },

    /// Show or restore a title's backup history
    Backup {
        /// Title code
        title: String,

        /// List backups (the default)
        #[arg(short, long)]
        list: bool,

        /// Restore the named backup over the vault copy
        #[arg(short, long, value_name = "NAME")]
        restore: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose || std::env::var_os("RUST_LOG").is_some() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

/// Everything a command needs
struct Context {
    config: SyncConfig,
    store: ConfigStore,
    clock: Arc<dyn Clock>,
}

impl Context {
    fn new(cli: &Cli) -> Result<Self> {
        let base = exe_dir()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let config_dir = cli.data.clone().unwrap_or_else(|| base.join("data"));
        let store = ConfigStore::new(&config_dir, clock.clone());
        let rules = store.load_rules()?;

        let config = SyncConfig::builder()
            .vault_root(cli.vault.clone().unwrap_or_else(|| base.join("vault")))
            .log_root(cli.logs.clone().unwrap_or_else(|| base.join("logs")))
            .config_dir(config_dir)
            .history_limit(rules.history_limit)
            .build()?;

        Ok(Self { config, store, clock })
    }

    fn sink(&self) -> Result<Arc<dyn EventSink>> {
        let file = JsonLinesSink::new(&self.config.log_root, self.clock.clone())?;
        Ok(Arc::new(FanoutSink::new(vec![Arc::new(file), Arc::new(TracingSink)])))
    }

    fn session(&self, device: &DeviceIdentity, resolver: Arc<dyn ConflictResolver>) -> Result<SyncSession> {
        Ok(SyncSession::builder(self.config.clone())
            .device_id(device.id.clone())
            .paths(self.store.load_paths()?)
            .resolver(resolver)
            .sink(self.sink()?)
            .clock(self.clock.clone())
            .build())
    }
}

fn exe_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

fn run(cli: Cli) -> Result<()> {
    let ctx = Context::new(&cli)?;

    match cli.command {
        Commands::Detect { game_dir, yes } => cmd_detect(&ctx, game_dir, yes),
        Commands::Status { target } => cmd_status(&ctx, &target),
        Commands::Pull { target } => cmd_pull(&ctx, &target),
        Commands::Push { target, force } => cmd_push(&ctx, &target, force),
        Commands::Backup { title, list, restore } => cmd_backup(&ctx, &title, list, restore),
    }
}

fn print_header(command: &str, device: &DeviceIdentity) {
    println!("{}", format!("=== savesync {} ===", command).blue().bold());
    println!("Device: {} ({})\n", device.id.yellow(), device.hostname);
}

/// Probe known locations and register the chosen save files
fn cmd_detect(ctx: &Context, game_dir: Option<PathBuf>, yes: bool) -> Result<()> {
    let device = DeviceIdentity::detect()?;
    print_header("detect", &device);

    println!("Searching for save files...");
    let report = detect(&SearchRoots::from_env(), game_dir.as_deref(), &savesync::metadata::FsMetadataProvider)?;

    let matcher = ctx.store.load_rules()?.matcher()?;
    let candidates: Vec<&DetectCandidate> = report
        .candidates
        .iter()
        .filter(|c| {
            let name = c.title.file_name;
            let keep = matcher.is_sync_target(name);
            if !keep {
                println!("  {} {} excluded by rules ({})", "-".dimmed(), c.title.code, name);
            }
            keep
        })
        .collect();

    if candidates.is_empty() {
        println!("{}", "No save files found.".yellow());
    } else {
        println!("\nFound {} candidate(s):\n", candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            println!("[{}] {} ({})", i + 1, candidate.title.code.yellow().bold(), candidate.title.name);
            println!("    Path: {}", candidate.path.display().to_string().cyan());
            println!("    {}", describe_candidate(&candidate.metadata));
        }
        println!();
    }

    let selected: Vec<&DetectCandidate> = if yes || candidates.is_empty() {
        candidates
    } else {
        let items: Vec<String> = candidates
            .iter()
            .map(|c| format!("{}  {}", c.title.code, c.path.display()))
            .collect();
        let defaults = vec![true; items.len()];
        let chosen = MultiSelect::new()
            .with_prompt("Select save files to register")
            .items(&items)
            .defaults(&defaults)
            .interact()
            .map_err(prompt_error)?;
        chosen.into_iter().map(|i| candidates[i]).collect()
    };

    let mut registered = register_candidates(&ctx.store, &device, &selected, ctx.clock.as_ref())?;
    for candidate in &selected {
        println!("Registered: {} -> {}", candidate.title.code, candidate.path.display());
    }

    if !yes && !report.not_found.is_empty() {
        println!("\n{}", "=== Manual Registration ===".blue().bold());
        println!("{} title(s) not found automatically.\n", report.not_found.len());

        let mut manual: Vec<(&str, PathBuf)> = Vec::new();
        for title in &report.not_found {
            let input: String = Input::new()
                .with_prompt(format!("{} path (empty to skip)", display_name(title.code)))
                .allow_empty(true)
                .interact_text()
                .map_err(prompt_error)?;
            let input = input.trim();
            if !input.is_empty() {
                println!("Registered: {} -> {}", title.code, input);
                manual.push((title.code, PathBuf::from(input)));
            }
        }

        if !manual.is_empty() {
            registered += register_paths(
                &ctx.store,
                &device,
                manual.iter().map(|(code, path)| (*code, path.as_path())),
                ctx.clock.as_ref(),
            )?;
        }
    }

    println!(
        "\n{} Configuration saved ({} new path(s))",
        "✓".green().bold(),
        registered.to_string().cyan()
    );
    Ok(())
}

fn describe_candidate(meta: &FileMetadata) -> String {
    if !meta.readable {
        return "[NOT READABLE]".red().to_string();
    }
    format!(
        "Size: {}  ModTime: {}  Hash: {}",
        meta.size,
        meta.modified.format("%Y-%m-%d %H:%M"),
        meta.short_hash()
    )
}

/// Print the comparison table
fn cmd_status(ctx: &Context, target: &str) -> Result<()> {
    let device = DeviceIdentity::detect()?;
    print_header("status", &device);

    let session = ctx.session(&device, Arc::new(DialoguerResolver::new(None)))?;
    let statuses = session.status(target)?;
    if statuses.is_empty() {
        println!("No titles configured. Run 'savesync detect' first.");
        return Ok(());
    }

    println!("{:<8} {:<35} {:<35} {:<25}", "Title", "Local(best)", "Vault(main)", "Recommendation");
    println!("{}", "-".repeat(110));

    for (title, status) in statuses {
        match status {
            Ok(status) => {
                let c = &status.comparison;
                println!(
                    "{:<8} {:<35} {:<35} {}",
                    title,
                    file_info(&c.local),
                    file_info(&c.remote),
                    colored_recommendation(c)
                );
            }
            Err(e) => println!("{:<8} {} {}", title, "ERROR:".red(), e.user_message()),
        }
    }
    Ok(())
}

fn file_info(meta: &FileMetadata) -> String {
    if !meta.exists {
        return "[NOT EXIST]".to_string();
    }
    if !meta.readable {
        return "[NOT READABLE]".to_string();
    }
    format!(
        "size={} m={} h={}",
        meta.size,
        meta.modified.format("%y-%m-%d %H:%M"),
        meta.short_hash()
    )
}

fn colored_recommendation(c: &ComparisonResult) -> ColoredString {
    let reason = shorten(&c.reason, 40);
    match c.recommendation {
        Recommendation::Pull => format!("→ PULL ({})", reason).green(),
        Recommendation::Push => format!("← PUSH ({})", reason).cyan(),
        Recommendation::Skip => "= SKIP (identical)".dimmed(),
        Recommendation::Conflict => format!("⚠ CONFLICT ({})", reason).yellow().bold(),
    }
}

fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max - 3).collect();
    format!("{}...", head)
}

fn cmd_pull(ctx: &Context, target: &str) -> Result<()> {
    let device = DeviceIdentity::detect()?;
    print_header("pull", &device);

    let spinner = spinner("Pulling...");
    let session = ctx.session(&device, Arc::new(DialoguerResolver::new(Some(spinner.clone()))))?;
    if session.targets(target)?.is_empty() {
        spinner.finish_and_clear();
        println!("No titles configured. Run 'savesync detect' first.");
        return Ok(());
    }

    let start = Instant::now();
    let report = session.pull(target)?;
    spinner.finish_and_clear();

    for title in &report.titles {
        match &title.outcome {
            Ok(outcome) => {
                let reason = &outcome.comparison.reason;
                match outcome.action {
                    TitleAction::Copied => {
                        println!("{} {}: Pulled to vault ({})", "✓".green().bold(), title.title, reason)
                    }
                    TitleAction::ResolvedLocal => {
                        println!("{} {}: Pulled to vault (user chose local)", "✓".green().bold(), title.title)
                    }
                    TitleAction::ResolvedRemote => println!("- {}: Kept vault version (user choice)", title.title),
                    TitleAction::Cancelled => println!("- {}: Cancelled by user", title.title),
                    TitleAction::Skipped if outcome.comparison.recommendation == Recommendation::Push => {
                        println!("- {}: Vault is newer, skipped ({})", title.title, reason)
                    }
                    TitleAction::Skipped => println!("- {}: Skipped ({})", title.title, reason),
                }
                if let Some(backup) = &outcome.backup {
                    println!("    Backup: {}", backup.display().to_string().dimmed());
                }
                let archived: usize = outcome.archives.iter().map(|(_, r)| r.archived).sum();
                if archived > 0 {
                    println!("    Archived: {} new file(s)", archived.to_string().cyan());
                }
            }
            Err(e) => println!("{} {}: {}", "✗".red().bold(), title.title, e.user_message()),
        }
    }

    print_summary(&report, start.elapsed());
    Ok(())
}

fn cmd_push(ctx: &Context, target: &str, force: bool) -> Result<()> {
    let device = DeviceIdentity::detect()?;
    print_header("push", &device);
    if force {
        println!("{}\n", "⚠ Force mode enabled".yellow().bold());
    }

    let spinner = spinner("Pushing...");
    let session = ctx.session(&device, Arc::new(DialoguerResolver::new(Some(spinner.clone()))))?;
    if session.targets(target)?.is_empty() {
        spinner.finish_and_clear();
        println!("No titles configured. Run 'savesync detect' first.");
        return Ok(());
    }

    let start = Instant::now();
    let report = session.push(target, force)?;
    spinner.finish_and_clear();

    for title in &report.titles {
        match &title.outcome {
            Ok(outcome) if outcome.action == TitleAction::Copied => {
                println!(
                    "{} {}: Pushed to local ({})",
                    "✓".green().bold(),
                    title.title,
                    outcome.comparison.reason
                );
                if let Some(backup) = &outcome.backup {
                    println!("    Backup: {}", backup.display().to_string().dimmed());
                }
            }
            Ok(outcome) => println!("- {}: Skipped ({})", title.title, outcome.comparison.reason),
            Err(e) => println!("{} {}: {}", "✗".red().bold(), title.title, e.user_message()),
        }
    }

    print_summary(&report, start.elapsed());
    Ok(())
}

fn print_summary(report: &BatchReport, elapsed: Duration) {
    let s = &report.summary;
    println!("\n{}", "=== Summary ===".blue().bold());
    println!(
        "Success: {}, Skipped: {}, Conflicts: {}, Cancelled: {}, Errors: {}",
        s.succeeded.to_string().green(),
        s.skipped,
        s.conflicts.to_string().yellow(),
        s.cancelled,
        if s.failed > 0 {
            s.failed.to_string().red()
        } else {
            s.failed.to_string().normal()
        }
    );
    let elapsed = Duration::from_millis(elapsed.as_millis() as u64);
    println!("Time: {}", format_duration(elapsed).to_string().cyan());
}

/// List or restore a title's history
fn cmd_backup(ctx: &Context, title: &str, list: bool, restore: Option<String>) -> Result<()> {
    savesync::titles::validate_title_code(title)?;
    println!("{}\n", format!("=== savesync backup: {} ===", title).blue().bold());

    let device = DeviceIdentity::detect()?;
    let session = ctx.session(&device, Arc::new(DialoguerResolver::new(None)))?;

    match restore {
        Some(name) if !list => {
            println!("Restoring backup: {}", name.yellow());
            let target = session.restore(title, &name)?;
            println!("{} Restored {} to vault", "✓".green().bold(), name);
            println!("  Target: {}", target.display().to_string().cyan());
        }
        _ => {
            let details = session.backups().backup_details(title)?;
            if details.is_empty() {
                println!("No backups found.");
                return Ok(());
            }

            println!("Found {} backup(s):\n", details.len());
            for (i, entry) in details.iter().enumerate() {
                println!("[{}] {}", i + 1, entry.name.yellow());
                if let Some(ts) = entry.timestamp {
                    println!("    Time: {}", ts.format("%Y-%m-%d %H:%M:%S UTC"));
                }
                match &entry.error {
                    Some(error) => println!("    {}: {}", "Error".red(), error),
                    None => println!("    Size: {} ({} bytes)", format_bytes(entry.size).cyan(), entry.size),
                }
                println!();
            }
        }
    }
    Ok(())
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn prompt_error(e: dialoguer::Error) -> SyncError {
    let dialoguer::Error::IO(e) = e;
    SyncError::Io(e)
}

/// Asks on the terminal how to settle a conflict
struct DialoguerResolver {
    progress: Option<ProgressBar>,
}

impl DialoguerResolver {
    fn new(progress: Option<ProgressBar>) -> Self {
        Self { progress }
    }

    fn prompt(comparison: &ComparisonResult, title: &str, direction: Direction) -> Result<ConflictChoice> {
        println!("\n{} Conflict detected for {}:", "⚠".yellow().bold(), display_name(title));
        println!("   {}\n", comparison.reason);
        println!("File details:");
        println!("  Local:  {}", conflict_side(&comparison.local));
        println!("  Vault:  {}", conflict_side(&comparison.remote));
        println!();

        let items = match direction {
            Direction::Pull => ["Use local file (pull to vault)", "Use vault file (keep vault version)", "Cancel"],
            Direction::Push => ["Use local file (keep local version)", "Use vault file (push to local)", "Cancel"],
        };
        let choice = Select::new()
            .with_prompt("Which file should be used?")
            .items(&items)
            .default(2)
            .interact_opt()
            .map_err(prompt_error)?;

        Ok(match choice {
            Some(0) => ConflictChoice::Local,
            Some(1) => ConflictChoice::Remote,
            _ => ConflictChoice::Cancel,
        })
    }
}

fn conflict_side(meta: &FileMetadata) -> String {
    format!(
        "size={}, mtime={}, hash={}",
        meta.size,
        meta.modified.format("%Y-%m-%d %H:%M:%S"),
        meta.short_hash()
    )
}

impl ConflictResolver for DialoguerResolver {
    fn resolve(&self, comparison: &ComparisonResult, title: &str, direction: Direction) -> Result<ConflictChoice> {
        match &self.progress {
            Some(pb) => pb.suspend(|| Self::prompt(comparison, title, direction)),
            None => Self::prompt(comparison, title, direction),
        }
    }
}
