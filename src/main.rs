use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::Duration;

use idereset::api::{Api, Target};
use idereset::automation::{AutomationOptions, ProgressEvent, StorageOptions};
use idereset::cleaner::{self, BackupManager, ResultTree, RunManifest, RunStatus};
use idereset::cli::args::{BackupsAction, Cli, Commands, ConfigAction, OutputFormat};
use idereset::cli::output;
use idereset::common::config::{Config, Preferences};
use idereset::common::{format, logging};
use idereset::ides::IdeDescriptor;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // File logging is best-effort; an unwritable home still gets console output
    let _guard = match logging::init(&Config::logs_dir(), cli.verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("  {} Logging disabled: {:#}", "⚠".yellow(), e);
            None
        }
    };

    show_onboarding(&cli);

    let success = match &cli.command {
        Commands::Detect { detailed } => cmd_detect(&cli, *detailed)?,

        Commands::Telemetry { yes } => cmd_operation(
            &cli,
            *yes,
            "Reset telemetry identifiers for",
            |api, target| api.modify_telemetry(target),
        )?,

        Commands::Database { yes } => cmd_operation(
            &cli,
            *yes,
            "Delete extension rows from the state database of",
            |api, target| api.clean_database(target),
        )?,

        Commands::Workspace { yes } => cmd_operation(
            &cli,
            *yes,
            "Remove extension entries from workspace storage of",
            |api, target| api.clean_workspace(target),
        )?,

        Commands::GlobalStorage { yes } => cmd_operation(
            &cli,
            *yes,
            "Remove extension entries from global storage of",
            |api, target| api.clean_global_storage(target),
        )?,

        Commands::Storage {
            workspace,
            global,
            yes,
        } => {
            // Neither flag means both areas
            let options = StorageOptions {
                include_workspace_storage: *workspace || !*global,
                include_global_storage: *global || !*workspace,
            };
            cmd_operation(
                &cli,
                *yes,
                "Clean extension storage of",
                move |api, target| api.clean_storage_comprehensive(target, &options),
            )?
        }

        Commands::All { yes } => cmd_pipeline(&cli, *yes, None)?,

        Commands::Auto {
            no_signout,
            no_cleaning,
            no_signin,
            no_restart,
            yes,
        } => {
            let mut options = load_config()?.automation;
            options.include_signout &= !no_signout;
            options.include_cleaning &= !no_cleaning;
            options.include_signin &= !no_signin;
            options.include_restart &= !no_restart;
            cmd_pipeline(&cli, *yes, Some(options))?
        }

        Commands::Stop => cmd_operation(&cli, true, "", |api, target| api.stop_ide(target))?,

        Commands::Start => cmd_operation(&cli, true, "", |api, target| api.start_ide(target))?,

        Commands::Backups { action } => cmd_backups(&cli, action)?,

        Commands::Config { action } => {
            cmd_config(action)?;
            true
        }

        Commands::Status { limit } => {
            cmd_status(&cli, *limit)?;
            true
        }

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            let shell = match shell {
                idereset::cli::args::CompletionShell::Bash => clap_complete::Shell::Bash,
                idereset::cli::args::CompletionShell::Zsh => clap_complete::Shell::Zsh,
                idereset::cli::args::CompletionShell::Fish => clap_complete::Shell::Fish,
            };
            clap_complete::generate(shell, &mut cmd, "idereset", &mut std::io::stdout());
            true
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

// ─── Shared helpers ───────────────────────────────────────────────────────────

fn load_config() -> Result<Config> {
    Config::load().context("Failed to load configuration (try `idereset config reset`)")
}

fn make_api() -> Result<Api> {
    Ok(Api::new(load_config()?, idereset::ides::Environment::from_process()))
}

fn is_human(cli: &Cli) -> bool {
    !cli.quiet && cli.format == OutputFormat::Human
}

/// One-time notice shown before the first interactive run
fn show_onboarding(cli: &Cli) {
    if !is_human(cli) || matches!(cli.command, Commands::Completions { .. }) {
        return;
    }
    let mut prefs = Preferences::load().unwrap_or_default();
    if !prefs.is_first_run() {
        return;
    }

    println!();
    println!("  {} Welcome to idereset", "👋");
    println!(
        "  Every file is backed up before it changes. Backups sit next to the"
    );
    println!(
        "  original (or under `backup_root`); list them with {}.",
        "idereset backups list".cyan()
    );
    println!(
        "  Close your IDEs first, or use {} to stop and restart them for you.",
        "idereset auto".cyan()
    );
    println!();

    if let Err(e) = prefs.mark_onboarding_shown() {
        tracing::warn!("Could not save preferences: {:#}", e);
    }
}

fn record_run() {
    let mut prefs = Preferences::load().unwrap_or_default();
    if let Err(e) = prefs.record_run() {
        tracing::warn!("Could not save preferences: {:#}", e);
    }
}

/// Ask `[y/N]`; anything but y/Y declines
fn confirm(question: &str) -> Result<bool> {
    print!("\n  {} {}? [y/N] ", "❓", question);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    if input.trim().eq_ignore_ascii_case("y") {
        Ok(true)
    } else {
        println!("  {} Cancelled", "✗".red());
        Ok(false)
    }
}

fn confirm_for(api: &Api, target: &Target, question: &str) -> Result<bool> {
    let ides = api.targets(target);
    if ides.is_empty() {
        // The operation itself reports that nothing matched
        return Ok(true);
    }
    let names: Vec<&str> = ides.iter().map(|d| d.display_name.as_str()).collect();
    confirm(&format!("{} {}", question, names.join(", ")))
}

fn print_tree(cli: &Cli, tree: &ResultTree) {
    match cli.format {
        OutputFormat::Human if !cli.quiet => output::print_tree(tree),
        OutputFormat::Json => output::print_tree_json(tree),
        _ => output::print_tree_quiet(tree),
    }
}

// ─── Detect ───────────────────────────────────────────────────────────────────

fn cmd_detect(cli: &Cli, detailed: bool) -> Result<bool> {
    let api = make_api()?;
    let ides = api.targets(&Target::from_selector(cli.ide.as_deref()));

    match cli.format {
        OutputFormat::Human if !cli.quiet => output::print_ides(&ides, detailed),
        OutputFormat::Json => output::print_ides_json(&ides),
        _ => output::print_ides_quiet(&ides),
    }
    Ok(true)
}

// ─── Single operations ────────────────────────────────────────────────────────

fn cmd_operation<F>(cli: &Cli, yes: bool, question: &str, op: F) -> Result<bool>
where
    F: FnOnce(&mut Api, &Target) -> ResultTree,
{
    let mut api = make_api()?;
    let target = Target::from_selector(cli.ide.as_deref());

    if !yes && !confirm_for(&api, &target, question)? {
        return Ok(true);
    }

    let tree = op(&mut api, &target);
    record_run();
    print_tree(cli, &tree);
    Ok(tree.success())
}

// ─── Pipelines ────────────────────────────────────────────────────────────────

/// `all` when `automation` is None, the full pipeline otherwise
fn cmd_pipeline(cli: &Cli, yes: bool, automation: Option<AutomationOptions>) -> Result<bool> {
    let mut api = make_api()?;
    let target = Target::from_selector(cli.ide.as_deref());

    if let Some(options) = &automation {
        if options.enabled_count() == 0 {
            anyhow::bail!("Every automation step is disabled; nothing to do");
        }
    }

    if !yes {
        let question = if automation.is_some_and(|o| o.include_signout || o.include_restart) {
            "Stop, clean and restart"
        } else {
            "Run every cleaning operation on"
        };
        if !confirm_for(&api, &target, question)? {
            return Ok(true);
        }
    }

    let show_progress = is_human(cli);
    let (tx, rx) = mpsc::channel::<ProgressEvent>();

    let worker = std::thread::spawn(move || {
        let mut send = |event: ProgressEvent| {
            let _ = tx.send(event);
        };
        match automation {
            Some(options) => api.run_full_automation(&target, Some(&options), &mut send),
            None => api.run_all_operations(&target, &mut send),
        }
    });

    let spinner = show_progress.then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    for event in rx {
        tracing::debug!("progress: {:?}", event);
        let Some(pb) = &spinner else { continue };
        match event {
            ProgressEvent::Detected { count } => {
                pb.set_message(format!("{} detected", format::format_count(count, "IDE")));
            }
            ProgressEvent::StepStarted { ide, step } => {
                pb.set_message(format!("{}: {}...", ide, step.label()));
            }
            ProgressEvent::StepFinished {
                ide,
                step,
                success,
                message,
            } if !success => {
                pb.println(format!(
                    "  {} {} / {}: {}",
                    "✗".red(),
                    ide,
                    step.label(),
                    message
                ));
            }
            ProgressEvent::IdeFinished { ide, success } => {
                pb.println(format!("  {} {}", format::format_status(success), ide));
            }
            _ => {}
        }
    }

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let tree = worker
        .join()
        .map_err(|_| anyhow::anyhow!("Automation worker panicked"))?;

    record_run();
    print_tree(cli, &tree);

    let cleaned = automation.is_some_and(|o| o.include_cleaning)
        && tree.status == RunStatus::Done
        && tree.succeeded_count() > 0;
    if cleaned && is_human(cli) {
        output::print_signin_instructions();
    }

    Ok(tree.success())
}

// ─── Backups ──────────────────────────────────────────────────────────────────

/// Directories where backups of an IDE's state end up
fn backup_dirs(ides: &[IdeDescriptor]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for ide in ides {
        // File copies and storage archives both land beside the original
        for (_, path) in ide.paths() {
            if let Some(dir) = path.parent().map(Path::to_path_buf) {
                if !dirs.contains(&dir) {
                    dirs.push(dir);
                }
            }
        }
    }
    dirs
}

fn cmd_backups(cli: &Cli, action: &BackupsAction) -> Result<bool> {
    let config = load_config()?;

    match action {
        BackupsAction::List => {
            let api = Api::new(config.clone(), idereset::ides::Environment::from_process());
            let ides = api.targets(&Target::from_selector(cli.ide.as_deref()));
            let entries = cleaner::list_backups(&backup_dirs(&ides), config.backup_root.as_deref());

            match cli.format {
                OutputFormat::Human if !cli.quiet => output::print_backups(&entries),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
                _ => {
                    for e in &entries {
                        println!("{}", e.backup_path.display());
                    }
                }
            }
            Ok(true)
        }
        BackupsAction::Restore { path, yes } => {
            if !*yes && !confirm(&format!("Restore {}", format::format_path(path)))? {
                return Ok(true);
            }
            let manager = BackupManager::new(config.backup_root.clone());
            let restored = cleaner::restore_backup(&manager, path, config.backup_root.as_deref())
                .with_context(|| format!("Failed to restore {}", path.display()))?;
            tracing::info!("Restored {} from {}", restored.display(), path.display());
            if !cli.quiet {
                println!(
                    "  {} Restored {}",
                    "✓".green(),
                    format::format_path(&restored)
                );
            }
            Ok(true)
        }
    }
}

// ─── Config ───────────────────────────────────────────────────────────────────

fn cmd_config(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init => {
            Config::init_dirs()?;
            let config = Config::default();
            config.save()?;
            println!("  {} idereset initialized at ~/.idereset", "✓".green());
            println!("  Created: config.toml, logs/");
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config()?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save()?;
            println!("  {} Configuration reset to defaults", "✓".green());
            Ok(())
        }
        ConfigAction::Set { key, value } => {
            let mut config = load_config()?;
            config.set_value(key, value)?;
            config.save()?;
            println!("  {} Set {} = {}", "✓".green(), key, value);
            Ok(())
        }
    }
}

// ─── Status ───────────────────────────────────────────────────────────────────

fn cmd_status(cli: &Cli, limit: usize) -> Result<()> {
    let config = load_config()?;
    let runs = RunManifest::recent(&Config::logs_dir(), limit)?;

    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    println!();
    println!("  {} idereset Status", "📊");
    println!("{}", "─".repeat(60).dimmed());
    println!();

    println!("  {} Vendor marker: {}", "⚙️", config.vendor_marker);
    println!(
        "  {} Backups: {}",
        "⚙️",
        config
            .backup_root
            .as_deref()
            .map(format::format_path)
            .unwrap_or_else(|| "next to originals".to_string())
    );
    println!(
        "  {} Lock JetBrains IDs: {}",
        "⚙️",
        if config.lock_jetbrains_ids { "yes" } else { "no" }
    );
    if !config.exclude_ides.is_empty() {
        println!("  {} Excluded: {}", "⚙️", config.exclude_ides.join(", "));
    }

    if let Ok(prefs) = Preferences::load() {
        if let Some(last) = prefs.last_run {
            println!(
                "  {} Last run: {}",
                "🕒",
                last.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
            );
        }
    }

    output::print_runs(&runs);
    Ok(())
}
