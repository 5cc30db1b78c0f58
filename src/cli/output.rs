use colored::*;
use serde_json::Value;

use crate::automation::SIGNIN_INSTRUCTIONS;
use crate::cleaner::{BackupEntry, OperationResult, ResultTree, RunStatus, RunSummary, Step};
use crate::common::errors::ErrorKind;
use crate::common::format::{self, format_path, format_size, format_status, short_id};
use crate::common::permissions;
use crate::ides::IdeDescriptor;

// ─── Detection ───────────────────────────────────────────────────────────────

/// Print detected IDEs in human-readable format
pub fn print_ides(ides: &[IdeDescriptor], detailed: bool) {
    println!();
    println!("  {} Detected IDEs", "🔍");
    println!("{}", "─".repeat(60).dimmed());
    println!();

    if ides.is_empty() {
        println!("  No supported IDEs found.");
        println!();
        return;
    }

    for ide in ides {
        let version = ide.version.as_deref().unwrap_or("unknown version");
        println!(
            "  {} {:<24} {:<10} {}",
            "●".green(),
            ide.display_name.bold(),
            ide.family.to_string().dimmed(),
            version.dimmed()
        );

        if detailed {
            for (field, path) in ide.paths() {
                println!(
                    "      {} {:<26} {}",
                    "↳".dimmed(),
                    field.dimmed(),
                    format_path(path)
                );
            }
            if let Some(exe) = &ide.executable_path {
                println!(
                    "      {} {:<26} {}",
                    "↳".dimmed(),
                    "executable".dimmed(),
                    format_path(exe)
                );
            }
            println!();
        }
    }

    println!();
    println!(
        "  {} found",
        format::format_count(ides.len(), "IDE").cyan()
    );
    println!();
}

pub fn print_ides_json(ides: &[IdeDescriptor]) {
    match serde_json::to_string_pretty(ides) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing IDEs: {}", e),
    }
}

pub fn print_ides_quiet(ides: &[IdeDescriptor]) {
    for ide in ides {
        println!("{}\t{}", ide.name, ide.display_name);
    }
}

// ─── Result trees ────────────────────────────────────────────────────────────

/// Print a run result grouped by IDE and step
pub fn print_tree(tree: &ResultTree) {
    println!();
    println!("  {} {}", "🧹", operation_title(&tree.operation).bold());
    println!("{}", "─".repeat(60).dimmed());

    if tree.status == RunStatus::Aborted {
        println!();
        println!("  {} {}", "⚠".yellow(), tree.message.yellow());
        println!();
        return;
    }

    for (ide, report) in &tree.ides {
        println!();
        println!("  {} {}", format_status(report.success), ide.bold());
        for (step, result) in &report.steps {
            print_step(*step, result);
        }
    }

    println!();
    println!("{}", "─".repeat(60).dimmed());
    let summary = if tree.success() {
        tree.message.green()
    } else if tree.status == RunStatus::Cancelled {
        tree.message.yellow()
    } else {
        tree.message.red()
    };
    println!("  {}", summary);
    println!();
}

fn operation_title(operation: &str) -> &str {
    match operation {
        "telemetry" => "Telemetry Reset",
        "database" => "Database Cleaning",
        "workspace" => "Workspace Storage Cleaning",
        "global_storage" => "Global Storage Cleaning",
        "storage" => "Storage Cleaning",
        "all" => "All Cleaning Operations",
        "automation" => "Full Automation",
        "stop" => "Stop IDEs",
        "start" => "Start IDEs",
        other => other,
    }
}

fn print_step(step: Step, result: &OperationResult) {
    let marker = if result.is_skipped() {
        "–".dimmed()
    } else {
        format_status(result.is_success())
    };
    println!(
        "    {} {:<22} {}",
        marker,
        step.label(),
        result.message().dimmed()
    );

    for detail in step_details(step, result) {
        println!("        {} {}", "↳".dimmed(), detail.dimmed());
    }

    if let Some(err) = result.error() {
        println!("        {} {}: {}", "⚠".yellow(), err.kind, err.detail);
        if matches!(err.kind, ErrorKind::PermissionDenied | ErrorKind::ResourceBusy) {
            println!("        {} {}", "→".dimmed(), permissions::permission_hint().dimmed());
        }
    }

    if let Some(Value::Array(warnings)) = result.get("warnings") {
        for w in warnings.iter().filter_map(|w| w.as_str()) {
            println!("        {} {}", "⚠".yellow(), w.yellow());
        }
    }
}

/// Notable data fields worth a line of their own
fn step_details(step: Step, result: &OperationResult) -> Vec<String> {
    let mut lines = Vec::new();
    let text = |key: &str| result.get(key).and_then(|v| v.as_str()).map(str::to_string);

    match step {
        Step::Telemetry => {
            if let (Some(old), Some(new)) = (text("old_machine_id"), text("new_machine_id")) {
                lines.push(format!("machineId {} → {}", short_id(&old), short_id(&new)));
            }
            if let Some(device) = text("new_device_id") {
                lines.push(format!("devDeviceId {}", device));
            }
            for key in ["storage_backup", "machine_id_file_backup", "device_id_backup", "user_id_backup"] {
                if let Some(backup) = text(key) {
                    lines.push(format!("backup {}", format_path(std::path::Path::new(&backup))));
                }
            }
        }
        Step::Database => {
            if result.get("rows_deleted").is_some() {
                lines.push(format!("{} rows deleted", result.count("rows_deleted")));
            }
            if let Some(backup) = text("db_backup") {
                lines.push(format!("backup {}", format_path(std::path::Path::new(&backup))));
            }
        }
        Step::WorkspaceStorage | Step::GlobalStorage | Step::Storage => {
            if result.get("entries_deleted").is_some() {
                lines.push(format!(
                    "{} entries removed, {} freed",
                    result.count("entries_deleted"),
                    format_size(result.count("bytes_freed"))
                ));
            }
            if let Some(backup) = text("backup_path") {
                lines.push(format!("backup {}", format_path(std::path::Path::new(&backup))));
            }
        }
        Step::Signout | Step::Stop => {
            if result.get("processes_found").is_some() {
                lines.push(format!(
                    "{} of {} processes closed",
                    result.count("processes_closed"),
                    result.count("processes_found")
                ));
            }
        }
        Step::Restart | Step::Start => {
            if let Some(exe) = text("executable") {
                lines.push(format!("launched {}", format_path(std::path::Path::new(&exe))));
            }
        }
        Step::SigninPrep => {}
    }

    lines
}

pub fn print_tree_json(tree: &ResultTree) {
    match serde_json::to_string_pretty(tree) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results: {}", e),
    }
}

/// One line per IDE: name, ok/failed, failed steps
pub fn print_tree_quiet(tree: &ResultTree) {
    if tree.status == RunStatus::Aborted {
        println!("aborted\t{}", tree.message);
        return;
    }
    for (ide, report) in &tree.ides {
        let failed: Vec<&str> = report.failed_steps().iter().map(|s| s.label()).collect();
        println!(
            "{}\t{}\t{}",
            ide,
            if report.success { "ok" } else { "failed" },
            failed.join(",")
        );
    }
}

/// Next steps after an automation run that cleaned at least one IDE
pub fn print_signin_instructions() {
    println!("  {} Next steps:", "💡");
    for (i, step) in SIGNIN_INSTRUCTIONS.iter().enumerate() {
        println!("    {} {}", format!("{}.", i + 1).dimmed(), step);
    }
    println!();
}

// ─── Backups and history ─────────────────────────────────────────────────────

pub fn print_backups(entries: &[BackupEntry]) {
    println!();
    println!("  {} Backups", "💾");
    println!("{}", "─".repeat(80).dimmed());
    println!();

    if entries.is_empty() {
        println!("  No backups found.");
        println!();
        return;
    }

    for entry in entries {
        let kind = if entry.is_archive { "archive" } else { "copy" };
        println!(
            "  {:<8} {:>10}  {}",
            kind.dimmed(),
            format_size(entry.size_bytes),
            format_path(&entry.backup_path)
        );
        if let Some(source) = &entry.source_path {
            println!("           {} {}", "↳".dimmed(), format_path(source).dimmed());
        }
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!();
    println!(
        "  {} using {}",
        format::format_count(entries.len(), "backup"),
        format_size(total).cyan()
    );
    println!(
        "  {} Restore with: {}",
        "💡",
        "idereset backups restore <path>".cyan()
    );
    println!();
}

/// Print recent runs from the run log
pub fn print_runs(runs: &[RunSummary]) {
    println!();
    println!("  {} Recent Runs", "📋");
    println!("{}", "─".repeat(80).dimmed());
    println!();

    if runs.is_empty() {
        println!("  No runs recorded yet.");
        println!();
        return;
    }

    println!(
        "  {:<20} {:<16} {:<10} {:>8}  {}",
        "When".dimmed(),
        "Operation".dimmed(),
        "Status".dimmed(),
        "IDEs".dimmed(),
        "Summary".dimmed(),
    );
    println!("  {}", "─".repeat(76).dimmed());

    for run in runs {
        let status = match run.status {
            RunStatus::Done if run.ides_succeeded == run.ides_total => "done".green(),
            RunStatus::Done => "partial".yellow(),
            RunStatus::Aborted => "aborted".red(),
            RunStatus::Cancelled => "cancelled".yellow(),
        };
        println!(
            "  {:<20} {:<16} {:<10} {:>8}  {}",
            run.timestamp.format("%Y-%m-%d %H:%M:%S"),
            run.operation,
            status,
            format!("{}/{}", run.ides_succeeded, run.ides_total),
            format::truncate(&run.message, 40).dimmed()
        );
    }
    println!();
}
