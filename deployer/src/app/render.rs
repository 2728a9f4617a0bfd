//! Terminal summaries for the client workflows

use colored::{ColoredString, Colorize};
use deploy_api::models::{CommandResult, DeleteReport, DeploymentResult};

use crate::app::deploy::DeployReport;
use crate::app::remote_cmd::CommandReport;
use crate::utils::format_bytes;

/// Output lines shown per command in a deployment summary
const DEPLOY_OUTPUT_LINES: usize = 3;

/// Color a log line by its level marker
pub fn log_line(line: &str) -> ColoredString {
    if line.contains("ERROR") {
        line.red()
    } else if line.contains("WARNING") {
        line.yellow()
    } else if line.contains("INFO") {
        line.cyan()
    } else {
        line.normal()
    }
}

pub fn print_log_line(line: &str) {
    println!("{}", log_line(line));
}

fn header(title: &str) {
    println!();
    println!("{}", format!("  {title}  ").white().on_blue().bold());
    println!();
}

fn step(title: &str) {
    println!();
    println!("{} {}", "▸".yellow(), title.bold());
}

fn deletions(label: &str, report: &DeleteReport) {
    println!(
        "   {}: {} deleted, {} skipped, {} failed",
        label,
        report.deleted.len().to_string().cyan(),
        report.skipped.len(),
        report.failed.len()
    );
    for failed in &report.failed {
        println!("     {}", failed.red());
    }
}

fn apply(result: &DeploymentResult) {
    if let Some(report) = &result.deletions {
        deletions("Manual deletions", report);
    }
    let extraction = &result.extraction;
    if extraction.success {
        println!("   {} {}", "✓".green(), extraction.message);
        println!(
            "   Files extracted: {} in {}s",
            extraction.files_extracted.to_string().cyan(),
            extraction.duration_seconds
        );
    } else {
        println!("   {} {}", "✗".red(), extraction.message.red());
    }
    if let Some(report) = &result.auto_deletions {
        deletions("Removed at source", report);
    }
}

fn command(result: &CommandResult, max_lines: Option<usize>) {
    let icon = if result.success { "✓".green() } else { "✗".red() };
    println!(
        "   {} {} {}",
        icon,
        result.command,
        format!("({}ms)", result.duration_ms).dimmed()
    );
    if let Some(error) = result.error.as_deref().filter(|_| !result.success) {
        println!("     {}", format!("Error: {error}").red());
    }

    let lines: Vec<&str> = result
        .output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    let shown = max_lines.unwrap_or(lines.len()).min(lines.len());
    for line in &lines[..shown] {
        println!("     {}", line.dimmed());
    }
    if shown < lines.len() {
        println!(
            "     {}",
            format!("... +{} more lines", lines.len() - shown).dimmed()
        );
    }
}

/// Summary of a deployment
pub fn print_deploy_report(report: &DeployReport) {
    header(&format!("DEPLOYMENT TO [{}]", report.environment));

    let changes = &report.change_set;
    step("Changes");
    println!("   Detection method: {}", changes.method.to_string().yellow());
    println!(
        "   Version control: {}",
        if changes.vcs.is_some() { "yes" } else { "no" }
    );
    if changes.first_deployment {
        println!("   {}", "First deployment, shipping the whole tree".yellow());
    } else {
        println!("   Added: {}", changes.added.len().to_string().green());
        println!("   Modified: {}", changes.modified.len().to_string().yellow());
        println!("   Deleted: {}", changes.deleted.len().to_string().red());
    }
    if changes.include_vendor {
        println!("   {}", "Dependency directory included".yellow());
    }

    step("Package");
    println!(
        "   {} files, {} directories, {}",
        report.package.files,
        report.package.directories,
        format_bytes(report.package.size_bytes).cyan()
    );
    if !report.package.skipped.is_empty() {
        println!(
            "   {}",
            format!("{} listed paths no longer exist", report.package.skipped.len()).dimmed()
        );
    }
    if !report.uploaded {
        println!("   {}", "Upload skipped".dimmed());
    }

    step("Remote deployment");
    apply(&report.apply);
    if !report.commands.is_empty() {
        println!();
        println!("   {}", "Commands:".yellow());
        for result in &report.commands {
            command(result, Some(DEPLOY_OUTPUT_LINES));
        }
    }

    footer(report.succeeded(), "DEPLOYMENT COMPLETE", report.total_time);
}

/// Summary of a command-only run
pub fn print_command_report(report: &CommandReport) {
    header(&format!("REMOTE COMMAND EXECUTION [{}]", report.environment));
    println!("   Endpoint: {}", report.endpoint.cyan());
    println!();
    for result in &report.commands {
        command(result, None);
    }
    footer(report.succeeded(), "COMMANDS EXECUTED", report.total_time);
}

fn footer(success: bool, title: &str, total_time: f64) {
    println!();
    if success {
        println!("{} {}", "✅".green(), title.green().bold());
    } else {
        println!("{}", format!("{title} WITH ERRORS").red().bold());
    }
    println!("   Total time: {}s", total_time);
}
