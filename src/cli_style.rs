/*!
 * CLI style system
 *
 * Tables and themed text for the human-readable report. `--json` output
 * bypasses all of this.
 */

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};

use crate::actions::FailureReport;
use crate::core::{ExecutionResult, ExecutionStatus, RunSummary};
use crate::discovery::Manifest;
use crate::recovery::{RecoveryResult, RecoveryStatus};

// ============================================================================
// THEME COLORS
// ============================================================================

pub struct Theme;

impl Theme {
    pub fn primary<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan()
    }

    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red()
    }

    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }

    /// Header style (bold cyan)
    pub fn header<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan().bold()
    }
}

pub struct Icons;

impl Icons {
    pub const SUCCESS: &'static str = "✓";
    pub const ERROR: &'static str = "✗";
    pub const WARNING: &'static str = "⚠";
    pub const INFO: &'static str = "ℹ";
    pub const SKIPPED: &'static str = "○";
    pub const ARROW_RIGHT: &'static str = "→";
}

/// Draw a section header with a line
pub fn section_header(title: &str) {
    let line_len = 50 - title.len().min(40);
    println!(
        "\n{} {}",
        Theme::header(title),
        Theme::muted("─".repeat(line_len))
    );
}

// ============================================================================
// TABLES
// ============================================================================

/// Create a styled data table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Create a minimal table (no outer borders)
pub fn create_minimal_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_NO_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header_cell(title: &str) -> Cell {
    Cell::new(title)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn status_cell(status: ExecutionStatus) -> Cell {
    match status {
        ExecutionStatus::Success => {
            Cell::new(format!("{} success", Icons::SUCCESS)).fg(Color::Green)
        }
        ExecutionStatus::Failed => Cell::new(format!("{} failed", Icons::ERROR)).fg(Color::Red),
        ExecutionStatus::Skipped => {
            Cell::new(format!("{} skipped", Icons::SKIPPED)).fg(Color::DarkGrey)
        }
    }
}

/// One row per resource: id, status, and the error or skip reason
pub fn outcome_table(outcomes: &[ExecutionResult]) -> Table {
    let mut table = create_table();
    table.set_header(vec![
        header_cell("Resource"),
        header_cell("Status"),
        header_cell("Detail"),
    ]);

    for outcome in outcomes {
        table.add_row(vec![
            Cell::new(&outcome.resource_id),
            status_cell(outcome.status),
            Cell::new(outcome.error.as_deref().unwrap_or("")).fg(Color::DarkGrey),
        ]);
    }

    table
}

/// Key-value table with the run counters
pub fn summary_table(summary: &RunSummary) -> Table {
    let mut table = create_minimal_table();
    let rows = [
        ("Succeeded", summary.succeeded, Color::Green),
        ("Failed", summary.failed, Color::Red),
        ("Skipped", summary.skipped, Color::DarkGrey),
    ];
    for (label, count, color) in rows {
        table.add_row(vec![
            Cell::new(label).fg(Color::Cyan),
            Cell::new(count).fg(color).add_attribute(Attribute::Bold),
        ]);
    }
    table
}

/// Services and their actions, with the arguments each one accepts
pub fn manifest_table(manifest: &Manifest) -> Table {
    let mut table = create_table();
    table.set_header(vec![
        header_cell("Service"),
        header_cell("Action"),
        header_cell("Arguments"),
    ]);

    for service in &manifest.services {
        for action in &service.actions {
            let arguments = action
                .arguments
                .iter()
                .map(|a| {
                    if a.required {
                        format!("{}*", a.name)
                    } else {
                        a.name.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            table.add_row(vec![
                Cell::new(service.service)
                    .fg(Color::White)
                    .add_attribute(Attribute::Bold),
                Cell::new(action.name),
                Cell::new(arguments).fg(Color::DarkGrey),
            ]);
        }
    }

    table
}

// ============================================================================
// REPORTS
// ============================================================================

pub fn print_failure_report(report: &FailureReport) {
    let mode = if report.dry_run { " [DRY-RUN]" } else { "" };
    section_header(&format!(
        "fail_az {} {}{}",
        report.service, report.availability_zone, mode
    ));

    if !report.outcomes.is_empty() {
        println!("{}", outcome_table(&report.outcomes));
    }
    println!("{}", summary_table(&report.summary));

    match report.state_path {
        Some(ref path) => print_info(&format!("Recovery state written to {}", path.display())),
        None if report.service.supports_recovery() => {
            print_warning("No resource was changed; no recovery state written")
        }
        None => {}
    }
}

pub fn print_recovery_report(result: &RecoveryResult) {
    section_header(&format!("recover_az {}", result.service));

    match result.status {
        RecoveryStatus::NothingToRecover { ref reason } => {
            print_info(&format!("Nothing to recover: {reason}"));
            return;
        }
        RecoveryStatus::Recovered => {}
        RecoveryStatus::Partial => {}
    }

    if !result.outcomes.is_empty() {
        println!("{}", outcome_table(&result.outcomes));
    }
    println!("{}", summary_table(&result.summary()));

    if result.is_complete() {
        print_success(&format!(
            "Recovered; state cleared from {}",
            result.state_path.display()
        ));
    } else {
        print_warning(&format!(
            "{} change(s) still pending in {}; run recover_az again",
            result.remaining,
            result.state_path.display()
        ));
    }
}

// ============================================================================
// MESSAGES
// ============================================================================

/// Print a styled error message with optional suggestion
pub fn print_error(message: &str, suggestion: Option<&str>) {
    eprintln!(
        "\n{} {}",
        Theme::error(format!("{} Error:", Icons::ERROR)),
        message
    );

    if let Some(hint) = suggestion {
        eprintln!(
            "  {} {}",
            Theme::muted(Icons::ARROW_RIGHT),
            Theme::muted(hint)
        );
    }
    eprintln!();
}

pub fn print_warning(message: &str) {
    eprintln!(
        "{} {}",
        Theme::warning(Icons::WARNING.to_string()),
        Theme::warning(message)
    );
}

pub fn print_success(message: &str) {
    println!(
        "{} {}",
        Theme::success(Icons::SUCCESS.to_string()),
        Theme::success(message)
    );
}

pub fn print_info(message: &str) {
    println!("{} {}", Theme::primary(Icons::INFO.to_string()), message);
}
