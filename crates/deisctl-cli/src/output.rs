//! Rendering of dispatcher reports on stdout.

use anyhow::Result;
use clap::ValueEnum;
use serde_json::json;

use deisctl_core::backend::{InstanceStatus, TargetOutcome};
use deisctl_core::commands::{CommandReport, ConfigAction, ConfigReport, StatusReport};
use deisctl_core::target::Target;

#[derive(Clone, Copy, Debug, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

pub fn print_command_report(report: &CommandReport) {
    for outcome in &report.outcomes {
        println!("{}", outcome_line(outcome));
    }
    for warning in &report.warnings {
        println!("  ⚠ {warning}");
    }
    let failed = report.failures().count();
    if failed > 0 {
        println!(
            "{} finished with {failed} failed target{}",
            report.command,
            if failed == 1 { "" } else { "s" }
        );
    }
}

fn outcome_line(outcome: &TargetOutcome) -> String {
    let symbol = if outcome.outcome.is_failure() {
        "✗"
    } else {
        "✓"
    };
    format!(
        "  {symbol} {:<32} {:<10} {}",
        outcome.instance.unit_name(),
        outcome.action,
        outcome.outcome
    )
}

pub fn print_status(report: &StatusReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print_status_table(&report.statuses),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report.statuses)?),
    }
    Ok(())
}

fn print_status_table(statuses: &[InstanceStatus]) {
    println!(
        "  {:<32} {:<12} {:<20} Since",
        "Unit", "State", "Machine"
    );
    println!("  {}", "-".repeat(80));
    for status in statuses {
        let since = status
            .since
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<32} {:<12} {:<20} {}",
            truncate(&status.unit, 32),
            status.state,
            truncate(status.machine.as_deref().unwrap_or("-"), 20),
            since
        );
    }
}

pub fn print_list(targets: &[Target], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if targets.is_empty() {
                println!("No components installed.");
            }
            for target in targets {
                for instance in target.instances() {
                    println!("  {}", instance.unit_name());
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(targets)?),
    }
    Ok(())
}

pub fn print_config(report: &ConfigReport, action: &ConfigAction, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "component": report.component,
                "action": action.verb(),
                "entries": report.entries,
                "removed": report.removed,
                "failures": report.failures,
            }))?
        );
        return Ok(());
    }
    for line in config_lines(report, action) {
        println!("{line}");
    }
    Ok(())
}

fn config_lines(report: &ConfigReport, action: &ConfigAction) -> Vec<String> {
    let mut lines: Vec<String> = match action {
        // Exactly one requested key prints its bare value, for use in scripts.
        ConfigAction::Get(keys) if keys.len() == 1 => report
            .entries
            .iter()
            .map(|entry| entry.value.clone())
            .collect(),
        ConfigAction::Get(_) => report
            .entries
            .iter()
            .map(|entry| format!("{}: {}", entry.key, entry.value))
            .collect(),
        ConfigAction::Set(_) => report
            .entries
            .iter()
            .map(|entry| format!("  ✓ {} set", entry.key))
            .collect(),
        ConfigAction::Remove(_) => report
            .removed
            .iter()
            .map(|key| format!("  ✓ {key} removed"))
            .collect(),
    };
    lines.extend(
        report
            .failures
            .iter()
            .map(|failure| format!("  ✗ {}: {}", failure.key, failure.reason)),
    );
    lines
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
