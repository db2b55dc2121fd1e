//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of rows
pub fn print_table<T: Tabled>(rows: &[T]) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Pretty-print any response as JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a percentage with two decimals
pub fn format_pct(pct: f64) -> String {
    format!("{:.2}%", pct)
}

/// Format an amount with thousands separators and no decimals
pub fn format_amount(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Color a job state
pub fn color_state(state: &str) -> String {
    match state {
        "READY" => state.green().to_string(),
        "FAILED" => state.red().to_string(),
        "QUEUED" => state.dimmed().to_string(),
        _ => state.yellow().to_string(),
    }
}

/// Color a prediction source
pub fn color_source(source: &str) -> String {
    match source {
        "ML" => source.green().to_string(),
        _ => source.yellow().to_string(),
    }
}

/// Color a recommendation label
pub fn color_label(label: &str) -> String {
    match label {
        "RECOMMEND" => label.green().to_string(),
        "CONDITIONAL" => label.yellow().to_string(),
        _ => label.red().to_string(),
    }
}

/// Render a presence flag
pub fn yes_no(flag: bool) -> String {
    if flag {
        "yes".green().to_string()
    } else {
        "no".red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount_groups_thousands() {
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(999.4), "999");
        assert_eq!(format_amount(1000.0), "1,000");
        assert_eq!(format_amount(19500000.0), "19,500,000");
        assert_eq!(format_amount(-2500.0), "-2,500");
    }

    #[test]
    fn test_format_pct() {
        assert_eq!(format_pct(14.0), "14.00%");
        assert_eq!(format_pct(7.459), "7.46%");
    }
}
