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

impl OutputFormat {
    /// Parse a stored format name, `None` for anything unrecognized
    pub fn from_name(name: &str) -> Option<Self> {
        Self::from_str(name, true).ok()
    }
}

/// Print a rounded table, or a warning when there is nothing to show
pub fn print_rows<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        print_warning(empty_message);
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Pretty JSON for any serializable result
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Wire name of a serde enum, e.g. `scale_out`
pub fn label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => name,
        _ => "-".to_string(),
    }
}

/// Format megabytes, switching to GB from 1024 MB
pub fn format_mb(mb: u64) -> String {
    if mb >= 1024 {
        format!("{:.1} GB", mb as f64 / 1024.0)
    } else {
        format!("{} MB", mb)
    }
}

pub fn format_gb(gb: f64) -> String {
    if gb >= 1024.0 {
        format!("{:.2} TB", gb / 1024.0)
    } else {
        format!("{:.1} GB", gb)
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

pub fn format_currency(amount: f64) -> String {
    if amount < 0.0 {
        format!("-${:.2}", -amount)
    } else {
        format!("${:.2}", amount)
    }
}

/// Color a status or verdict name
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "optimal" | "healthy" | "updated" | "completed" | "info" => status.green().to_string(),
        "oversized" | "degraded" | "warning" | "skipped" | "medium" | "no_eligible_hosts" => {
            status.yellow().to_string()
        }
        "undersized" | "unhealthy" | "error" | "failed" | "high" => status.red().to_string(),
        "insufficient_data" | "low" | "none" => status.dimmed().to_string(),
        _ => status.to_string(),
    }
}

/// Color a utilization percentage against the scale-out threshold
pub fn color_utilization(percent: f64) -> String {
    let formatted = format_percent(percent);
    if percent > 80.0 {
        formatted.red().to_string()
    } else if percent < 30.0 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planner_lib::capacity::RecommendationAction;

    #[test]
    fn test_format_mb() {
        assert_eq!(format_mb(512), "512 MB");
        assert_eq!(format_mb(8192), "8.0 GB");
        assert_eq!(format_mb(6144 + 512), "6.5 GB");
    }

    #[test]
    fn test_format_gb_and_currency() {
        assert_eq!(format_gb(13.5), "13.5 GB");
        assert_eq!(format_gb(2048.0), "2.00 TB");
        assert_eq!(format_currency(111.75), "$111.75");
        assert_eq!(format_currency(-15.0), "-$15.00");
    }

    #[test]
    fn test_label_uses_wire_name() {
        assert_eq!(label(&RecommendationAction::ScaleOut), "scale_out");
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(OutputFormat::from_name("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_name("yaml"), None);
    }
}
