//! CLI Output Formatting.
//!
//! Handles output formatting for different formats (text, JSON, table).

use console::style;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::cli::simulation::{StepOutcome, StepReport};
use crate::protocol::operations::OperationResult;

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
    /// Pretty JSON format
    JsonPretty,
    /// Table format
    Table,
    /// Minimal format (values only)
    Minimal,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(OutputFormat::JsonPretty),
            "table" | "tbl" => Ok(OutputFormat::Table),
            "minimal" | "min" => Ok(OutputFormat::Minimal),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

impl OutputFormat {
    /// Whether output is machine-readable JSON
    pub fn is_json(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::JsonPretty)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT FORMATTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Output formatter for CLI
#[derive(Debug, Clone, Default)]
pub struct OutputFormatter {
    format: OutputFormat,
    color: bool,
}

impl OutputFormatter {
    /// Create new formatter
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            color: true,
        }
    }

    /// Disable color
    pub fn without_color(mut self) -> Self {
        self.color = false;
        self
    }

    /// Get format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        if self.format.is_json() {
            self.status("success", message);
        } else if self.color {
            println!("{} {}", style("✓").green(), message);
        } else {
            println!("OK: {}", message);
        }
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        if self.format.is_json() {
            self.status("error", message);
        } else if self.color {
            eprintln!("{} {}", style("✗").red(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if self.format.is_json() {
            self.status("warning", message);
        } else if self.color {
            println!("{} {}", style("⚠").yellow(), message);
        } else {
            println!("WARNING: {}", message);
        }
    }

    /// Print data
    pub fn data<T: Serialize>(&self, data: &T) {
        match self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => {
                self.print_json(data);
            }
            OutputFormat::Minimal => {
                if let Ok(json) = serde_json::to_value(data) {
                    self.print_minimal(&json);
                }
            }
            _ => {
                if let Ok(json) = serde_json::to_value(data) {
                    self.print_text(&json, 0);
                }
            }
        }
    }

    /// Print table
    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        if self.format.is_json() {
            let data: Vec<BTreeMap<&str, &str>> = rows
                .iter()
                .map(|row| {
                    headers
                        .iter()
                        .zip(row.iter())
                        .map(|(h, v)| (*h, v.as_str()))
                        .collect()
                })
                .collect();
            self.print_json(&data);
        } else {
            self.print_table_text(headers, rows);
        }
    }

    /// Print key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        match self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => {
                self.print_json(&serde_json::json!({ key: value }));
            }
            OutputFormat::Minimal => {
                println!("{}", value);
            }
            _ => {
                println!("{}: {}", self.bold(key), value);
            }
        }
    }

    /// Print section header
    pub fn section(&self, title: &str) {
        if matches!(self.format, OutputFormat::Text | OutputFormat::Table) {
            println!();
            if self.color {
                println!("{}", style(format!("=== {} ===", title)).cyan().bold());
            } else {
                println!("=== {} ===", title);
            }
            println!();
        }
    }

    /// Print the reports of a script run
    pub fn reports(&self, reports: &[StepReport]) {
        if self.format.is_json() {
            self.print_json(&reports);
            return;
        }

        let rows: Vec<Vec<String>> = reports
            .iter()
            .map(|r| {
                let status = if r.is_ok() { "ok" } else { "rejected" };
                let detail = match (&r.outcome, &r.error) {
                    (Some(outcome), _) => describe_outcome(outcome),
                    (None, Some(error)) => error.clone(),
                    (None, None) => String::new(),
                };
                vec![
                    r.index.to_string(),
                    r.step.clone(),
                    status.to_string(),
                    detail,
                ]
            })
            .collect();
        self.print_table_text(&["#", "step", "status", "detail"], &rows);
    }

    fn status(&self, status: &str, message: &str) {
        self.print_json(&serde_json::json!({
            "status": status,
            "message": message
        }));
    }

    fn bold(&self, text: &str) -> String {
        if self.color {
            style(text).bold().to_string()
        } else {
            text.to_string()
        }
    }

    /// Print JSON data
    fn print_json<T: Serialize + ?Sized>(&self, data: &T) {
        let output = if matches!(self.format, OutputFormat::JsonPretty) {
            serde_json::to_string_pretty(data)
        } else {
            serde_json::to_string(data)
        };

        if let Ok(json) = output {
            println!("{}", json);
        }
    }

    /// Print text formatted data
    fn print_text(&self, json: &serde_json::Value, indent: usize) {
        let prefix = "  ".repeat(indent);

        match json {
            serde_json::Value::Object(map) => {
                for (key, value) in map {
                    match value {
                        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                            println!("{}{}:", prefix, self.bold(key));
                            self.print_text(value, indent + 1);
                        }
                        _ => {
                            println!("{}{}: {}", prefix, self.bold(key), format_value(value));
                        }
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for (i, item) in arr.iter().enumerate() {
                    println!("{}[{}]:", prefix, i);
                    self.print_text(item, indent + 1);
                }
            }
            _ => {
                println!("{}{}", prefix, format_value(json));
            }
        }
    }

    fn print_minimal(&self, json: &serde_json::Value) {
        match json {
            serde_json::Value::Object(map) => {
                for value in map.values() {
                    self.print_minimal(value);
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr {
                    self.print_minimal(item);
                }
            }
            _ => {
                println!("{}", format_value(json));
            }
        }
    }

    fn print_table_text(&self, headers: &[&str], rows: &[Vec<String>]) {
        if headers.is_empty() {
            return;
        }

        let widths = column_widths(headers, rows);

        let header_line: Vec<String> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
            .collect();
        println!("{}", self.bold(&header_line.join(" | ")));

        let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        println!("{}", separator.join("-+-"));

        for row in rows {
            let cells: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    let width = widths.get(i).copied().unwrap_or(cell.len());
                    format!("{:width$}", cell, width = width)
                })
                .collect();
            println!("{}", cells.join(" | "));
        }
    }
}

fn column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }
    widths
}

/// One-line summary of a step outcome
pub fn describe_outcome(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Ledger(OperationResult::Deposit(r)) => format!(
            "+{} {} ({}), balance {}",
            r.normalized_amount,
            r.asset.short(),
            r.value_usd,
            r.balance
        ),
        StepOutcome::Ledger(OperationResult::Withdrawal(r)) => format!(
            "-{} {} ({}), balance {}",
            r.normalized_amount,
            r.asset.short(),
            r.value_usd,
            r.remaining_balance
        ),
        StepOutcome::Ledger(OperationResult::AssetAdded(asset)) => {
            format!("asset {} active", asset.short())
        }
        StepOutcome::Ledger(OperationResult::AssetRemoved(asset)) => {
            format!("asset {} inactive", asset.short())
        }
        StepOutcome::Ledger(OperationResult::Paused) => "paused".into(),
        StepOutcome::Ledger(OperationResult::Unpaused) => "unpaused".into(),
        StepOutcome::PriceSet { feed, price } => format!("feed {} at {}", feed.short(), price),
        StepOutcome::TimeAdvanced { now } => format!("now {}", now),
        StepOutcome::FailureInjected { side, fail } => format!("fail {} = {}", side, fail),
    }
}

/// Format a JSON value for text output
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".into(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
