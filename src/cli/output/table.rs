use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use std::env;

use super::truncate;

/// Final state of one test in a native run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultState {
    Passed,
    Failed,
    Errored,
    Skipped,
}

impl ResultState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Errored => "errored",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResultRow {
    pub test: String,
    pub state: ResultState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConverterOutcomeRow {
    pub converter: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct TableFormatter {
    use_colors: bool,
    max_width: Option<usize>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    pub fn with_max_width(mut self, width: usize) -> Self {
        self.max_width = Some(width);
        self
    }

    /// Format per-test results as a table
    pub fn format_results(&self, rows: &[TestResultRow]) -> String {
        let mut table = self.create_base_table();

        table.set_header(vec![
            Cell::new("Test").add_attribute(Attribute::Bold),
            Cell::new("Result").add_attribute(Attribute::Bold),
            Cell::new("Message").add_attribute(Attribute::Bold),
        ]);

        for row in rows {
            let state_cell = if self.use_colors {
                Cell::new(row.state.as_str()).fg(state_color(row.state))
            } else {
                Cell::new(format!("{} {}", state_icon(row.state), row.state.as_str()))
            };

            let message = row
                .message
                .as_deref()
                .and_then(|m| m.lines().next())
                .map_or_else(|| "-".to_string(), |m| truncate(m, 60));

            table.add_row(vec![Cell::new(&row.test), state_cell, Cell::new(message)]);
        }

        table.to_string()
    }

    /// Format the per-converter outcome of a run request
    pub fn format_outcomes(&self, rows: &[ConverterOutcomeRow]) -> String {
        let mut table = self.create_base_table();

        table.set_header(vec![
            Cell::new("Converter").add_attribute(Attribute::Bold),
            Cell::new("Outcome").add_attribute(Attribute::Bold),
            Cell::new("Run").add_attribute(Attribute::Bold),
        ]);

        for row in rows {
            let outcome = row.error.as_deref().map_or_else(
                || row.outcome.clone(),
                |error| format!("{}: {}", row.outcome, truncate(error, 50)),
            );
            let outcome_cell = if self.use_colors && row.error.is_some() {
                Cell::new(outcome).fg(Color::Red)
            } else {
                Cell::new(outcome)
            };

            table.add_row(vec![
                Cell::new(&row.converter),
                outcome_cell,
                Cell::new(row.token.as_deref().unwrap_or("-")),
            ]);
        }

        table.to_string()
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();

        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(u16::try_from(width).unwrap_or(u16::MAX));
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Check whether the terminal should receive color codes
pub fn supports_color() -> bool {
    // Respect NO_COLOR environment variable
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    true
}

fn state_icon(state: ResultState) -> &'static str {
    match state {
        ResultState::Passed => "✓",
        ResultState::Failed => "✗",
        ResultState::Errored => "!",
        ResultState::Skipped => "⊘",
    }
}

fn state_color(state: ResultState) -> Color {
    match state {
        ResultState::Passed => Color::Green,
        ResultState::Failed | ResultState::Errored => Color::Red,
        ResultState::Skipped => Color::Yellow,
    }
}
