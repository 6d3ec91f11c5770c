//! Output formatters for discovery and run summaries
//!
//! Provides Table, JSON, and brief summary output formats.

use crate::models::{DiscoverySummary, RunSummary};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Format a discovery summary
    pub fn format_discovery(&self, summary: &DiscoverySummary) -> String {
        match self.format {
            OutputFormat::Table => summary.to_string(),
            OutputFormat::Json => serde_json::to_string(summary).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Summary => {
                format!("{}: {} tests discovered", summary.assembly, summary.total)
            }
        }
    }

    /// Format a run summary
    pub fn format_run(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Table => summary.to_string(),
            OutputFormat::Json => serde_json::to_string(summary).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Summary => format!(
                "{}: {}/{} passed ({:.1}%) in {}ms",
                summary.assembly,
                summary.passed,
                summary.total,
                summary.pass_rate(),
                summary.total_duration_ms
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaseResult, TestStatus};

    fn run_summary() -> RunSummary {
        RunSummary::new(
            "libsuite.so",
            vec![
                CaseResult::executed("a", "suite::a", TestStatus::Passed, 10),
                CaseResult::executed("b", "suite::b", TestStatus::Failed, 20),
            ],
        )
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!(OutputFormat::from_str("table"), Some(OutputFormat::Table));
        assert_eq!(
            OutputFormat::from_str("JSON-Pretty"),
            Some(OutputFormat::JsonPretty)
        );
        assert_eq!(OutputFormat::from_str("bogus"), None);
    }

    #[test]
    fn test_json_output_contains_counts() {
        let formatter = ResultFormatter::new(OutputFormat::Json);
        let json = formatter.format_run(&run_summary());
        assert!(json.contains("\"passed\":1"));
        assert!(json.contains("\"failed\":1"));
    }

    #[test]
    fn test_table_output_lists_cases() {
        let formatter = ResultFormatter::new(OutputFormat::Table);
        let table = formatter.format_run(&run_summary());
        assert!(table.contains("suite::a"));
        assert!(table.contains("Pass Rate: 50.0%"));
    }

    #[test]
    fn test_summary_output_is_brief() {
        let formatter = ResultFormatter::new(OutputFormat::Summary);
        let line = formatter.format_discovery(&DiscoverySummary::new(
            "libsuite.so",
            vec![CaseResult::discovered("a", "suite::a")],
        ));
        assert_eq!(line, "libsuite.so: 1 tests discovered");
    }
}
