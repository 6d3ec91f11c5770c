//! Test outcome models
//!
//! Case results and summaries read back from engine result documents.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single executed test case
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Errored,
}

impl TestStatus {
    /// Parse the `result` attribute of an engine document
    pub fn from_attr(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "passed" => Some(TestStatus::Passed),
            "failed" => Some(TestStatus::Failed),
            "skipped" | "inconclusive" => Some(TestStatus::Skipped),
            "error" | "errored" => Some(TestStatus::Errored),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Passed => "✓",
            TestStatus::Failed => "✗",
            TestStatus::Skipped => "○",
            TestStatus::Errored => "!",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Passed)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "PASS"),
            TestStatus::Failed => write!(f, "FAIL"),
            TestStatus::Skipped => write!(f, "SKIP"),
            TestStatus::Errored => write!(f, "ERROR"),
        }
    }
}

/// A single test case entry from a result document.
///
/// Discovery documents carry name information only; execution documents add
/// status and duration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaseResult {
    /// Short test name
    pub name: String,

    /// Fully qualified test name
    pub full_name: String,

    /// Execution status; `None` for discovery-only entries
    pub status: Option<TestStatus>,

    /// Duration in milliseconds; zero for discovery-only entries
    pub duration_ms: u64,

    /// Failure message, if any
    pub message: Option<String>,
}

impl CaseResult {
    pub fn discovered(name: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            status: None,
            duration_ms: 0,
            message: None,
        }
    }

    pub fn executed(
        name: impl Into<String>,
        full_name: impl Into<String>,
        status: TestStatus,
        duration_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            status: Some(status),
            duration_ms,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for CaseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => {
                write!(
                    f,
                    "{} {} [{}ms]",
                    status.symbol(),
                    self.full_name,
                    self.duration_ms
                )?;
                if let Some(msg) = &self.message {
                    write!(f, " - {msg}")?;
                }
                Ok(())
            }
            None => write!(f, "  {}", self.full_name),
        }
    }
}

/// Summary of a discovery pass over one assembly
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscoverySummary {
    pub assembly: String,
    pub total: usize,
    pub cases: Vec<CaseResult>,
}

impl DiscoverySummary {
    pub fn new(assembly: impl Into<String>, cases: Vec<CaseResult>) -> Self {
        Self {
            assembly: assembly.into(),
            total: cases.len(),
            cases,
        }
    }
}

impl fmt::Display for DiscoverySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} - {} tests discovered", self.assembly, self.total)?;
        for case in &self.cases {
            writeln!(f, "{case}")?;
        }
        Ok(())
    }
}

/// Summary of an execution pass over one assembly
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub assembly: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub total_duration_ms: u64,
    pub cases: Vec<CaseResult>,
}

impl RunSummary {
    pub fn new(assembly: impl Into<String>, cases: Vec<CaseResult>) -> Self {
        let total = cases.len();
        let count =
            |status: TestStatus| cases.iter().filter(|c| c.status == Some(status)).count();
        let passed = count(TestStatus::Passed);
        let failed = count(TestStatus::Failed);
        let skipped = count(TestStatus::Skipped);
        let errored = count(TestStatus::Errored);
        let total_duration_ms = cases.iter().map(|c| c.duration_ms).sum();

        Self {
            assembly: assembly.into(),
            total,
            passed,
            failed,
            skipped,
            errored,
            total_duration_ms,
            cases,
        }
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    pub fn is_all_passed(&self) -> bool {
        self.passed == self.total
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.assembly)?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for case in &self.cases {
            writeln!(f, "  {case}")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Error: {}",
            self.total, self.passed, self.failed, self.skipped, self.errored
        )?;
        writeln!(
            f,
            "Pass Rate: {:.1}% | Duration: {}ms",
            self.pass_rate(),
            self.total_duration_ms
        )
    }
}
