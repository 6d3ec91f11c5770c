//! Result artifact handling
//!
//! Persists engine result documents and reads summaries back out of them.

#![allow(dead_code)]

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::models::{CaseResult, DiscoverySummary, RunSummary, TestStatus};

/// Fixed artifact name for discovery results
pub const EXPLORE_RESULT_FILE: &str = "explore.xml";

/// Fixed artifact name for execution results
pub const RUN_RESULT_FILE: &str = "result.xml";

/// Write an engine result document to its artifact path, replacing any
/// previous artifact.
pub fn write_artifact(path: &Path, document: &str) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create result artifact: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(document.as_bytes())
        .with_context(|| format!("Failed to write result artifact: {}", path.display()))?;
    writer.flush()?;

    debug!("Wrote result artifact to {}", path.display());
    Ok(())
}

/// Parse a discovery document into a summary.
///
/// Engine documents are flat enough that an attribute scan over `test-case`
/// elements is sufficient; the full tree is never needed here.
pub fn parse_discovery(assembly: impl Into<String>, document: &str) -> DiscoverySummary {
    let cases = test_case_tags(document)
        .into_iter()
        .map(|tag| {
            let name = attr_value(tag, "name").unwrap_or_default();
            let full_name = attr_value(tag, "fullname").unwrap_or_else(|| name.clone());
            CaseResult::discovered(name, full_name)
        })
        .collect();

    DiscoverySummary::new(assembly, cases)
}

/// Parse an execution document into a summary
pub fn parse_run(assembly: impl Into<String>, document: &str) -> RunSummary {
    let cases = test_case_tags(document)
        .into_iter()
        .map(|tag| {
            let name = attr_value(tag, "name").unwrap_or_default();
            let full_name = attr_value(tag, "fullname").unwrap_or_else(|| name.clone());
            let status = attr_value(tag, "result")
                .and_then(|s| TestStatus::from_attr(&s))
                .unwrap_or(TestStatus::Errored);
            let duration_ms = attr_value(tag, "duration")
                .and_then(|s| s.parse::<f64>().ok())
                .map(|secs| (secs * 1000.0).round() as u64)
                .unwrap_or(0);
            CaseResult::executed(name, full_name, status, duration_ms)
        })
        .collect();

    RunSummary::new(assembly, cases)
}

/// Number of test case entries in a result document
pub fn count_test_cases(document: &str) -> usize {
    test_case_tags(document).len()
}

/// Collect the attribute text of every `<test-case …>` element
fn test_case_tags(document: &str) -> Vec<&str> {
    let mut tags = Vec::new();
    let mut rest = document;

    while let Some(start) = rest.find("<test-case") {
        let after = &rest[start..];
        match after.find('>') {
            Some(end) => {
                tags.push(&after[..end]);
                rest = &after[end..];
            }
            None => break,
        }
    }

    tags
}

/// Extract a quoted attribute value from an element's tag text
fn attr_value(tag: &str, name: &str) -> Option<String> {
    let needle = format!("{name}=\"");
    let start = tag.find(&needle)? + needle.len();
    let end = tag[start..].find('"')?;
    Some(unescape(&tag[start..start + end]))
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
